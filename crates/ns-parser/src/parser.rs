use ns_core::{BinaryOperator, Diagnostic, SourceSpan, UnaryOperator};

use crate::ast::*;
use crate::lexer::tokenize_all;
use crate::markup::parse_markup;
use crate::token::{Token, TokenKind, TokenValue};

#[derive(Debug, Clone, PartialEq)]
pub struct ParseResult<T> {
    pub value: T,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> ParseResult<T> {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

pub fn parse_source_file(path: &str, source: &str) -> ParseResult<SourceFile> {
    let mut parser = Parser::from_source(source);
    let value = parser.source_file(path);
    parser.finish(value)
}

pub fn parse_statement(source: &str) -> ParseResult<Statement> {
    let mut parser = Parser::from_source(source);
    let value = parser.statement();
    parser.expect_end();
    parser.finish(value)
}

pub fn parse_expression(source: &str) -> ParseResult<Expression> {
    let mut parser = Parser::from_source(source);
    let value = parser.expression();
    parser.expect_end();
    parser.finish(value)
}

pub fn parse_dialogue_block(source: &str) -> ParseResult<Option<DialogueBlock>> {
    let mut parser = Parser::from_source(source);
    let value = if parser.peek().is_dialogue_start() {
        let block = parser.dialogue_block();
        parser.expect_end();
        Some(block)
    } else {
        parser.unexpected("a <PRE> dialogue block");
        None
    };
    parser.finish(value)
}

/// Recursive-descent parser over a token buffer that always ends in `Eof`.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    next_id: u32,
    diagnostics: Vec<Diagnostic>,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>, diagnostics: Vec<Diagnostic>) -> Self {
        if tokens.last().map(|token| token.kind) != Some(TokenKind::Eof) {
            let span = tokens
                .last()
                .map(|token| token.span)
                .unwrap_or_else(SourceSpan::synthetic);
            tokens.push(Token {
                kind: TokenKind::Eof,
                text: String::new(),
                value: TokenValue::None,
                span,
            });
        }
        Self {
            tokens,
            pos: 0,
            next_id: 0,
            diagnostics,
        }
    }

    pub fn from_source(source: &str) -> Self {
        let (tokens, diagnostics) = tokenize_all(source);
        Self::new(tokens, diagnostics)
    }

    fn finish<T>(self, value: T) -> ParseResult<T> {
        ParseResult {
            value,
            diagnostics: self.diagnostics,
        }
    }

    fn id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn peek_kind_at(&self, offset: usize) -> TokenKind {
        let index = (self.pos + offset).min(self.tokens.len() - 1);
        self.tokens[index].kind
    }

    fn previous_span(&self) -> SourceSpan {
        if self.pos == 0 {
            self.peek().span
        } else {
            self.tokens[self.pos - 1].span
        }
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Option<Token> {
        if let Some(token) = self.eat(kind) {
            return Some(token);
        }
        self.unexpected(what);
        None
    }

    fn unexpected(&mut self, what: &str) {
        let token = self.peek();
        let diagnostic = Diagnostic::error(
            "PARSE_UNEXPECTED_TOKEN",
            format!("Expected {}, found {}.", what, token),
            token.span,
        );
        self.diagnostics.push(diagnostic);
    }

    fn expect_end(&mut self) {
        if !self.check(TokenKind::Eof) {
            let span = self.peek().span;
            self.diagnostics.push(Diagnostic::error(
                "PARSE_TRAILING_INPUT",
                "Unexpected input after the parsed node.",
                span,
            ));
        }
    }

    /// Skips to just past the next `;`, or up to a `}` or member keyword.
    fn synchronize(&mut self) {
        loop {
            let kind = self.peek_kind();
            if kind == TokenKind::Eof || kind == TokenKind::CloseBrace || kind.is_member_keyword() {
                return;
            }
            self.advance();
            if kind == TokenKind::Semicolon {
                return;
            }
        }
    }

    fn name(&mut self, what: &str) -> String {
        match self.peek_kind() {
            TokenKind::Identifier | TokenKind::StringLiteral => {
                self.advance().text_value().to_string()
            }
            _ => {
                self.unexpected(what);
                String::new()
            }
        }
    }

    pub fn source_file(&mut self, path: &str) -> SourceFile {
        let mut includes = Vec::new();
        let mut members = Vec::new();
        loop {
            let dialogue_start = self.peek().is_dialogue_start();
            match self.peek_kind() {
                TokenKind::Eof => break,
                TokenKind::IncludeDirective => {
                    let token = self.advance();
                    includes.push(Include {
                        path: token.text_value().to_string(),
                        span: token.span,
                    });
                }
                TokenKind::Chapter | TokenKind::Scene | TokenKind::Function => {
                    members.push(self.member());
                }
                TokenKind::XmlStartTag if dialogue_start => {
                    members.push(Member::DialogueBlock(self.dialogue_block()));
                }
                _ => {
                    self.unexpected("chapter, scene, function or dialogue block");
                    self.advance();
                    while !matches!(
                        self.peek_kind(),
                        TokenKind::Eof
                            | TokenKind::Chapter
                            | TokenKind::Scene
                            | TokenKind::Function
                            | TokenKind::IncludeDirective
                    ) && !self.peek().is_dialogue_start()
                    {
                        self.advance();
                    }
                }
            }
        }
        SourceFile {
            path: path.to_string(),
            includes,
            members,
        }
    }

    fn member(&mut self) -> Member {
        let keyword = self.advance();
        let id = self.id();
        let name = self.name("a member name");
        match keyword.kind {
            TokenKind::Chapter => {
                let body = self.block();
                Member::Chapter(Chapter {
                    id,
                    name,
                    span: keyword.span.to(body.span),
                    body,
                })
            }
            TokenKind::Scene => {
                let body = self.block();
                Member::Scene(Scene {
                    id,
                    name,
                    span: keyword.span.to(body.span),
                    body,
                })
            }
            _ => {
                let parameters = self.parameters();
                let body = self.block();
                Member::Function(Function {
                    id,
                    name,
                    parameters,
                    span: keyword.span.to(body.span),
                    body,
                })
            }
        }
    }

    fn parameters(&mut self) -> Vec<Parameter> {
        let mut parameters = Vec::new();
        if self.expect(TokenKind::OpenParen, "'('").is_none() {
            return parameters;
        }
        if self.eat(TokenKind::CloseParen).is_some() {
            return parameters;
        }
        loop {
            if self.check(TokenKind::Identifier) {
                let token = self.advance();
                let id = self.id();
                parameters.push(Parameter {
                    id,
                    name: token.text_value().to_string(),
                    span: token.span,
                });
            } else {
                self.unexpected("a parameter name");
                while !matches!(
                    self.peek_kind(),
                    TokenKind::CloseParen | TokenKind::OpenBrace | TokenKind::Eof
                ) {
                    self.advance();
                }
                self.eat(TokenKind::CloseParen);
                return parameters;
            }
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::CloseParen, "')'");
        parameters
    }

    pub fn block(&mut self) -> Block {
        let id = self.id();
        let start = self.peek().span;
        let mut statements = Vec::new();
        if self.expect(TokenKind::OpenBrace, "'{'").is_none() {
            return Block {
                id,
                statements,
                span: start,
            };
        }
        loop {
            let kind = self.peek_kind();
            if kind == TokenKind::CloseBrace || kind == TokenKind::Eof || kind.is_member_keyword() {
                break;
            }
            let before = self.pos;
            statements.push(self.statement());
            if self.pos == before {
                self.advance();
            }
        }
        self.expect(TokenKind::CloseBrace, "'}'");
        Block {
            id,
            statements,
            span: start.to(self.previous_span()),
        }
    }

    pub fn statement(&mut self) -> Statement {
        let start = self.peek().span;
        let kind = match self.peek_kind() {
            TokenKind::OpenBrace => StatementKind::Block(self.block()),
            TokenKind::If => {
                self.advance();
                let condition = self.parenthesized_condition();
                let then_branch = Box::new(self.statement());
                let else_branch = if self.eat(TokenKind::Else).is_some() {
                    Some(Box::new(self.statement()))
                } else {
                    None
                };
                StatementKind::If {
                    condition,
                    then_branch,
                    else_branch,
                }
            }
            TokenKind::While => {
                self.advance();
                let condition = self.parenthesized_condition();
                let body = Box::new(self.statement());
                StatementKind::While { condition, body }
            }
            TokenKind::Select => {
                self.advance();
                StatementKind::Select {
                    cases: self.select_cases(),
                }
            }
            TokenKind::CallChapter => {
                self.advance();
                let target = self.name("a chapter path");
                self.end_statement();
                StatementKind::CallChapter { target }
            }
            TokenKind::CallScene => {
                self.advance();
                let target = self.name("a scene reference");
                self.end_statement();
                StatementKind::CallScene { target }
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.check(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.expression())
                };
                self.end_statement();
                StatementKind::Return(value)
            }
            TokenKind::Break => {
                self.advance();
                self.end_statement();
                StatementKind::Break
            }
            TokenKind::Semicolon => {
                self.advance();
                StatementKind::Empty
            }
            TokenKind::XmlStartTag if self.peek().is_dialogue_start() => {
                StatementKind::DialogueBlock(self.dialogue_block())
            }
            _ => {
                let expression = self.expression();
                self.end_statement();
                StatementKind::Expression(expression)
            }
        };
        let id = self.id();
        Statement {
            id,
            kind,
            span: start.to(self.previous_span()),
        }
    }

    fn end_statement(&mut self) {
        if self.eat(TokenKind::Semicolon).is_none() {
            self.unexpected("';'");
            self.synchronize();
        }
    }

    fn parenthesized_condition(&mut self) -> Expression {
        self.expect(TokenKind::OpenParen, "'('");
        let condition = self.expression();
        self.expect(TokenKind::CloseParen, "')'");
        condition
    }

    fn select_cases(&mut self) -> Vec<SelectCase> {
        let mut cases = Vec::new();
        if self.expect(TokenKind::OpenBrace, "'{'").is_none() {
            return cases;
        }
        loop {
            match self.peek_kind() {
                TokenKind::CloseBrace | TokenKind::Eof => break,
                TokenKind::Case => {
                    let start = self.advance().span;
                    let label = self.name("a case label");
                    self.expect(TokenKind::Colon, "':'");
                    let body = self.statement();
                    let id = self.id();
                    cases.push(SelectCase {
                        id,
                        label,
                        span: start.to(body.span),
                        body,
                    });
                }
                _ => {
                    self.unexpected("'case'");
                    self.synchronize();
                    if self.peek_kind().is_member_keyword() {
                        break;
                    }
                }
            }
        }
        self.expect(TokenKind::CloseBrace, "'}'");
        cases
    }

    pub fn dialogue_block(&mut self) -> DialogueBlock {
        let open = self.advance();
        let id = self.id();
        let box_name = open
            .text_value()
            .split_once(char::is_whitespace)
            .map(|(_, rest)| rest.trim().to_string())
            .unwrap_or_default();
        while self.eat(TokenKind::MarkupLineBreak).is_some() {}
        let identifier = self
            .eat(TokenKind::DialogueIdentifier)
            .map(|token| token.text_value().to_string());

        let mut parts = Vec::new();
        let mut pending = String::new();
        let mut pending_span: Option<SourceSpan> = None;
        loop {
            if self.peek().is_dialogue_end() {
                self.advance();
                break;
            }
            match self.peek_kind() {
                TokenKind::Eof => {
                    self.unexpected("</PRE>");
                    break;
                }
                TokenKind::OpenBrace => {
                    self.flush_markup(&mut parts, &mut pending, &mut pending_span);
                    parts.push(DialoguePart::Statements(self.block()));
                }
                TokenKind::MarkupText
                | TokenKind::MarkupLineBreak
                | TokenKind::XmlStartTag
                | TokenKind::XmlEndTag
                | TokenKind::DialogueIdentifier => {
                    let token = self.advance();
                    match token.kind {
                        TokenKind::MarkupText => pending.push_str(token.text_value()),
                        TokenKind::MarkupLineBreak => pending.push('\n'),
                        TokenKind::XmlStartTag => {
                            pending.push_str(&format!("<{}>", token.text_value()))
                        }
                        TokenKind::XmlEndTag => {
                            pending.push_str(&format!("</{}>", token.text_value()))
                        }
                        _ => pending.push_str(&format!("[{}]", token.text_value())),
                    }
                    pending_span = Some(match pending_span {
                        Some(span) => span.to(token.span),
                        None => token.span,
                    });
                }
                _ => {
                    self.unexpected("dialogue text or '{'");
                    self.advance();
                }
            }
        }
        self.flush_markup(&mut parts, &mut pending, &mut pending_span);

        DialogueBlock {
            id,
            box_name,
            identifier,
            parts,
            span: open.span.to(self.previous_span()),
        }
    }

    fn flush_markup(
        &mut self,
        parts: &mut Vec<DialoguePart>,
        pending: &mut String,
        pending_span: &mut Option<SourceSpan>,
    ) {
        let text = std::mem::take(pending);
        let span = pending_span.take().unwrap_or_else(SourceSpan::synthetic);
        let trimmed = text.trim_matches('\n');
        if trimmed.is_empty() {
            return;
        }
        let (nodes, diagnostics) = parse_markup(trimmed, span);
        self.diagnostics.extend(diagnostics);
        parts.push(DialoguePart::Markup(MarkupContent { nodes, span }));
    }

    pub fn expression(&mut self) -> Expression {
        let target = self.logical_or();
        let operator = match self.peek_kind() {
            TokenKind::Assign => AssignmentOperator::Assign,
            TokenKind::PlusAssign => AssignmentOperator::AddAssign,
            TokenKind::MinusAssign => AssignmentOperator::SubtractAssign,
            TokenKind::StarAssign => AssignmentOperator::MultiplyAssign,
            TokenKind::SlashAssign => AssignmentOperator::DivideAssign,
            TokenKind::PlusPlus => AssignmentOperator::Increment,
            TokenKind::MinusMinus => AssignmentOperator::Decrement,
            _ => return target,
        };
        let operator_token = self.advance();
        let value = match operator {
            AssignmentOperator::Increment | AssignmentOperator::Decrement => None,
            _ => Some(Box::new(self.expression())),
        };
        if target.as_identifier().is_none() {
            self.diagnostics.push(Diagnostic::error(
                "PARSE_INVALID_ASSIGNMENT_TARGET",
                format!("Cannot assign to '{}'.", target),
                operator_token.span,
            ));
            return match value {
                Some(value) => *value,
                None => target,
            };
        }
        let span = target.span.to(self.previous_span());
        let id = self.id();
        Expression {
            id,
            kind: ExpressionKind::Assignment {
                target: Box::new(target),
                operator,
                value,
            },
            span,
        }
    }

    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> Expression,
        operators: &[(TokenKind, BinaryOperator)],
    ) -> Expression {
        let mut left = next(self);
        loop {
            let kind = self.peek_kind();
            let Some((_, operator)) = operators.iter().find(|(token, _)| *token == kind) else {
                return left;
            };
            self.advance();
            let right = next(self);
            let id = self.id();
            let span = left.span.to(right.span);
            left = Expression {
                id,
                kind: ExpressionKind::Binary {
                    operator: *operator,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            };
        }
    }

    fn logical_or(&mut self) -> Expression {
        self.binary_level(Self::logical_and, &[(TokenKind::OrOr, BinaryOperator::LogicalOr)])
    }

    fn logical_and(&mut self) -> Expression {
        self.binary_level(Self::equality, &[(TokenKind::AndAnd, BinaryOperator::LogicalAnd)])
    }

    fn equality(&mut self) -> Expression {
        self.binary_level(
            Self::comparison,
            &[
                (TokenKind::EqualEqual, BinaryOperator::Equal),
                (TokenKind::BangEqual, BinaryOperator::NotEqual),
            ],
        )
    }

    fn comparison(&mut self) -> Expression {
        self.binary_level(
            Self::additive,
            &[
                (TokenKind::Less, BinaryOperator::LessThan),
                (TokenKind::LessEqual, BinaryOperator::LessThanOrEqual),
                (TokenKind::Greater, BinaryOperator::GreaterThan),
                (TokenKind::GreaterEqual, BinaryOperator::GreaterThanOrEqual),
            ],
        )
    }

    fn additive(&mut self) -> Expression {
        self.binary_level(
            Self::multiplicative,
            &[
                (TokenKind::Plus, BinaryOperator::Add),
                (TokenKind::Minus, BinaryOperator::Subtract),
            ],
        )
    }

    fn multiplicative(&mut self) -> Expression {
        self.binary_level(
            Self::unary,
            &[
                (TokenKind::Star, BinaryOperator::Multiply),
                (TokenKind::Slash, BinaryOperator::Divide),
                (TokenKind::Percent, BinaryOperator::Remainder),
            ],
        )
    }

    fn unary(&mut self) -> Expression {
        let operator = match self.peek_kind() {
            TokenKind::Minus => UnaryOperator::Negate,
            TokenKind::Plus => UnaryOperator::Plus,
            TokenKind::Bang => UnaryOperator::Not,
            _ => return self.primary(),
        };
        let start = self.advance().span;
        let operand = self.unary();
        let id = self.id();
        Expression {
            id,
            span: start.to(operand.span),
            kind: ExpressionKind::Unary {
                operator,
                operand: Box::new(operand),
            },
        }
    }

    fn primary(&mut self) -> Expression {
        let token = self.peek().clone();
        let kind = match token.kind {
            TokenKind::NumericLiteral => {
                self.advance();
                match token.value {
                    TokenValue::DeltaNumber(value) => ExpressionKind::Literal(Literal::DeltaNumber(value)),
                    TokenValue::Number(value) => ExpressionKind::Literal(Literal::Number(value)),
                    _ => ExpressionKind::Literal(Literal::Number(0.0)),
                }
            }
            TokenKind::StringLiteral => {
                self.advance();
                ExpressionKind::Literal(Literal::String(token.text_value().to_string()))
            }
            TokenKind::True => {
                self.advance();
                ExpressionKind::Literal(Literal::Boolean(true))
            }
            TokenKind::False => {
                self.advance();
                ExpressionKind::Literal(Literal::Boolean(false))
            }
            TokenKind::Null => {
                self.advance();
                ExpressionKind::Literal(Literal::Null)
            }
            TokenKind::Identifier if self.peek_kind_at(1) == TokenKind::OpenParen => {
                self.advance();
                self.advance();
                let mut arguments = Vec::new();
                if self.eat(TokenKind::CloseParen).is_none() {
                    loop {
                        arguments.push(self.expression());
                        if self.eat(TokenKind::Comma).is_none() {
                            break;
                        }
                    }
                    self.expect(TokenKind::CloseParen, "')'");
                }
                ExpressionKind::Call {
                    callee: token.text_value().to_string(),
                    arguments,
                }
            }
            TokenKind::Identifier => {
                self.advance();
                ExpressionKind::Identifier(token.text_value().to_string())
            }
            TokenKind::OpenParen => {
                self.advance();
                let inner = self.expression();
                self.expect(TokenKind::CloseParen, "')'");
                return inner;
            }
            _ => {
                self.unexpected("an expression");
                if !matches!(
                    token.kind,
                    TokenKind::Eof | TokenKind::CloseBrace | TokenKind::Semicolon
                ) {
                    self.advance();
                }
                ExpressionKind::Literal(Literal::Null)
            }
        };
        let id = self.id();
        Expression {
            id,
            kind,
            span: token.span.to(self.previous_span()),
        }
    }
}
