use ns_core::{Diagnostic, SourceLocation, SourceSpan};

use crate::token::{Token, TokenKind, TokenValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Code,
    Dialogue,
    /// `{ ... }` inside dialogue text; returns to dialogue when depth hits zero.
    Embedded { depth: usize },
}

/// Lazy token stream over one source text. Yields exactly one `Eof` and then
/// stops; problems are collected as diagnostics instead of being returned.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    modes: Vec<Mode>,
    line_start: bool,
    /// Kind of the last token yielded, used to tell `a <b` from a tag.
    previous: Option<TokenKind>,
    diagnostics: Vec<Diagnostic>,
    done: bool,
}

pub fn tokenize(source: &str) -> Lexer<'_> {
    Lexer {
        source,
        pos: 0,
        line: 1,
        column: 1,
        modes: vec![Mode::Code],
        line_start: true,
        previous: None,
        diagnostics: Vec::new(),
        done: false,
    }
}

/// Collects every token up to and including `Eof` along with the diagnostics.
pub fn tokenize_all(source: &str) -> (Vec<Token>, Vec<Diagnostic>) {
    let mut lexer = tokenize(source);
    let tokens = lexer.by_ref().collect();
    (tokens, lexer.into_diagnostics())
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

pub fn is_sigiled_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some('$') | Some('#'))
        && !text[1..].is_empty()
        && chars.all(is_ident_char)
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.done {
            return None;
        }
        let token = match self.mode() {
            Mode::Dialogue => self.next_dialogue_token(),
            Mode::Code | Mode::Embedded { .. } => self.next_code_token(),
        };
        if token.kind == TokenKind::Eof {
            self.done = true;
        }
        self.previous = Some(token.kind);
        Some(token)
    }
}

impl<'a> Lexer<'a> {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    fn mode(&self) -> Mode {
        self.modes.last().copied().unwrap_or(Mode::Code)
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn location(&self) -> SourceLocation {
        SourceLocation {
            line: self.line,
            column: self.column,
        }
    }

    fn span_from(&self, start: SourceLocation) -> SourceSpan {
        SourceSpan {
            start,
            end: self.location(),
        }
    }

    fn token(&self, kind: TokenKind, start: usize, loc: SourceLocation, value: TokenValue) -> Token {
        Token {
            kind,
            text: self.source[start..self.pos].to_string(),
            value,
            span: self.span_from(loc),
        }
    }

    fn eof(&self) -> Token {
        let loc = self.location();
        Token {
            kind: TokenKind::Eof,
            text: String::new(),
            value: TokenValue::None,
            span: self.span_from(loc),
        }
    }

    fn error(&mut self, code: &str, message: impl Into<String>, start: SourceLocation) {
        let span = self.span_from(start);
        self.diagnostics.push(Diagnostic::error(code, message, span));
    }

    fn skip_trivia(&mut self) {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(ch), _) if ch.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(ch) = self.peek() {
                        if ch == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.location();
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some('*'), Some('/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => {
                                self.error(
                                    "LEX_UNTERMINATED_COMMENT",
                                    "Block comment is not terminated.",
                                    start,
                                );
                                return;
                            }
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn next_code_token(&mut self) -> Token {
        self.skip_trivia();
        let start = self.pos;
        let loc = self.location();
        let Some(ch) = self.peek() else {
            return self.eof();
        };

        match ch {
            '"' => self.lex_quoted(start, loc),
            '#' if self.rest().starts_with("#include")
                && !self.rest()[8..].chars().next().is_some_and(is_ident_char) =>
            {
                self.lex_include(start, loc)
            }
            '$' | '#' => {
                self.bump();
                if !self.peek().is_some_and(is_ident_char) {
                    self.error(
                        "LEX_INVALID_CHARACTER",
                        format!("Sigil '{}' must be followed by a name.", ch),
                        loc,
                    );
                    return self.token(TokenKind::Bad, start, loc, TokenValue::None);
                }
                while self.peek().is_some_and(is_ident_char) {
                    self.bump();
                }
                let name = self.source[start..self.pos].to_string();
                self.token(TokenKind::Identifier, start, loc, TokenValue::Text(name))
            }
            '@' => {
                self.bump();
                let negative = match self.peek() {
                    Some('-') => {
                        self.bump();
                        true
                    }
                    Some('+') => {
                        self.bump();
                        false
                    }
                    _ => false,
                };
                if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.error(
                        "LEX_INVALID_NUMBER",
                        "Delta prefix '@' must be followed by a number.",
                        loc,
                    );
                    return self.token(TokenKind::Bad, start, loc, TokenValue::None);
                }
                let value = self.lex_number_value(loc);
                let value = if negative { -value } else { value };
                self.token(TokenKind::NumericLiteral, start, loc, TokenValue::DeltaNumber(value))
            }
            c if c.is_ascii_digit() => {
                let value = self.lex_number_value(loc);
                self.token(TokenKind::NumericLiteral, start, loc, TokenValue::Number(value))
            }
            c if is_ident_start(c) => {
                while self.peek().is_some_and(is_ident_char) {
                    self.bump();
                }
                let text = &self.source[start..self.pos];
                match TokenKind::keyword(text) {
                    Some(kind) => self.token(kind, start, loc, TokenValue::None),
                    None => {
                        let name = text.to_string();
                        self.token(TokenKind::Identifier, start, loc, TokenValue::Text(name))
                    }
                }
            }
            '<' if !self.follows_operand() && self.tag_candidate() => match self.lex_tag(start, loc) {
                Some(token) => {
                    if token.is_dialogue_start() {
                        self.modes.push(Mode::Dialogue);
                        self.line_start = true;
                    }
                    token
                }
                None => self.lex_operator(start, loc),
            },
            '{' => {
                self.bump();
                if let Some(Mode::Embedded { depth }) = self.modes.last_mut() {
                    *depth += 1;
                }
                self.token(TokenKind::OpenBrace, start, loc, TokenValue::None)
            }
            '}' => {
                self.bump();
                if let Some(Mode::Embedded { depth }) = self.modes.last_mut() {
                    *depth -= 1;
                    if *depth == 0 {
                        self.modes.pop();
                        self.line_start = false;
                    }
                }
                self.token(TokenKind::CloseBrace, start, loc, TokenValue::None)
            }
            _ => self.lex_operator(start, loc),
        }
    }

    fn lex_operator(&mut self, start: usize, loc: SourceLocation) -> Token {
        let first = self.bump().unwrap_or('\0');
        let second = self.peek();
        let two = |lexer: &mut Self, kind: TokenKind| {
            lexer.bump();
            kind
        };
        let kind = match (first, second) {
            ('(', _) => TokenKind::OpenParen,
            (')', _) => TokenKind::CloseParen,
            (',', _) => TokenKind::Comma,
            (';', _) => TokenKind::Semicolon,
            (':', _) => TokenKind::Colon,
            ('+', Some('+')) => two(self, TokenKind::PlusPlus),
            ('+', Some('=')) => two(self, TokenKind::PlusAssign),
            ('+', _) => TokenKind::Plus,
            ('-', Some('-')) => two(self, TokenKind::MinusMinus),
            ('-', Some('=')) => two(self, TokenKind::MinusAssign),
            ('-', _) => TokenKind::Minus,
            ('*', Some('=')) => two(self, TokenKind::StarAssign),
            ('*', _) => TokenKind::Star,
            ('/', Some('=')) => two(self, TokenKind::SlashAssign),
            ('/', _) => TokenKind::Slash,
            ('%', _) => TokenKind::Percent,
            ('!', Some('=')) => two(self, TokenKind::BangEqual),
            ('!', _) => TokenKind::Bang,
            ('=', Some('=')) => two(self, TokenKind::EqualEqual),
            ('=', _) => TokenKind::Assign,
            ('<', Some('=')) => two(self, TokenKind::LessEqual),
            ('<', _) => TokenKind::Less,
            ('>', Some('=')) => two(self, TokenKind::GreaterEqual),
            ('>', _) => TokenKind::Greater,
            ('&', Some('&')) => two(self, TokenKind::AndAnd),
            ('|', Some('|')) => two(self, TokenKind::OrOr),
            (other, _) => {
                self.error(
                    "LEX_INVALID_CHARACTER",
                    format!("Unexpected character '{}'.", other),
                    loc,
                );
                TokenKind::Bad
            }
        };
        self.token(kind, start, loc, TokenValue::None)
    }

    fn lex_number_value(&mut self, loc: SourceLocation) -> f64 {
        let digits_start = self.pos;
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.bump();
            self.bump();
            let hex_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.bump();
            }
            let digits = &self.source[hex_start..self.pos];
            if digits.is_empty() {
                self.error("LEX_INVALID_NUMBER", "Hex literal has no digits.", loc);
                return 0.0;
            }
            return digits
                .chars()
                .filter_map(|c| c.to_digit(16))
                .fold(0.0, |value, digit| value * 16.0 + f64::from(digit));
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        self.source[digits_start..self.pos]
            .parse::<f64>()
            .unwrap_or_default()
    }

    fn lex_quoted(&mut self, start: usize, loc: SourceLocation) -> Token {
        self.bump();
        let mut content = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some('n') => content.push('\n'),
                    Some('t') => content.push('\t'),
                    Some('"') => content.push('"'),
                    Some('\\') => content.push('\\'),
                    Some(other) => {
                        content.push('\\');
                        content.push(other);
                    }
                    None => return self.unterminated_string(loc),
                },
                Some(ch) => content.push(ch),
                None => return self.unterminated_string(loc),
            }
        }
        let kind = if is_sigiled_identifier(&content) {
            TokenKind::Identifier
        } else {
            TokenKind::StringLiteral
        };
        self.token(kind, start, loc, TokenValue::Text(content))
    }

    fn unterminated_string(&mut self, loc: SourceLocation) -> Token {
        self.error(
            "LEX_UNTERMINATED_STRING",
            "String literal is not terminated.",
            loc,
        );
        self.eof()
    }

    fn lex_include(&mut self, start: usize, loc: SourceLocation) -> Token {
        for _ in 0.."#include".len() {
            self.bump();
        }
        while matches!(self.peek(), Some(' ') | Some('\t')) {
            self.bump();
        }
        if self.peek() == Some('"') {
            self.bump();
            let path_start = self.pos;
            while let Some(ch) = self.peek() {
                if ch == '"' || ch == '\n' {
                    break;
                }
                self.bump();
            }
            if self.peek() == Some('"') {
                let path = self.source[path_start..self.pos].to_string();
                self.bump();
                return self.token(TokenKind::IncludeDirective, start, loc, TokenValue::Text(path));
            }
        }
        self.error(
            "LEX_MALFORMED_INCLUDE",
            "#include must be followed by a quoted path.",
            loc,
        );
        self.token(TokenKind::Bad, start, loc, TokenValue::None)
    }

    /// After an operand `<` can only be the comparison operator.
    fn follows_operand(&self) -> bool {
        matches!(
            self.previous,
            Some(
                TokenKind::Identifier
                    | TokenKind::StringLiteral
                    | TokenKind::NumericLiteral
                    | TokenKind::True
                    | TokenKind::False
                    | TokenKind::Null
                    | TokenKind::CloseParen
                    | TokenKind::PlusPlus
                    | TokenKind::MinusMinus
            )
        )
    }

    fn tag_candidate(&self) -> bool {
        match (self.peek_at(1), self.peek_at(2)) {
            (Some(c), _) if c.is_alphabetic() => true,
            (Some('/'), Some(c)) => c.is_alphabetic(),
            _ => false,
        }
    }

    /// Scans `<...>` on the current line. Returns `None` without consuming when
    /// the text cannot be a tag (it runs into code punctuation or a newline).
    fn lex_tag(&mut self, start: usize, loc: SourceLocation) -> Option<Token> {
        let rest = self.rest();
        let mut close = None;
        for (index, ch) in rest.char_indices().skip(1) {
            match ch {
                '>' => {
                    close = Some(index);
                    break;
                }
                '\n' | '(' | ')' | ';' | '{' | '}' => return None,
                _ => {}
            }
        }
        let Some(close) = close else {
            while self.bump().is_some() {}
            self.error("LEX_UNTERMINATED_TAG", "Markup tag is not terminated.", loc);
            return Some(self.eof());
        };
        let (kind, inner) = if rest[1..].starts_with('/') {
            (TokenKind::XmlEndTag, rest[2..close].trim().to_string())
        } else {
            (TokenKind::XmlStartTag, rest[1..close].trim().to_string())
        };
        let end = self.pos + close + 1;
        while self.pos < end {
            self.bump();
        }
        Some(self.token(kind, start, loc, TokenValue::Text(inner)))
    }

    fn next_dialogue_token(&mut self) -> Token {
        loop {
            let start = self.pos;
            let loc = self.location();
            let Some(ch) = self.peek() else {
                self.error(
                    "LEX_UNTERMINATED_DIALOGUE",
                    "Dialogue block is missing </PRE>.",
                    loc,
                );
                return self.eof();
            };

            match ch {
                '\n' => {
                    self.bump();
                    self.line_start = true;
                    return self.token(TokenKind::MarkupLineBreak, start, loc, TokenValue::None);
                }
                '\r' => {
                    self.bump();
                    continue;
                }
                '<' if self.tag_candidate() => {
                    if let Some(token) = self.lex_tag(start, loc) {
                        if token.is_dialogue_end() {
                            self.modes.pop();
                        }
                        self.line_start = false;
                        return token;
                    }
                }
                '{' => {
                    self.bump();
                    self.modes.push(Mode::Embedded { depth: 1 });
                    return self.token(TokenKind::OpenBrace, start, loc, TokenValue::None);
                }
                '[' if self.line_start => {
                    if let Some(token) = self.lex_dialogue_identifier(start, loc) {
                        self.line_start = false;
                        return token;
                    }
                }
                _ => {}
            }

            if let Some(token) = self.lex_markup_text(start, loc) {
                return token;
            }
        }
    }

    fn lex_dialogue_identifier(&mut self, start: usize, loc: SourceLocation) -> Option<Token> {
        let rest = self.rest();
        let close = rest.find(']')?;
        let name = &rest[1..close];
        if name.is_empty() || !name.chars().all(is_ident_char) {
            return None;
        }
        let name = name.to_string();
        for _ in 0..name.chars().count() + 2 {
            self.bump();
        }
        Some(self.token(
            TokenKind::DialogueIdentifier,
            start,
            loc,
            TokenValue::Text(name),
        ))
    }

    /// A run of text up to a line break, tag, or embedded code. Whitespace-only
    /// runs are skipped and yield `None`.
    fn lex_markup_text(&mut self, start: usize, loc: SourceLocation) -> Option<Token> {
        let mut first = true;
        while let Some(ch) = self.peek() {
            let stop = match ch {
                '\n' | '{' => true,
                '\r' => self.peek_at(1) == Some('\n'),
                '<' => !first && self.tag_candidate(),
                _ => false,
            };
            if stop {
                break;
            }
            self.bump();
            first = false;
        }
        let raw = &self.source[start..self.pos];
        let at_break = matches!(self.peek(), None | Some('\n') | Some('\r'));
        let mut text = raw;
        if self.line_start {
            text = text.trim_start();
        }
        if at_break {
            text = text.trim_end();
        }
        if text.is_empty() {
            return None;
        }
        let value = TokenValue::Text(text.to_string());
        self.line_start = false;
        Some(self.token(TokenKind::MarkupText, start, loc, value))
    }
}
