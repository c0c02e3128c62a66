use std::fmt;

use ns_core::{format_number, BinaryOperator, SourceSpan, UnaryOperator};

use crate::lexer::is_sigiled_identifier;
use crate::markup::MarkupNode;

/// Identity of a node within one parse, used to attach symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub path: String,
    pub includes: Vec<Include>,
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Include {
    pub path: String,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Chapter(Chapter),
    Scene(Scene),
    Function(Function),
    DialogueBlock(DialogueBlock),
}

impl Member {
    pub fn id(&self) -> NodeId {
        match self {
            Self::Chapter(chapter) => chapter.id,
            Self::Scene(scene) => scene.id,
            Self::Function(function) => function.id,
            Self::DialogueBlock(block) => block.id,
        }
    }

    pub fn span(&self) -> SourceSpan {
        match self {
            Self::Chapter(chapter) => chapter.span,
            Self::Scene(scene) => scene.span,
            Self::Function(function) => function.span,
            Self::DialogueBlock(block) => block.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub id: NodeId,
    pub name: String,
    pub body: Block,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub id: NodeId,
    pub name: String,
    pub body: Block,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub id: NodeId,
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub body: Block,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub id: NodeId,
    pub name: String,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: NodeId,
    pub statements: Vec<Statement>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DialogueBlock {
    pub id: NodeId,
    pub box_name: String,
    pub identifier: Option<String>,
    pub parts: Vec<DialoguePart>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DialoguePart {
    Markup(MarkupContent),
    Statements(Block),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkupContent {
    pub nodes: Vec<MarkupNode>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub id: NodeId,
    pub kind: StatementKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Block(Block),
    If {
        condition: Expression,
        then_branch: Box<Statement>,
        else_branch: Option<Box<Statement>>,
    },
    While {
        condition: Expression,
        body: Box<Statement>,
    },
    Select {
        cases: Vec<SelectCase>,
    },
    CallChapter {
        target: String,
    },
    CallScene {
        target: String,
    },
    Return(Option<Expression>),
    Break,
    Expression(Expression),
    DialogueBlock(DialogueBlock),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectCase {
    pub id: NodeId,
    pub label: String,
    pub body: Statement,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub id: NodeId,
    pub kind: ExpressionKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Literal(Literal),
    Identifier(String),
    Unary {
        operator: UnaryOperator,
        operand: Box<Expression>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// `target` is always an `Identifier` expression; `value` is absent for `++`/`--`.
    Assignment {
        target: Box<Expression>,
        operator: AssignmentOperator,
        value: Option<Box<Expression>>,
    },
    Call {
        callee: String,
        arguments: Vec<Expression>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Number(f64),
    DeltaNumber(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOperator {
    Assign,
    AddAssign,
    SubtractAssign,
    MultiplyAssign,
    DivideAssign,
    Increment,
    Decrement,
}

impl AssignmentOperator {
    /// The arithmetic applied to the old value, if any.
    pub fn binary(self) -> Option<BinaryOperator> {
        match self {
            Self::Assign => None,
            Self::AddAssign | Self::Increment => Some(BinaryOperator::Add),
            Self::SubtractAssign | Self::Decrement => Some(BinaryOperator::Subtract),
            Self::MultiplyAssign => Some(BinaryOperator::Multiply),
            Self::DivideAssign => Some(BinaryOperator::Divide),
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Assign => "=",
            Self::AddAssign => "+=",
            Self::SubtractAssign => "-=",
            Self::MultiplyAssign => "*=",
            Self::DivideAssign => "/=",
            Self::Increment => "++",
            Self::Decrement => "--",
        }
    }
}

pub(crate) fn binary_precedence(operator: BinaryOperator) -> u8 {
    match operator {
        BinaryOperator::LogicalOr => 2,
        BinaryOperator::LogicalAnd => 3,
        BinaryOperator::Equal | BinaryOperator::NotEqual => 4,
        BinaryOperator::LessThan
        | BinaryOperator::LessThanOrEqual
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterThanOrEqual => 5,
        BinaryOperator::Add | BinaryOperator::Subtract => 6,
        BinaryOperator::Multiply | BinaryOperator::Divide | BinaryOperator::Remainder => 7,
    }
}

const UNARY_PRECEDENCE: u8 = 8;
const PRIMARY_PRECEDENCE: u8 = 9;

impl Expression {
    fn precedence(&self) -> u8 {
        match &self.kind {
            ExpressionKind::Assignment { .. } => 1,
            ExpressionKind::Binary { operator, .. } => binary_precedence(*operator),
            ExpressionKind::Unary { .. } => UNARY_PRECEDENCE,
            _ => PRIMARY_PRECEDENCE,
        }
    }

    fn write_operand(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        if self.precedence() < min {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            ExpressionKind::Identifier(name) => Some(name.as_str()),
            _ => None,
        }
    }
}

pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

fn write_target(f: &mut fmt::Formatter<'_>, target: &str) -> fmt::Result {
    let bare = !target.is_empty()
        && target.chars().all(|c| c.is_alphanumeric() || c == '_')
        && target.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_');
    if bare || is_sigiled_identifier(target) {
        write!(f, "{}", target)
    } else {
        write!(f, "{}", quote(target))
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Boolean(value) => write!(f, "{}", value),
            Self::Number(value) => write!(f, "{}", format_number(*value)),
            Self::DeltaNumber(value) => write!(f, "@{}", format_number(*value)),
            Self::String(text) => write!(f, "{}", quote(text)),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExpressionKind::Literal(literal) => write!(f, "{}", literal),
            ExpressionKind::Identifier(name) => write!(f, "{}", name),
            ExpressionKind::Unary { operator, operand } => {
                write!(f, "{}", operator.symbol())?;
                if matches!(operand.kind, ExpressionKind::Unary { .. }) {
                    write!(f, "({})", operand)
                } else {
                    operand.write_operand(f, UNARY_PRECEDENCE)
                }
            }
            ExpressionKind::Binary {
                operator,
                left,
                right,
            } => {
                let precedence = binary_precedence(*operator);
                left.write_operand(f, precedence)?;
                write!(f, " {} ", operator.symbol())?;
                right.write_operand(f, precedence + 1)
            }
            ExpressionKind::Assignment {
                target,
                operator,
                value,
            } => match value {
                Some(value) => write!(f, "{} {} {}", target, operator.symbol(), value),
                None => write!(f, "{}{}", target, operator.symbol()),
            },
            ExpressionKind::Call { callee, arguments } => {
                write!(f, "{}(", callee)?;
                for (index, argument) in arguments.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", argument)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{{")?;
        for statement in &self.statements {
            writeln!(f, "{}", statement)?;
        }
        write!(f, "}}")
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StatementKind::Block(block) => write!(f, "{}", block),
            StatementKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                write!(f, "if ({})\n{}", condition, then_branch)?;
                if let Some(else_branch) = else_branch {
                    write!(f, "\nelse\n{}", else_branch)?;
                }
                Ok(())
            }
            StatementKind::While { condition, body } => write!(f, "while ({})\n{}", condition, body),
            StatementKind::Select { cases } => {
                writeln!(f, "select\n{{")?;
                for case in cases {
                    write!(f, "case ")?;
                    write_target(f, &case.label)?;
                    writeln!(f, ":\n{}", case.body)?;
                }
                write!(f, "}}")
            }
            StatementKind::CallChapter { target } => write!(f, "call_chapter {};", quote(target)),
            StatementKind::CallScene { target } => write!(f, "call_scene {};", quote(target)),
            StatementKind::Return(Some(value)) => write!(f, "return {};", value),
            StatementKind::Return(None) => write!(f, "return;"),
            StatementKind::Break => write!(f, "break;"),
            StatementKind::Expression(expression) => write!(f, "{};", expression),
            StatementKind::DialogueBlock(block) => write!(f, "{}", block),
            StatementKind::Empty => write!(f, ";"),
        }
    }
}

impl fmt::Display for MarkupContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            write!(f, "{}", node)?;
        }
        Ok(())
    }
}

impl fmt::Display for DialogueBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.box_name.is_empty() {
            writeln!(f, "<PRE>")?;
        } else {
            writeln!(f, "<PRE {}>", self.box_name)?;
        }
        if let Some(identifier) = &self.identifier {
            writeln!(f, "[{}]", identifier)?;
        }
        for part in &self.parts {
            match part {
                DialoguePart::Markup(content) => writeln!(f, "{}", content)?,
                DialoguePart::Statements(block) => writeln!(f, "{}", block)?,
            }
        }
        write!(f, "</PRE>")
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chapter(chapter) => write!(f, "chapter {}\n{}", chapter.name, chapter.body),
            Self::Scene(scene) => write!(f, "scene {}\n{}", scene.name, scene.body),
            Self::Function(function) => {
                let parameters: Vec<&str> = function
                    .parameters
                    .iter()
                    .map(|parameter| parameter.name.as_str())
                    .collect();
                write!(
                    f,
                    "function {}({})\n{}",
                    function.name,
                    parameters.join(", "),
                    function.body
                )
            }
            Self::DialogueBlock(block) => write!(f, "{}", block),
        }
    }
}

impl fmt::Display for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for include in &self.includes {
            writeln!(f, "#include {}", quote(&include.path))?;
        }
        for (index, member) in self.members.iter().enumerate() {
            if index > 0 || !self.includes.is_empty() {
                writeln!(f)?;
            }
            writeln!(f, "{}", member)?;
        }
        Ok(())
    }
}
