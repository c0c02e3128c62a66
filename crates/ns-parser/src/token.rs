use std::fmt;

use ns_core::SourceSpan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier,
    StringLiteral,
    NumericLiteral,

    Chapter,
    Scene,
    Function,
    If,
    Else,
    While,
    Select,
    Case,
    CallChapter,
    CallScene,
    Return,
    Break,
    True,
    False,
    Null,

    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    Comma,
    Semicolon,
    Colon,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PlusPlus,
    MinusMinus,
    EqualEqual,
    BangEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    AndAnd,
    OrOr,

    XmlStartTag,
    XmlEndTag,
    DialogueIdentifier,
    MarkupText,
    MarkupLineBreak,
    IncludeDirective,
    Bad,
    Eof,
}

impl TokenKind {
    pub fn keyword(text: &str) -> Option<TokenKind> {
        let kind = match text {
            "chapter" => Self::Chapter,
            "scene" => Self::Scene,
            "function" => Self::Function,
            "if" => Self::If,
            "else" => Self::Else,
            "while" => Self::While,
            "select" => Self::Select,
            "case" => Self::Case,
            "call_chapter" => Self::CallChapter,
            "call_scene" => Self::CallScene,
            "return" => Self::Return,
            "break" => Self::Break,
            "true" => Self::True,
            "false" => Self::False,
            "null" => Self::Null,
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_member_keyword(self) -> bool {
        matches!(self, Self::Chapter | Self::Scene | Self::Function)
    }

    pub fn is_markup(self) -> bool {
        matches!(
            self,
            Self::XmlStartTag | Self::XmlEndTag | Self::MarkupText | Self::MarkupLineBreak
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    None,
    Number(f64),
    DeltaNumber(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub value: TokenValue,
    pub span: SourceSpan,
}

impl Token {
    pub fn text_value(&self) -> &str {
        match &self.value {
            TokenValue::Text(text) => text.as_str(),
            _ => self.text.as_str(),
        }
    }

    /// For tags, the element name (`<PRE box01>` is `PRE`).
    pub fn tag_name(&self) -> Option<&str> {
        match self.kind {
            TokenKind::XmlStartTag | TokenKind::XmlEndTag => {
                self.text_value().split_whitespace().next()
            }
            _ => None,
        }
    }

    pub fn is_dialogue_start(&self) -> bool {
        self.kind == TokenKind::XmlStartTag
            && self
                .tag_name()
                .is_some_and(|name| name.eq_ignore_ascii_case("PRE"))
    }

    pub fn is_dialogue_end(&self) -> bool {
        self.kind == TokenKind::XmlEndTag
            && self
                .tag_name()
                .is_some_and(|name| name.eq_ignore_ascii_case("PRE"))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Eof => write!(f, "end of file"),
            TokenKind::MarkupLineBreak => write!(f, "line break"),
            _ => write!(f, "'{}'", self.text),
        }
    }
}
