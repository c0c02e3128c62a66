use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::NsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: SourceLocation,
    pub end: SourceLocation,
}

impl SourceSpan {
    pub fn synthetic() -> Self {
        Self {
            start: SourceLocation { line: 1, column: 1 },
            end: SourceLocation { line: 1, column: 1 },
        }
    }

    pub fn to(self, other: SourceSpan) -> SourceSpan {
        SourceSpan {
            start: self.start,
            end: other.end,
        }
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start.line, self.start.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub span: SourceSpan,
}

impl Diagnostic {
    pub fn error(code: impl Into<String>, message: impl Into<String>, span: SourceSpan) -> Self {
        Self {
            severity: Severity::Error,
            code: code.into(),
            message: message.into(),
            span,
        }
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>, span: SourceSpan) -> Self {
        Self {
            severity: Severity::Warning,
            code: code.into(),
            message: message.into(),
            span,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn into_error(self, file: &str) -> NsError {
        NsError::with_span(
            self.code,
            format!("{}:{}: {}", file, self.span, self.message),
            self.span,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubroutineKind {
    Chapter,
    Scene,
    Function,
    DialogueBlock,
}

impl SubroutineKind {
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Chapter => 0,
            Self::Scene => 1,
            Self::Function => 2,
            Self::DialogueBlock => 3,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Chapter),
            1 => Some(Self::Scene),
            2 => Some(Self::Function),
            3 => Some(Self::DialogueBlock),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Chapter => "chapter",
            Self::Scene => "scene",
            Self::Function => "function",
            Self::DialogueBlock => "dialogue",
        }
    }
}

#[cfg(test)]
mod types_tests {
    use super::*;

    #[test]
    fn subroutine_kind_bytes_are_stable() {
        for kind in [
            SubroutineKind::Chapter,
            SubroutineKind::Scene,
            SubroutineKind::Function,
            SubroutineKind::DialogueBlock,
        ] {
            assert_eq!(SubroutineKind::from_byte(kind.to_byte()), Some(kind));
        }
        assert_eq!(SubroutineKind::from_byte(9), None);
    }

    #[test]
    fn diagnostic_into_error_prefixes_file_and_position() {
        let diagnostic = Diagnostic::error("LEX_UNTERMINATED_STRING", "open string", SourceSpan::synthetic());
        assert!(diagnostic.is_error());
        let error = diagnostic.into_error("main.nss");
        assert_eq!(error.code, "LEX_UNTERMINATED_STRING");
        assert_eq!(error.message, "main.nss:1:1: open string");
    }
}
