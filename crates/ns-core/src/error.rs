use crate::types::SourceSpan;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
#[error("{code}: {message}")]
pub struct NsError {
    pub code: String,
    pub message: String,
    pub span: Option<SourceSpan>,
}

impl NsError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            span: None,
        }
    }

    pub fn with_span(code: impl Into<String>, message: impl Into<String>, span: SourceSpan) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            span: Some(span),
        }
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn display_joins_code_and_message() {
        let error = NsError::new("VM_NO_FRAME", "No frame available.");
        assert_eq!(error.to_string(), "VM_NO_FRAME: No frame available.");
        assert!(error.span.is_none());
    }

    #[test]
    fn with_span_keeps_location() {
        let error = NsError::with_span("PARSE_UNEXPECTED_TOKEN", "bad", SourceSpan::synthetic());
        assert_eq!(error.span, Some(SourceSpan::synthetic()));
    }
}
