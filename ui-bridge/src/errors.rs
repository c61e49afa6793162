use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Element is not visible: {0}")]
    ElementNotVisible(String),

    #[error("Element is not enabled: {0}")]
    ElementNotEnabled(String),

    /// Raised by a binding when another element covers the target; the
    /// payload names the covering element.
    #[error("Element is obscured by another element: {0}")]
    ElementObscured(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Action failed: {0}")]
    ActionFailed(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeError {
    /// The wire code reported to callers when this error ends an action.
    pub fn code(&self) -> ErrorCode {
        match self {
            BridgeError::ElementNotFound(_) => ErrorCode::ElementNotFound,
            BridgeError::ElementNotVisible(_) => ErrorCode::ElementNotVisible,
            BridgeError::ElementNotEnabled(_) => ErrorCode::ElementNotEnabled,
            BridgeError::Timeout(_) => ErrorCode::Timeout,
            _ => ErrorCode::ActionFailed,
        }
    }
}

/// Machine-readable failure codes carried in responses and error contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No candidate cleared the confidence threshold.
    ElementNotFound,
    /// A candidate existed but scored below the threshold.
    LowConfidence,
    /// The element was resolved but the primitive action failed.
    ActionFailed,
    /// A wait or polling deadline passed.
    Timeout,
    /// The instruction did not match the grammar.
    ParseFailed,
    ElementNotVisible,
    ElementNotEnabled,
    AssertionFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ElementNotFound => "ELEMENT_NOT_FOUND",
            ErrorCode::LowConfidence => "LOW_CONFIDENCE",
            ErrorCode::ActionFailed => "ACTION_FAILED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::ParseFailed => "PARSE_FAILED",
            ErrorCode::ElementNotVisible => "ELEMENT_NOT_VISIBLE",
            ErrorCode::ElementNotEnabled => "ELEMENT_NOT_ENABLED",
            ErrorCode::AssertionFailed => "ASSERTION_FAILED",
        }
    }

    /// Whether the code means the target could not be resolved.
    pub fn is_resolution_failure(&self) -> bool {
        matches!(self, ErrorCode::ElementNotFound | ErrorCode::LowConfidence)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::LowConfidence).unwrap();
        assert_eq!(json, "\"LOW_CONFIDENCE\"");
        let back: ErrorCode = serde_json::from_str("\"PARSE_FAILED\"").unwrap();
        assert_eq!(back, ErrorCode::ParseFailed);
    }

    #[test]
    fn test_bridge_error_maps_to_code() {
        assert_eq!(
            BridgeError::ElementNotVisible("x".into()).code(),
            ErrorCode::ElementNotVisible
        );
        assert_eq!(BridgeError::Timeout("x".into()).code(), ErrorCode::Timeout);
        assert_eq!(
            BridgeError::ElementObscured("x".into()).code(),
            ErrorCode::ActionFailed
        );
    }
}
