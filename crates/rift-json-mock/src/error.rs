//! Error taxonomy for request matching and response generation.
//!
//! Every failure is a synchronous assertion failure: there is no retry path.
//! The `Display` form of each variant is exactly the message a test sees.

use thiserror::Error;

/// Failure raised while matching a captured request or producing its response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MockError {
    /// Declared expectation does not match the observed request.
    #[error("{0}")]
    Mismatch(String),

    /// Required field absent, or forbidden field present.
    #[error("{0}")]
    Presence(String),

    /// Test-authoring bug (response set twice, conflicting body sources, ...).
    #[error("{0}")]
    Configuration(String),

    /// Malformed media type, JSON body or definition file.
    #[error("{0}")]
    Parse(String),

    /// Mismatch reported by the JSON assertion engine.
    #[error("{path}: {message}")]
    Json { path: String, message: String },

    /// Value could not be serialized through the JSON codec.
    #[error("JSON serialization failed: {0}")]
    Codec(String),

    /// No registered expectation was able to take the request.
    #[error("{0}")]
    Unexpected(String),

    /// Registered expectations were left unsatisfied.
    #[error("{0}")]
    Verification(String),
}

impl MockError {
    pub(crate) fn mismatch(message: impl Into<String>) -> Self {
        MockError::Mismatch(message.into())
    }

    pub(crate) fn presence(message: impl Into<String>) -> Self {
        MockError::Presence(message.into())
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        MockError::Configuration(message.into())
    }

    pub(crate) fn parse(message: impl Into<String>) -> Self {
        MockError::Parse(message.into())
    }

    pub(crate) fn json(path: impl Into<String>, message: impl Into<String>) -> Self {
        MockError::Json {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this error marks a test-authoring bug that must surface immediately.
    pub fn is_configuration(&self) -> bool {
        matches!(self, MockError::Configuration(_))
    }
}

impl From<serde_json::Error> for MockError {
    fn from(e: serde_json::Error) -> Self {
        MockError::Codec(e.to_string())
    }
}

/// Crate-wide result alias.
pub type Result<T, E = MockError> = std::result::Result<T, E>;
