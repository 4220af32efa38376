//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while decoding a request.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Body is not a JSON object.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A required field is missing.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// A field has an unusable value.
    #[error("invalid '{field}': {message}")]
    InvalidField {
        /// Wire name of the field.
        field: &'static str,
        /// Description of the problem.
        message: String,
    },
}

impl ProtocolError {
    /// Creates an invalid field error.
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }

    /// Returns the stable error kind name reported to clients.
    pub fn kind(&self) -> &'static str {
        "MalformedRequest"
    }
}
