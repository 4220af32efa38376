//! Error types for the broker server.

use synclitedb_protocol::{ProtocolError, Response};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that end a request before it reaches the broker.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Request body could not be decoded.
    #[error(transparent)]
    Malformed(#[from] ProtocolError),

    /// Request body could not be read.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Only POST is served.
    #[error("method {0} not allowed, use POST")]
    MethodNotAllowed(String),

    /// Body exceeds the configured limit.
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge {
        /// Configured limit.
        limit: usize,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::Malformed(_)
                | ServerError::InvalidRequest(_)
                | ServerError::MethodNotAllowed(_)
                | ServerError::PayloadTooLarge { .. }
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Internal(_) | ServerError::Io(_))
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::Malformed(_) | ServerError::InvalidRequest(_) => 400,
            ServerError::MethodNotAllowed(_) => 405,
            ServerError::PayloadTooLarge { .. } => 413,
            ServerError::Internal(_) | ServerError::Io(_) => 500,
        }
    }

    /// JSON body sent along with the error status.
    pub fn to_response(&self) -> Response {
        match self {
            ServerError::Malformed(err) => Response::from_protocol_error(err),
            other => Response::failure(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::MethodNotAllowed("GET".into()).is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(!ServerError::PayloadTooLarge { limit: 1 }.is_server_error());
    }

    #[test]
    fn status_codes() {
        let malformed = ServerError::from(ProtocolError::MissingField("sql"));
        assert_eq!(malformed.status_code(), 400);
        assert_eq!(ServerError::MethodNotAllowed("PUT".into()).status_code(), 405);
        assert_eq!(ServerError::PayloadTooLarge { limit: 8 }.status_code(), 413);
        assert_eq!(ServerError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn error_bodies() {
        let body = ServerError::from(ProtocolError::MissingField("db-path")).to_response();
        assert!(!body.result);
        assert_eq!(body.message, "MalformedRequest: missing required field 'db-path'");

        let body = ServerError::PayloadTooLarge { limit: 8 }.to_response();
        assert_eq!(body.message, "request body exceeds 8 bytes");
    }
}
