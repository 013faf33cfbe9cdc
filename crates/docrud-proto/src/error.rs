//! Protocol error types.

use thiserror::Error;

/// Errors raised while building or converting documents.
#[derive(Debug, Error)]
pub enum Error {
    /// The string is not a valid 24-character hexadecimal object id.
    #[error("invalid object id: {0:?}")]
    InvalidObjectId(String),

    /// A JSON payload could not be interpreted as a document.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidObjectId("not-an-id".into());
        assert!(err.to_string().contains("not-an-id"));

        let err = Error::InvalidDocument("expected an object".into());
        assert_eq!(err.to_string(), "invalid document: expected an object");
    }
}
