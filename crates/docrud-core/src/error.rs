//! Core error types.

use docrud_proto::ObjectId;
use thiserror::Error;

/// Core data-access errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] docrud_proto::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// No document with the given identifier exists (or it is not visible
    /// to the caller).
    #[error("no {entity} found with id {id}")]
    NotFound {
        /// Entity type name.
        entity: String,
        /// Requested identifier, as given.
        id: String,
    },

    /// The caller may not perform the request.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Invalid data or condition format.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The entity type is not registered.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// A populate path nests deeper than allowed.
    #[error("populate path '{path}' exceeds maximum depth {max_depth}")]
    DepthExceeded {
        /// Offending dot-path.
        path: String,
        /// Configured limit.
        max_depth: usize,
    },

    /// A document with this identifier already exists.
    #[error("duplicate id {0}")]
    DuplicateId(ObjectId),
}

impl Error {
    /// Shorthand for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Check whether this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            Error::Deserialization(err.to_string())
        } else {
            Error::Serialization(err.to_string())
        }
    }
}
