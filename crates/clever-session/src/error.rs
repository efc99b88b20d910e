//! Error types for session store operations.

/// Error type for session store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Session ID was blank or missing. Raised before cache or repository is touched.
    #[error("Invalid session ID: must not be blank")]
    InvalidSessionId,

    /// Session could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The durable store could not be reached (I/O failure or timeout).
    #[error("Repository unavailable: {0}")]
    RepositoryUnavailable(String),

    /// The durable store rejected the operation.
    #[error("Repository error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for Error {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Unavailable(msg) => Error::RepositoryUnavailable(msg),
            other => Error::Repository(other),
        }
    }
}

/// Result type for session store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while encoding or decoding a session blob.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Float attribute that has no lossless encoding (NaN or infinite).
    #[error("attribute '{key}' holds a non-finite float")]
    NonFiniteFloat { key: String },

    /// Attribute values nested deeper than the codec allows.
    #[error("attribute '{key}' exceeds maximum nesting depth of {max_depth}")]
    TooDeep { key: String, max_depth: usize },

    /// Attribute map contains an empty key.
    #[error("attribute keys must not be empty")]
    EmptyKey,

    /// Blob was written with a format this codec does not understand.
    #[error("unsupported session format version {0}")]
    UnsupportedVersion(u32),

    /// Decoded session carried a blank ID.
    #[error("decoded session has a blank ID")]
    BlankId,

    /// Underlying serialization failure (malformed bytes, I/O).
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors returned by [`SessionRepository`](crate::SessionRepository) backends.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    /// Backend could not be reached or failed mid-operation.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A record with the same session ID already exists.
    #[error("duplicate session record: {0}")]
    Duplicate(String),

    /// The record to update does not exist.
    #[error("session record not found: {0}")]
    NotFound(String),
}

/// Result type for repository operations.
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;
