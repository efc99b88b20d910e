//! Error types for the SQLite session repository.

use clever_session::RepositoryError;
use rusqlite::ffi;
use thiserror::Error;

/// Errors that can occur opening or querying the session database.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// Database connection or statement failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Could not prepare the database location.
    #[error("failed to create database directory '{path}': {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
}

/// Result type alias for SQLite repository operations.
pub type Result<T> = std::result::Result<T, SqliteError>;

impl From<SqliteError> for RepositoryError {
    fn from(err: SqliteError) -> Self {
        match &err {
            SqliteError::Database(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                RepositoryError::Duplicate(err.to_string())
            }
            _ => RepositoryError::Unavailable(err.to_string()),
        }
    }
}
