//! SQLite-backed session repository.
//!
//! Provides [`SqliteRepository`], a durable
//! [`SessionRepository`](clever_session::SessionRepository) that keeps one
//! row per session in a `login_sessions` table. Rows carry the encoded
//! session, the derived online flag and the login name so that "who is
//! online" can be answered with an indexed query instead of decoding blobs.

mod error;
mod repository;

pub use error::{Result, SqliteError};
pub use repository::SqliteRepository;
