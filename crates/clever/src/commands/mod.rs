//! CLI command handlers.

use std::sync::Arc;

use clever_session::SessionStore;
use clever_session_sqlite::SqliteRepository;

pub mod config;
pub mod sessions;

/// Shared context for session commands.
#[derive(Clone)]
pub struct Context {
    /// Store backed by the configured database.
    pub store: SessionStore,
    /// Direct handle for record-level queries the store does not expose.
    pub repository: Arc<SqliteRepository>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}
