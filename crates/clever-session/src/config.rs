//! Configuration for the session cache and store.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default maximum number of sessions to cache.
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// Default TTL for cached sessions (none by default - entries stay until evicted).
pub const DEFAULT_TTL: Option<Duration> = None;

/// Default upper bound on a single repository call.
pub const DEFAULT_REPOSITORY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default attribute key holding the principal's login name.
pub const DEFAULT_PRINCIPAL_KEY: &str = "login_name";

/// Default attribute key holding the authenticated marker.
pub const DEFAULT_AUTHENTICATED_KEY: &str = "authenticated";

/// Configuration for the in-process session cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of sessions to cache before LRU eviction.
    pub max_sessions: usize,

    /// Optional idle time-to-live for cached sessions.
    pub ttl: Option<Duration>,

    /// Interval for the background cleanup task, if one is spawned.
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            ttl: DEFAULT_TTL,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of sessions to cache.
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Set the TTL for cached sessions.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set the cleanup interval.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}

/// Configuration for a [`SessionStore`](crate::SessionStore).
///
/// ```toml
/// [session]
/// max_sessions = 10000
/// ttl_secs = 1800
/// cleanup_interval_secs = 60
/// repository_timeout_ms = 5000
/// principal_key = "login_name"
/// authenticated_key = "authenticated"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum number of sessions held in the cache.
    pub max_sessions: usize,

    /// Idle TTL for cache entries in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,

    /// Interval in seconds between cache cleanup runs.
    pub cleanup_interval_secs: u64,

    /// Upper bound on each repository call, in milliseconds.
    pub repository_timeout_ms: u64,

    /// Attribute key the login name is read from.
    pub principal_key: String,

    /// Attribute key the authenticated marker is read from.
    pub authenticated_key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            ttl_secs: None,
            cleanup_interval_secs: 60,
            repository_timeout_ms: DEFAULT_REPOSITORY_TIMEOUT.as_millis() as u64,
            principal_key: DEFAULT_PRINCIPAL_KEY.to_string(),
            authenticated_key: DEFAULT_AUTHENTICATED_KEY.to_string(),
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached sessions.
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Set the cache TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = Some(ttl.as_secs());
        self
    }

    /// Set the per-call repository timeout.
    pub fn with_repository_timeout(mut self, timeout: Duration) -> Self {
        self.repository_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the attribute key for the login name.
    pub fn with_principal_key(mut self, key: impl Into<String>) -> Self {
        self.principal_key = key.into();
        self
    }

    /// Set the attribute key for the authenticated marker.
    pub fn with_authenticated_key(mut self, key: impl Into<String>) -> Self {
        self.authenticated_key = key.into();
        self
    }

    /// Per-call repository timeout.
    pub fn repository_timeout(&self) -> Duration {
        Duration::from_millis(self.repository_timeout_ms)
    }

    /// Derive the cache configuration.
    pub fn cache_config(&self) -> CacheConfig {
        let mut config = CacheConfig::new()
            .with_max_sessions(self.max_sessions)
            .with_cleanup_interval(Duration::from_secs(self.cleanup_interval_secs.max(1)));
        if let Some(secs) = self.ttl_secs {
            config = config.with_ttl(Duration::from_secs(secs));
        }
        config
    }
}
