//! Cache-aside session store with durable records and online tracking.
//!
//! This crate keeps per-client session state consistent between a fast
//! in-process cache and a durable repository:
//! - [`SessionStore`] orchestrates create/read/update/delete
//! - [`SessionCache`] is an LRU with optional idle TTL, never authoritative
//! - [`SessionRepository`] is the durable backend contract
//! - [`SessionCodec`] turns sessions into the blobs the repository stores
//!
//! Each write also records an online flag derived from the session's
//! authenticated marker, so the repository can answer "who is online".
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use clever_session::{JsonCodec, MemoryRepository, Session, SessionStore, StoreConfig};
//!
//! let store = SessionStore::new(
//!     Arc::new(MemoryRepository::new()),
//!     Arc::new(JsonCodec::new()),
//!     StoreConfig::default(),
//! );
//!
//! let session = Session::new("abc123").with_attribute("authenticated", "true");
//! store.create(&session).await?;
//! let loaded = store.read("abc123").await?;
//! ```

mod cache;
mod codec;
mod config;
mod error;
mod repository;
mod session;
mod store;
mod ttl;

pub use cache::{CacheStats, SessionCache};
pub use codec::{DEFAULT_MAX_DEPTH, FORMAT_VERSION, JsonCodec, SessionCodec};
pub use config::{
    CacheConfig, DEFAULT_AUTHENTICATED_KEY, DEFAULT_MAX_SESSIONS, DEFAULT_PRINCIPAL_KEY,
    DEFAULT_REPOSITORY_TIMEOUT, StoreConfig,
};
pub use error::{CodecError, Error, RepositoryError, RepositoryResult, Result};
pub use repository::{MemoryRepository, SessionRepository};
pub use session::{AttributeValue, OnlineFlag, Page, Session, SessionRecord};
pub use store::SessionStore;
