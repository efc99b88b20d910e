//! Durable storage contract for session records.
//!
//! The [`SessionRepository`] trait decouples the store from any specific
//! backend. Implementations only need per-row atomicity; the store never
//! asks for cross-record transactions.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::{RepositoryError, RepositoryResult};
use crate::session::{OnlineFlag, Page, SessionRecord};

/// Durable key-value CRUD over session records, keyed by session ID.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a new record.
    ///
    /// Returns [`RepositoryError::Duplicate`] if a record with the same ID exists.
    async fn save(&self, record: &SessionRecord) -> RepositoryResult<()>;

    /// Replace an existing record.
    ///
    /// Returns [`RepositoryError::NotFound`] if no record with that ID exists.
    async fn update(&self, record: &SessionRecord) -> RepositoryResult<()>;

    /// Delete a record. Returns `true` if a row was removed.
    async fn delete_by_session_id(&self, session_id: &str) -> RepositoryResult<bool>;

    /// Fetch a record. Absence is `Ok(None)`, not an error.
    async fn get_by_session_id(&self, session_id: &str) -> RepositoryResult<Option<SessionRecord>>;

    /// Page over records with the given online flag, most recently updated first.
    async fn list_by_online(&self, online: OnlineFlag, page: Page) -> RepositoryResult<Vec<SessionRecord>>;

    /// Count records with the given online flag.
    async fn count_by_online(&self, online: OnlineFlag) -> RepositoryResult<u64>;

    /// Delete every record last updated before `cutoff`. Returns the number removed.
    async fn delete_updated_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<u64>;
}

/// In-process repository backed by a hash map.
///
/// Useful for tests and single-node deployments that do not need to survive
/// a restart.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    records: RwLock<HashMap<String, SessionRecord>>,
}

impl MemoryRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the repository holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl SessionRepository for MemoryRepository {
    async fn save(&self, record: &SessionRecord) -> RepositoryResult<()> {
        let mut records = self.records.write();
        if records.contains_key(&record.session_id) {
            return Err(RepositoryError::Duplicate(record.session_id.clone()));
        }
        records.insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    async fn update(&self, record: &SessionRecord) -> RepositoryResult<()> {
        let mut records = self.records.write();
        match records.get_mut(&record.session_id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(record.session_id.clone())),
        }
    }

    async fn delete_by_session_id(&self, session_id: &str) -> RepositoryResult<bool> {
        Ok(self.records.write().remove(session_id).is_some())
    }

    async fn get_by_session_id(&self, session_id: &str) -> RepositoryResult<Option<SessionRecord>> {
        Ok(self.records.read().get(session_id).cloned())
    }

    async fn list_by_online(&self, online: OnlineFlag, page: Page) -> RepositoryResult<Vec<SessionRecord>> {
        let records = self.records.read();
        let mut matching: Vec<&SessionRecord> =
            records.values().filter(|r| r.online == online).collect();
        matching.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(matching
            .into_iter()
            .skip(page.offset())
            .take(page.size)
            .cloned()
            .collect())
    }

    async fn count_by_online(&self, online: OnlineFlag) -> RepositoryResult<u64> {
        let records = self.records.read();
        Ok(records.values().filter(|r| r.online == online).count() as u64)
    }

    async fn delete_updated_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<u64> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, r| r.updated_at >= cutoff);
        Ok((before - records.len()) as u64)
    }
}
