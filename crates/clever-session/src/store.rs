//! Cache-aside session store.
//!
//! [`SessionStore`] owns a repository, a cache and a codec and exposes
//! create/read/update/delete over them. The repository is authoritative:
//! writes go to it first and the cache is populated afterwards, reads fall
//! through to it on a miss. The two steps are not atomic; a reader racing a
//! writer may miss the cache and read the repository instead.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::cache::{CacheStats, SessionCache};
use crate::codec::SessionCodec;
use crate::config::StoreConfig;
use crate::error::{Error, RepositoryError, RepositoryResult, Result};
use crate::repository::SessionRepository;
use crate::session::{AttributeValue, OnlineFlag, Page, Session, SessionRecord, is_blank};

/// Session store keeping a durable repository and an in-process cache in step.
///
/// Cloning is cheap; clones share the repository, cache and codec.
#[derive(Clone)]
pub struct SessionStore {
    repository: Arc<dyn SessionRepository>,
    cache: SessionCache,
    codec: Arc<dyn SessionCodec>,
    config: StoreConfig,
}

impl SessionStore {
    /// Create a store with a fresh cache sized from `config`.
    pub fn new(
        repository: Arc<dyn SessionRepository>,
        codec: Arc<dyn SessionCodec>,
        config: StoreConfig,
    ) -> Self {
        let cache = SessionCache::new(config.cache_config());
        Self::with_cache(repository, cache, codec, config)
    }

    /// Create a store around an existing cache.
    pub fn with_cache(
        repository: Arc<dyn SessionRepository>,
        cache: SessionCache,
        codec: Arc<dyn SessionCodec>,
        config: StoreConfig,
    ) -> Self {
        Self {
            repository,
            cache,
            codec,
            config,
        }
    }

    /// Get the store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Get the cache.
    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Persist a new session and cache it. Returns the session ID.
    ///
    /// A repository call that exceeds the timeout is reported as
    /// [`Error::RepositoryUnavailable`], but a backend that runs the write on
    /// another thread may still complete it. A retried `create` can then fail
    /// with `Duplicate`; [`update`](Self::update) is safe to retry either way.
    pub async fn create(&self, session: &Session) -> Result<String> {
        ensure_id(&session.id)?;

        let now = Utc::now();
        let record = self.build_record(session, now, now)?;
        self.call("save", &session.id, self.repository.save(&record))
            .await?;
        self.cache.put(&session.id, session.clone()).await;

        debug!(
            session_id = %session.id,
            online = %record.online,
            "Session created"
        );
        Ok(session.id.clone())
    }

    /// Read a session, from cache if possible, otherwise from the repository.
    ///
    /// A session that does not exist is `Ok(None)`. A session whose own idle
    /// timeout has elapsed is never served from or put into the cache; it is
    /// returned from the repository so the caller can invalidate it.
    pub async fn read(&self, session_id: &str) -> Result<Option<Session>> {
        ensure_id(session_id)?;

        if let Some(session) = self.cache.get(session_id).await {
            if !session.is_expired_at(Utc::now()) {
                return Ok(Some(session));
            }
            debug!(session_id = %session_id, "Cached session timed out, dropping");
            self.cache.evict(session_id).await;
        }

        let generation = self.cache.generation().await;
        let Some(record) = self
            .call("get", session_id, self.repository.get_by_session_id(session_id))
            .await?
        else {
            debug!(session_id = %session_id, "Session not found");
            return Ok(None);
        };

        let session = self.codec.decode(&record.session_blob)?;
        if session.is_expired_at(Utc::now()) {
            debug!(session_id = %session_id, "Loaded session has timed out, not caching");
        } else {
            self.cache
                .put_if_generation(session_id, generation, session.clone())
                .await;
            debug!(session_id = %session_id, "Session loaded from repository");
        }
        Ok(Some(session))
    }

    /// Write the current state of a session.
    ///
    /// If no record exists the update is treated as a create, so a session
    /// that outlived a restart or a lost write is simply re-persisted. A
    /// session whose idle timeout has elapsed is still written but dropped
    /// from the cache.
    pub async fn update(&self, session: &Session) -> Result<()> {
        ensure_id(&session.id)?;

        let existing = self
            .call("get", &session.id, self.repository.get_by_session_id(&session.id))
            .await?;

        match existing {
            Some(existing) => self.update_existing(session, &existing).await,
            None => {
                debug!(session_id = %session.id, "No record for update, creating instead");
                self.reconcile(session).await
            }
        }
    }

    /// Delete a session from cache and repository.
    ///
    /// Returns `true` if a durable record was removed and `false` if there
    /// was none. A repository failure is logged and returned; the cache entry
    /// is already gone at that point.
    pub async fn delete(&self, session: &Session) -> Result<bool> {
        self.delete_by_id(&session.id).await
    }

    /// Delete a session by ID. See [`delete`](Self::delete).
    pub async fn delete_by_id(&self, session_id: &str) -> Result<bool> {
        ensure_id(session_id)?;

        self.cache.evict(session_id).await;

        match self
            .call("delete", session_id, self.repository.delete_by_session_id(session_id))
            .await
        {
            Ok(true) => {
                debug!(session_id = %session_id, "Session deleted");
                Ok(true)
            }
            Ok(false) => {
                warn!(session_id = %session_id, "Delete found no session record");
                Ok(false)
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Session delete failed");
                Err(e)
            }
        }
    }

    /// Page over sessions whose last write marked them online.
    pub async fn online_sessions(&self, page: Page) -> Result<Vec<SessionRecord>> {
        self.sessions_with_flag(OnlineFlag::Online, page).await
    }

    /// Page over sessions with the given online flag.
    pub async fn sessions_with_flag(&self, online: OnlineFlag, page: Page) -> Result<Vec<SessionRecord>> {
        self.call("list", online.as_str(), self.repository.list_by_online(online, page))
            .await
    }

    /// Number of sessions whose last write marked them online.
    pub async fn online_count(&self) -> Result<u64> {
        self.count_with_flag(OnlineFlag::Online).await
    }

    /// Number of sessions with the given online flag.
    pub async fn count_with_flag(&self, online: OnlineFlag) -> Result<u64> {
        self.call("count", online.as_str(), self.repository.count_by_online(online))
            .await
    }

    /// Remove records not updated within `older_than` and drop the cache.
    ///
    /// Returns the number of durable records removed.
    pub async fn purge_idle(&self, older_than: Duration) -> Result<u64> {
        let age = chrono::Duration::from_std(older_than).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let removed = self
            .call("purge", "*", self.repository.delete_updated_before(cutoff))
            .await?;
        self.cache.clear().await;

        debug!(removed = removed, cutoff = %cutoff, "Purged idle sessions");
        Ok(removed)
    }

    /// Cache statistics.
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Spawn a task that periodically drops expired cache entries.
    ///
    /// The task runs until the returned handle is aborted.
    pub fn spawn_cleanup_task(&self) -> JoinHandle<()> {
        let cache = self.cache.clone();
        let period = cache.config().cleanup_interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.cleanup_expired().await;
            }
        })
    }

    /// Derive the online flag from the authenticated marker.
    pub fn online_flag(&self, session: &Session) -> OnlineFlag {
        let key = self.config.authenticated_key.as_str();
        let Some(value) = session.attribute(key) else {
            warn!(session_id = %session.id, key = %key, "Authenticated marker absent, treating session as offline");
            return OnlineFlag::Offline;
        };

        match value.as_marker_string() {
            Some(s) if s.eq_ignore_ascii_case("true") => OnlineFlag::Online,
            Some(s) if s.eq_ignore_ascii_case("false") => OnlineFlag::Offline,
            _ => {
                warn!(
                    session_id = %session.id,
                    key = %key,
                    value = %value,
                    "Authenticated marker has an unrecognized value, treating session as offline"
                );
                OnlineFlag::Offline
            }
        }
    }

    /// Derive the login name from the principal attribute.
    ///
    /// A string attribute is taken as the name. A map attribute (a principal
    /// object) contributes its own entry under the same key.
    pub fn login_name(&self, session: &Session) -> Option<String> {
        let key = self.config.principal_key.as_str();
        match session.attribute(key)? {
            AttributeValue::String(name) => Some(name.clone()),
            AttributeValue::Map(principal) => principal
                .get(key)
                .and_then(AttributeValue::as_str)
                .map(str::to_string),
            other => {
                warn!(session_id = %session.id, key = %key, value = %other, "Principal attribute is not a name");
                None
            }
        }
    }

    async fn update_existing(&self, session: &Session, existing: &SessionRecord) -> Result<()> {
        let now = Utc::now().max(existing.updated_at);
        let record = self.build_record(session, existing.created_at, now)?;

        match self
            .call("update", &session.id, self.repository.update(&record))
            .await
        {
            Ok(()) => {}
            // Deleted between our read and write; persist it again.
            Err(Error::Repository(RepositoryError::NotFound(_))) => {
                debug!(session_id = %session.id, "Record vanished during update, creating instead");
                return self.reconcile(session).await;
            }
            Err(e) => return Err(e),
        }
        self.refresh_cache(session).await;

        debug!(
            session_id = %session.id,
            online = %record.online,
            "Session updated"
        );
        Ok(())
    }

    /// Create on behalf of an update. Losing a create race to another writer
    /// falls back to updating the row that writer produced.
    async fn reconcile(&self, session: &Session) -> Result<()> {
        match self.create(session).await {
            Ok(_) => {
                self.refresh_cache(session).await;
                Ok(())
            }
            Err(Error::Repository(RepositoryError::Duplicate(_))) => {
                let existing = self
                    .call("get", &session.id, self.repository.get_by_session_id(&session.id))
                    .await?
                    .ok_or_else(|| {
                        Error::RepositoryUnavailable(format!(
                            "session {} reported as duplicate but not found",
                            session.id
                        ))
                    })?;
                let now = Utc::now().max(existing.updated_at);
                let record = self.build_record(session, existing.created_at, now)?;
                self.call("update", &session.id, self.repository.update(&record))
                    .await?;
                self.refresh_cache(session).await;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Cache the written state, or drop it if the session has timed out.
    async fn refresh_cache(&self, session: &Session) {
        if session.is_expired_at(Utc::now()) {
            debug!(session_id = %session.id, "Session timed out, removing from cache");
            self.cache.evict(&session.id).await;
        } else {
            self.cache.put(&session.id, session.clone()).await;
        }
    }

    fn build_record(
        &self,
        session: &Session,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<SessionRecord> {
        let session_blob = self.codec.encode(session)?;
        Ok(SessionRecord {
            session_id: session.id.clone(),
            login_name: self.login_name(session),
            session_blob,
            online: self.online_flag(session),
            host_ip: session.host.clone(),
            created_at,
            updated_at,
        })
    }

    /// Run a repository call under the configured timeout.
    async fn call<T>(
        &self,
        operation: &'static str,
        session_id: &str,
        fut: impl Future<Output = RepositoryResult<T>>,
    ) -> Result<T> {
        let limit = self.config.repository_timeout();
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::RepositoryUnavailable(format!(
                "{operation} for session {session_id} timed out after {limit:?}"
            ))),
        }
    }
}

fn ensure_id(session_id: &str) -> Result<()> {
    if is_blank(session_id) {
        return Err(Error::InvalidSessionId);
    }
    Ok(())
}
