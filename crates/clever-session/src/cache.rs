//! In-process session cache with LRU eviction and TTL support.
//!
//! The cache is a latency shortcut only. It may be stale or cold at any
//! time and is never asked whether a session exists durably.
//!
//! Loads from the repository race with writes and deletes. Every `put`,
//! `evict` and `clear` is stamped with a sequence number, and a load only
//! fills the cache through [`SessionCache::put_if_generation`] when no
//! mutation of that ID happened after the load began.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use lru::LruCache;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::session::Session;
use crate::ttl::IdleTracker;

/// Entry stored in the cache.
#[derive(Debug, Clone)]
struct CacheEntry {
    session: Session,
    cached_at: Instant,
}

struct CacheInner {
    lru: LruCache<String, CacheEntry>,
    idle: IdleTracker,
    hits: u64,
    misses: u64,
    /// Sequence number of the latest mutation.
    seq: u64,
    /// Latest mutation stamp per ID, bounded like the cache itself.
    mutations: LruCache<String, u64>,
    /// Highest stamp that has dropped out of `mutations` (or been cleared).
    mutation_floor: u64,
}

impl CacheInner {
    fn record_mutation(&mut self, session_id: &str) {
        self.seq += 1;
        if let Some((dropped_id, dropped_seq)) =
            self.mutations.push(session_id.to_string(), self.seq)
            && dropped_id != session_id
        {
            self.mutation_floor = self.mutation_floor.max(dropped_seq);
        }
    }

    /// Whether `session_id` may have been mutated after `generation`.
    fn mutated_since(&self, session_id: &str, generation: u64) -> bool {
        let last = self
            .mutations
            .peek(session_id)
            .copied()
            .unwrap_or(self.mutation_floor);
        last > generation
    }
}

/// Session cache keyed by session ID.
///
/// Cloning is cheap; clones share the same underlying cache.
#[derive(Clone)]
pub struct SessionCache {
    inner: Arc<RwLock<CacheInner>>,
    config: CacheConfig,
}

impl SessionCache {
    /// Create an empty cache.
    pub fn new(config: CacheConfig) -> Self {
        let cap = NonZeroUsize::new(config.max_sessions).unwrap_or(NonZeroUsize::MIN);

        let inner = CacheInner {
            lru: LruCache::new(cap),
            idle: IdleTracker::new(config.ttl),
            hits: 0,
            misses: 0,
            seq: 0,
            mutations: LruCache::new(cap),
            mutation_floor: 0,
        };

        Self {
            inner: Arc::new(RwLock::new(inner)),
            config,
        }
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get the current number of cached sessions (including expired, not yet cleaned).
    pub async fn len(&self) -> usize {
        self.inner.read().await.lru.len()
    }

    /// Check if the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.lru.is_empty()
    }

    /// Look up a session.
    ///
    /// Marks the entry as recently used and resets its TTL. Expired entries
    /// are dropped and reported as absent.
    pub async fn get(&self, session_id: &str) -> Option<Session> {
        let mut inner = self.inner.write().await;

        if inner.idle.is_expired(session_id) {
            if inner.lru.pop(session_id).is_some() {
                debug!(session_id = %session_id, "Cached session expired, dropping");
            }
            inner.idle.forget(session_id);
            inner.misses += 1;
            return None;
        }

        match inner.lru.get(session_id).map(|entry| entry.session.clone()) {
            Some(session) => {
                inner.idle.touch(session_id);
                inner.hits += 1;
                trace!(session_id = %session_id, "Session cache hit");
                Some(session)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Insert or replace a session.
    ///
    /// If the cache is at capacity the least recently used entry is evicted.
    pub async fn put(&self, session_id: &str, session: Session) {
        let mut inner = self.inner.write().await;
        Self::insert(&mut inner, session_id, session);
    }

    /// Current mutation sequence number.
    ///
    /// Take this before loading a session from the repository and hand it to
    /// [`put_if_generation`](Self::put_if_generation) afterwards.
    pub async fn generation(&self) -> u64 {
        self.inner.read().await.seq
    }

    /// Cache a loaded session unless the ID was put, evicted or cleared
    /// after `generation` was taken. Returns whether the entry was stored.
    pub async fn put_if_generation(&self, session_id: &str, generation: u64, session: Session) -> bool {
        let mut inner = self.inner.write().await;
        if inner.mutated_since(session_id, generation) {
            debug!(session_id = %session_id, "Session changed during load, not caching");
            return false;
        }
        Self::insert(&mut inner, session_id, session);
        true
    }

    fn insert(inner: &mut CacheInner, session_id: &str, session: Session) {
        let entry = CacheEntry {
            session,
            cached_at: Instant::now(),
        };
        if let Some((evicted_id, _)) = inner.lru.push(session_id.to_string(), entry)
            && evicted_id != session_id
        {
            debug!(session_id = %evicted_id, "Evicted LRU session to make room");
            inner.idle.forget(&evicted_id);
        }
        inner.idle.touch(session_id);
        inner.record_mutation(session_id);

        trace!(
            session_id = %session_id,
            cache_size = inner.lru.len(),
            "Session cached"
        );
    }

    /// Remove a session from the cache, returning it if present.
    pub async fn evict(&self, session_id: &str) -> Option<Session> {
        let mut inner = self.inner.write().await;
        inner.idle.forget(session_id);
        inner.record_mutation(session_id);
        let entry = inner.lru.pop(session_id);
        if entry.is_some() {
            trace!(session_id = %session_id, "Session evicted from cache");
        }
        entry.map(|e| e.session)
    }

    /// Check if a live (non-expired) entry exists, without touching it.
    pub async fn contains(&self, session_id: &str) -> bool {
        let inner = self.inner.read().await;
        inner.lru.contains(session_id) && !inner.idle.is_expired(session_id)
    }

    /// Peek at a session without updating LRU order or TTL.
    pub async fn peek(&self, session_id: &str) -> Option<Session> {
        let inner = self.inner.read().await;
        if inner.idle.is_expired(session_id) {
            None
        } else {
            inner.lru.peek(session_id).map(|e| e.session.clone())
        }
    }

    /// Drop every expired entry. Returns the number removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.write().await;
        let expired = inner.idle.drain_expired();

        let mut removed = 0;
        for session_id in expired {
            if inner.lru.pop(&session_id).is_some() {
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(count = removed, "Cleaned up expired cached sessions");
        }

        removed
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.lru.clear();
        inner.idle.clear();
        inner.mutations.clear();
        inner.seq += 1;
        inner.mutation_floor = inner.seq;
    }

    /// IDs of live entries, most recently used first.
    pub async fn list_cached(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        inner
            .lru
            .iter()
            .filter(|(id, _)| !inner.idle.is_expired(id))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.read().await;
        CacheStats {
            size: inner.lru.len(),
            capacity: self.config.max_sessions,
            ttl_tracked: inner.idle.len(),
            hits: inner.hits,
            misses: inner.misses,
            oldest_entry_age: inner.lru.peek_lru().map(|(_, e)| e.cached_at.elapsed()),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Current number of cached sessions.
    pub size: usize,

    /// Maximum capacity.
    pub capacity: usize,

    /// Number of sessions being tracked for TTL.
    pub ttl_tracked: usize,

    /// Lookups answered from the cache.
    pub hits: u64,

    /// Lookups that fell through.
    pub misses: u64,

    /// Time since the least recently used entry was cached.
    pub oldest_entry_age: Option<std::time::Duration>,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::sleep;

    use super::*;

    fn session(id: &str) -> Session {
        Session::new(id).with_attribute("user", "alice")
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let cache = SessionCache::new(CacheConfig::new().with_max_sessions(10));

        cache.put("session-1", session("session-1")).await;

        let found = cache.get("session-1").await.unwrap();
        assert_eq!(found.id, "session-1");
        assert_eq!(found.attribute("user").and_then(|v| v.as_str()), Some("alice"));
    }

    #[tokio::test]
    async fn test_miss_returns_none() {
        let cache = SessionCache::new(CacheConfig::new());
        assert!(cache.get("nonexistent").await.is_none());

        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = SessionCache::new(CacheConfig::new().with_max_sessions(3));

        for i in 1..=3 {
            let id = format!("session-{i}");
            cache.put(&id, session(&id)).await;
        }
        assert_eq!(cache.len().await, 3);

        cache.put("session-4", session("session-4")).await;

        assert_eq!(cache.len().await, 3);
        assert!(!cache.contains("session-1").await);
        assert!(cache.contains("session-2").await);
        assert!(cache.contains("session-4").await);
    }

    #[tokio::test]
    async fn test_get_updates_lru_order() {
        let cache = SessionCache::new(CacheConfig::new().with_max_sessions(3));

        for i in 1..=3 {
            let id = format!("session-{i}");
            cache.put(&id, session(&id)).await;
        }

        let _ = cache.get("session-1").await;
        cache.put("session-4", session("session-4")).await;

        assert!(cache.contains("session-1").await);
        assert!(!cache.contains("session-2").await);
        assert!(cache.contains("session-3").await);
    }

    #[tokio::test]
    async fn test_replacing_entry_keeps_size() {
        let cache = SessionCache::new(CacheConfig::new().with_max_sessions(2));

        cache.put("session-1", session("session-1")).await;
        cache
            .put("session-1", Session::new("session-1").with_attribute("user", "bob"))
            .await;

        assert_eq!(cache.len().await, 1);
        let found = cache.peek("session-1").await.unwrap();
        assert_eq!(found.attribute("user").and_then(|v| v.as_str()), Some("bob"));
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let config = CacheConfig::new()
            .with_max_sessions(10)
            .with_ttl(Duration::from_millis(50));
        let cache = SessionCache::new(config);

        cache.put("session-1", session("session-1")).await;
        assert!(cache.contains("session-1").await);

        sleep(Duration::from_millis(100)).await;

        assert!(!cache.contains("session-1").await);
        assert!(cache.get("session-1").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_evict() {
        let cache = SessionCache::new(CacheConfig::new());

        cache.put("session-1", session("session-1")).await;
        let evicted = cache.evict("session-1").await;

        assert_eq!(evicted.map(|s| s.id), Some("session-1".to_string()));
        assert!(!cache.contains("session-1").await);
        assert!(cache.evict("session-1").await.is_none());
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let config = CacheConfig::new()
            .with_max_sessions(10)
            .with_ttl(Duration::from_millis(50));
        let cache = SessionCache::new(config);

        for i in 1..=3 {
            let id = format!("session-{i}");
            cache.put(&id, session(&id)).await;
        }

        sleep(Duration::from_millis(100)).await;

        assert_eq!(cache.cleanup_expired().await, 3);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_stats_and_listing() {
        let cache = SessionCache::new(CacheConfig::new().with_max_sessions(100));

        for i in 1..=5 {
            let id = format!("session-{i}");
            cache.put(&id, session(&id)).await;
        }
        let _ = cache.get("session-2").await;

        let stats = cache.stats().await;
        assert_eq!(stats.size, 5);
        assert_eq!(stats.capacity, 100);
        assert_eq!(stats.hits, 1);
        assert!(stats.oldest_entry_age.is_some());

        let ids = cache.list_cached().await;
        assert_eq!(ids.len(), 5);
        assert_eq!(ids[0], "session-2");

        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_load_after_evict_is_not_cached() {
        let cache = SessionCache::new(CacheConfig::new());
        let generation = cache.generation().await;

        cache.evict("session-1").await;

        assert!(!cache.put_if_generation("session-1", generation, session("session-1")).await);
        assert!(!cache.contains("session-1").await);
    }

    #[tokio::test]
    async fn test_load_does_not_overwrite_newer_put() {
        let cache = SessionCache::new(CacheConfig::new());
        let generation = cache.generation().await;

        cache
            .put("session-1", Session::new("session-1").with_attribute("user", "bob"))
            .await;
        assert!(!cache.put_if_generation("session-1", generation, session("session-1")).await);

        let found = cache.peek("session-1").await.unwrap();
        assert_eq!(found.attribute("user").and_then(|v| v.as_str()), Some("bob"));
    }

    #[tokio::test]
    async fn test_load_unaffected_by_other_ids() {
        let cache = SessionCache::new(CacheConfig::new());
        let generation = cache.generation().await;

        cache.put("session-2", session("session-2")).await;
        cache.evict("session-3").await;

        assert!(cache.put_if_generation("session-1", generation, session("session-1")).await);
        assert!(cache.contains("session-1").await);
    }

    #[tokio::test]
    async fn test_clear_invalidates_pending_loads() {
        let cache = SessionCache::new(CacheConfig::new());
        let generation = cache.generation().await;

        cache.clear().await;

        assert!(!cache.put_if_generation("session-1", generation, session("session-1")).await);
        let fresh = cache.generation().await;
        assert!(cache.put_if_generation("session-1", fresh, session("session-1")).await);
    }

    #[tokio::test]
    async fn test_forgotten_stamps_reject_conservatively() {
        let cache = SessionCache::new(CacheConfig::new().with_max_sessions(1));
        let generation = cache.generation().await;

        cache.evict("session-1").await;
        // Pushes the stamp for session-1 out of the bounded log.
        cache.put("session-2", session("session-2")).await;

        assert!(!cache.put_if_generation("session-1", generation, session("session-1")).await);
    }
}
