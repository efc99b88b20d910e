//! Idle-time tracking for cache entries.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Tracks when each cached session was last touched.
#[derive(Debug)]
pub(crate) struct IdleTracker {
    last_touch: HashMap<String, Instant>,
    ttl: Option<Duration>,
}

impl IdleTracker {
    pub(crate) fn new(ttl: Option<Duration>) -> Self {
        Self {
            last_touch: HashMap::new(),
            ttl,
        }
    }

    /// Reset the idle timer for a session.
    pub(crate) fn touch(&mut self, session_id: &str) {
        self.last_touch.insert(session_id.to_string(), Instant::now());
    }

    /// Whether the session has been idle longer than the TTL.
    ///
    /// Without a TTL nothing expires. With one, an untracked ID counts as expired.
    pub(crate) fn is_expired(&self, session_id: &str) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        self.last_touch
            .get(session_id)
            .is_none_or(|touched| touched.elapsed() > ttl)
    }

    pub(crate) fn forget(&mut self, session_id: &str) {
        self.last_touch.remove(session_id);
    }

    /// Stop tracking all expired sessions and return their IDs.
    pub(crate) fn drain_expired(&mut self) -> Vec<String> {
        let Some(ttl) = self.ttl else {
            return Vec::new();
        };
        let now = Instant::now();
        let expired: Vec<String> = self
            .last_touch
            .iter()
            .filter(|(_, touched)| now.duration_since(**touched) > ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.last_touch.remove(id);
        }
        expired
    }

    pub(crate) fn len(&self) -> usize {
        self.last_touch.len()
    }

    pub(crate) fn clear(&mut self) {
        self.last_touch.clear();
    }
}
