//! Idempotent create-request deduplication.
//!
//! Keyed by a client-supplied opaque token. `begin` is an atomic
//! get-or-insert under one lock: the first caller for a key wins the right
//! to execute and must finish with `commit` (success) or `abandon`
//! (failure). Duplicates seen while the first attempt is in flight are
//! rejected; duplicates after a commit replay the recorded response
//! without re-executing anything. Only successes are ever cached, so a
//! retry after a transient failure gets a fresh run.
//!
//! Entries are retained for a bounded window (default 1 hour). Expiry is
//! advisory cleanup: a duplicate key arriving after the window
//! legitimately executes again.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default retention window for committed responses
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

/// A recorded successful response, replayed verbatim
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    /// HTTP status of the original response
    pub status: u16,
    /// Response body as sent the first time
    pub body: Value,
}

/// Outcome of registering a key
#[derive(Debug, Clone, PartialEq)]
pub enum Begin {
    /// No record for this key; the caller executes and must commit or abandon
    Fresh,
    /// Another request with this key is still executing
    InFlight,
    /// A committed response exists; return it without executing
    Replay(CachedResponse),
}

enum EntryState {
    InFlight,
    Committed(CachedResponse),
}

struct Entry {
    state: EntryState,
    inserted_at: Instant,
}

/// Shared dedup map, safe for concurrent request handlers
pub struct IdempotencyCache {
    entries: Mutex<HashMap<String, Entry>>,
    retention: Duration,
}

impl IdempotencyCache {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            retention,
        }
    }

    /// Register `key`, atomically claiming it if unseen.
    ///
    /// Expired entries are dropped on the way in, so a key retried after
    /// the retention window starts fresh.
    pub fn begin(&self, key: &str) -> Begin {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();

        if let Some(entry) = entries.get(key) {
            if now.duration_since(entry.inserted_at) < self.retention {
                return match &entry.state {
                    EntryState::InFlight => Begin::InFlight,
                    EntryState::Committed(response) => Begin::Replay(response.clone()),
                };
            }
            entries.remove(key);
        }

        entries.insert(
            key.to_string(),
            Entry {
                state: EntryState::InFlight,
                inserted_at: now,
            },
        );
        Begin::Fresh
    }

    /// Record the successful response for `key`
    pub fn commit(&self, key: &str, response: CachedResponse) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.to_string(),
            Entry {
                state: EntryState::Committed(response),
                inserted_at: Instant::now(),
            },
        );
    }

    /// Release `key` after a failed attempt so a retry can run
    pub fn abandon(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get(key) {
            if matches!(entry.state, EntryState::InFlight) {
                entries.remove(key);
            }
        }
    }

    /// Drop expired entries (call periodically)
    pub fn purge_expired(&self) {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.inserted_at) < self.retention);
        debug!(
            "Idempotency cache purge: {} -> {} entries",
            before,
            entries.len()
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for IdempotencyCache {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(body: Value) -> CachedResponse {
        CachedResponse { status: 201, body }
    }

    #[test]
    fn test_fresh_then_replay() {
        let cache = IdempotencyCache::default();

        assert_eq!(cache.begin("k1"), Begin::Fresh);
        cache.commit("k1", response(json!({"ticket": {"id": "t-1"}})));

        match cache.begin("k1") {
            Begin::Replay(cached) => {
                assert_eq!(cached.status, 201);
                assert_eq!(cached.body, json!({"ticket": {"id": "t-1"}}));
            }
            other => panic!("expected replay, got {other:?}"),
        }
    }

    #[test]
    fn test_in_flight_duplicate_is_rejected() {
        let cache = IdempotencyCache::default();
        assert_eq!(cache.begin("k1"), Begin::Fresh);
        assert_eq!(cache.begin("k1"), Begin::InFlight);
    }

    #[test]
    fn test_abandon_allows_retry() {
        let cache = IdempotencyCache::default();
        assert_eq!(cache.begin("k1"), Begin::Fresh);
        cache.abandon("k1");
        assert_eq!(cache.begin("k1"), Begin::Fresh);
    }

    #[test]
    fn test_abandon_does_not_evict_committed() {
        let cache = IdempotencyCache::default();
        assert_eq!(cache.begin("k1"), Begin::Fresh);
        cache.commit("k1", response(json!({"ok": true})));
        cache.abandon("k1");
        assert!(matches!(cache.begin("k1"), Begin::Replay(_)));
    }

    #[test]
    fn test_expired_key_runs_fresh() {
        let cache = IdempotencyCache::new(Duration::from_millis(10));
        assert_eq!(cache.begin("k1"), Begin::Fresh);
        cache.commit("k1", response(json!({"ok": true})));

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.begin("k1"), Begin::Fresh);
    }

    #[test]
    fn test_purge_expired() {
        let cache = IdempotencyCache::new(Duration::from_millis(10));
        assert_eq!(cache.begin("k1"), Begin::Fresh);
        cache.commit("k1", response(json!({})));
        assert_eq!(cache.len(), 1);

        std::thread::sleep(Duration::from_millis(20));
        cache.purge_expired();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_keys_are_independent() {
        let cache = IdempotencyCache::default();
        assert_eq!(cache.begin("k1"), Begin::Fresh);
        assert_eq!(cache.begin("k2"), Begin::Fresh);
        cache.commit("k2", response(json!({"n": 2})));
        assert_eq!(cache.begin("k1"), Begin::InFlight);
        assert!(matches!(cache.begin("k2"), Begin::Replay(_)));
    }
}
