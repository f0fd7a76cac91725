//! Cache Backend Contract
//!
//! A backend is a concrete store for one tier: in-process memory, a
//! distributed key-value store, or an edge/CDN provider. Backends know
//! nothing about other tiers; tier policy lives in the adapters.
//!
//! # Contract
//!
//! - `get` on an absent or expired key returns `Ok(None)`, never an error
//! - `set` with a zero TTL is rejected with [`Error::InvalidTtl`]
//! - `clear` with no pattern wipes the tier; with a pattern it deletes all
//!   keys whose serialized form matches a glob-style pattern
//! - implementations must be safe for concurrent callers

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::stats::BackendStats;
use crate::error::{Error, Result};

// =============================================================================
// Clock
// =============================================================================

/// Monotonic clock seam so TTL expiry is testable with simulated time.
///
/// Reports time elapsed since an arbitrary fixed origin.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time since the clock's origin
    fn now(&self) -> Duration;
}

/// Wall clock backed by [`Instant`]
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Manually advanced clock for tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    /// Create a clock at its origin
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock by `delta`
    pub fn advance(&self, delta: Duration) {
        *self.now.lock() += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}

// =============================================================================
// Glob Matching
// =============================================================================

/// Match a serialized key against a glob-style pattern.
///
/// `*` matches any run of characters (including separators), `?` matches
/// exactly one character; everything else matches literally.
pub fn key_matches(pattern: &str, key: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = key.chars().collect();

    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < txt.len() {
        if p < pat.len() && (pat[p] == '?' || pat[p] == txt[t]) {
            p += 1;
            t += 1;
        } else if p < pat.len() && pat[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            // Backtrack: let the last '*' absorb one more character
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }

    while p < pat.len() && pat[p] == '*' {
        p += 1;
    }
    p == pat.len()
}

// =============================================================================
// Backend Trait
// =============================================================================

/// Concrete store for one cache tier
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch a value; absent or expired keys yield `Ok(None)`
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store a value with the given TTL (must be > 0)
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()>;

    /// Remove a key, reporting whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Remove all keys, or only those matching a glob pattern.
    /// Returns the number of keys removed.
    async fn clear(&self, pattern: Option<&str>) -> Result<u64>;

    /// Raw backend counters
    fn stats(&self) -> BackendStats;
}

// =============================================================================
// In-Memory Store
// =============================================================================

struct StoredEntry {
    data: Bytes,
    expires_at: Duration,
}

/// Concurrent in-memory backend.
///
/// Serves as the L1 store and as the stand-in for remote L2/L3 backends in
/// tests and single-process deployments. Expired entries are dropped lazily
/// on read; there is no background reaper.
pub struct MemoryStore {
    entries: DashMap<String, StoredEntry>,
    clock: Arc<dyn Clock>,
    size_bytes: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a store on the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::default()))
    }

    /// Create a store on an explicit clock (tests use [`ManualClock`])
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            size_bytes: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    fn remove_entry(&self, key: &str) -> Option<Bytes> {
        self.entries.remove(key).map(|(_, entry)| {
            self.size_bytes
                .fetch_sub(entry.data.len() as u64, Ordering::Relaxed);
            entry.data
        })
    }
}

#[async_trait]
impl CacheBackend for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        let expired = match self.entries.get(key) {
            Some(entry) => {
                if self.clock.now() < entry.expires_at {
                    return Ok(Some(entry.data.clone()));
                }
                true
            }
            None => false,
        };

        if expired {
            self.remove_entry(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        if ttl.is_zero() {
            return Err(Error::InvalidTtl {
                key: key.to_string(),
            });
        }
        self.writes.fetch_add(1, Ordering::Relaxed);

        let entry = StoredEntry {
            expires_at: self.clock.now() + ttl,
            data: value,
        };

        let new_size = entry.data.len() as u64;
        if let Some(old) = self.entries.insert(key.to_string(), entry) {
            self.size_bytes
                .fetch_sub(old.data.len() as u64, Ordering::Relaxed);
        }
        self.size_bytes.fetch_add(new_size, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(self.remove_entry(key).is_some())
    }

    async fn clear(&self, pattern: Option<&str>) -> Result<u64> {
        let victims: Vec<String> = match pattern {
            Some(pat) => self
                .entries
                .iter()
                .filter(|entry| key_matches(pat, entry.key()))
                .map(|entry| entry.key().clone())
                .collect(),
            None => self.entries.iter().map(|entry| entry.key().clone()).collect(),
        };

        let mut removed = 0;
        for key in victims {
            if self.remove_entry(&key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn stats(&self) -> BackendStats {
        BackendStats {
            entry_count: self.entries.len() as u64,
            size_bytes: self.size_bytes.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_matches_literals() {
        assert!(key_matches("finance:position:42", "finance:position:42"));
        assert!(!key_matches("finance:position:42", "finance:position:43"));
    }

    #[test]
    fn test_key_matches_star() {
        assert!(key_matches("finance:position:*", "finance:position:42"));
        assert!(key_matches("finance:*", "finance:position:42:v1"));
        assert!(key_matches("*", "anything"));
        assert!(!key_matches("finance:position:*", "finance:order:42"));
    }

    #[test]
    fn test_key_matches_question_mark() {
        assert!(key_matches("finance:position:?", "finance:position:4"));
        assert!(!key_matches("finance:position:?", "finance:position:42"));
    }

    #[test]
    fn test_key_matches_star_backtracking() {
        assert!(key_matches("a*b*c", "axxbyyc"));
        assert!(key_matches("a*b*c", "abc"));
        assert!(!key_matches("a*b*c", "axxbyy"));
    }

    #[test]
    fn test_key_matches_empty() {
        assert!(key_matches("", ""));
        assert!(key_matches("*", ""));
        assert!(!key_matches("?", ""));
    }

    #[tokio::test]
    async fn test_store_set_get() {
        let store = MemoryStore::new();
        store
            .set("k", Bytes::from_static(b"v"), Duration::from_secs(10))
            .await
            .unwrap();

        let value = store.get("k").await.unwrap();
        assert_eq!(value, Some(Bytes::from_static(b"v")));
    }

    #[tokio::test]
    async fn test_store_absent_is_none_not_error() {
        let store = MemoryStore::new();
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_store_rejects_zero_ttl() {
        let store = MemoryStore::new();
        let err = store
            .set("k", Bytes::from_static(b"v"), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTtl { .. }));
    }

    #[tokio::test]
    async fn test_store_ttl_expiry_with_manual_clock() {
        let clock = Arc::new(ManualClock::new());
        let store = MemoryStore::with_clock(clock.clone());

        store
            .set("k", Bytes::from_static(b"v"), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(store.get("k").await.unwrap().is_some());

        clock.advance(Duration::from_secs(6));
        assert_eq!(store.get("k").await.unwrap(), None);

        // Lazy expiry removed the entry and released its bytes
        assert_eq!(store.stats().entry_count, 0);
        assert_eq!(store.stats().size_bytes, 0);
    }

    #[tokio::test]
    async fn test_store_delete_reports_existence() {
        let store = MemoryStore::new();
        store
            .set("k", Bytes::from_static(b"v"), Duration::from_secs(10))
            .await
            .unwrap();

        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_store_clear_all() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .set(
                    &format!("finance:position:{i}"),
                    Bytes::from_static(b"v"),
                    Duration::from_secs(10),
                )
                .await
                .unwrap();
        }

        assert_eq!(store.clear(None).await.unwrap(), 5);
        assert_eq!(store.stats().entry_count, 0);

        // clear is idempotent
        assert_eq!(store.clear(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_clear_pattern() {
        let store = MemoryStore::new();
        store
            .set(
                "finance:position:1",
                Bytes::from_static(b"a"),
                Duration::from_secs(10),
            )
            .await
            .unwrap();
        store
            .set(
                "finance:position:2",
                Bytes::from_static(b"b"),
                Duration::from_secs(10),
            )
            .await
            .unwrap();
        store
            .set(
                "finance:order:1",
                Bytes::from_static(b"c"),
                Duration::from_secs(10),
            )
            .await
            .unwrap();

        let removed = store.clear(Some("finance:position:*")).await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.get("finance:order:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_store_size_accounting_on_replace() {
        let store = MemoryStore::new();
        store
            .set("k", Bytes::from_static(b"aaaa"), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(store.stats().size_bytes, 4);

        store
            .set("k", Bytes::from_static(b"bb"), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(store.stats().size_bytes, 2);
        assert_eq!(store.stats().entry_count, 1);
    }

    #[tokio::test]
    async fn test_store_concurrent_access() {
        use tokio::task::JoinSet;

        let store = Arc::new(MemoryStore::new());
        let mut join_set = JoinSet::new();

        for t in 0..8 {
            let store = store.clone();
            join_set.spawn(async move {
                for i in 0..100 {
                    let key = format!("k-{t}-{i}");
                    store
                        .set(&key, Bytes::from_static(b"v"), Duration::from_secs(10))
                        .await
                        .unwrap();
                    assert!(store.get(&key).await.unwrap().is_some());
                }
            });
        }

        while let Some(res) = join_set.join_next().await {
            res.unwrap();
        }
        assert_eq!(store.stats().entry_count, 800);
    }
}
