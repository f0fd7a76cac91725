//! Cache Tier Contract
//!
//! A tier wraps one [`CacheBackend`](super::backend::CacheBackend) with
//! tier-specific policy: eviction for the memory tier, key prefixing and
//! sharding for the distributed tier, region fan-out for the edge tier.
//! The coordinator composes tiers as an ordered list, so tests can
//! substitute a fake for any level.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::key::CacheKey;
use super::stats::{CacheLayer, CacheStats};
use crate::error::Result;

/// One layer of the multi-layer cache
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// Which level this tier occupies
    fn layer(&self) -> CacheLayer;

    /// TTL applied when an operation does not override it
    fn default_ttl(&self) -> Duration;

    /// Whether invalidation completes before returning.
    ///
    /// The edge tier invalidates asynchronously; the coordinator must not
    /// block on it and excludes it from removed-key counts.
    fn invalidation_is_synchronous(&self) -> bool {
        true
    }

    /// Read a value
    async fn read(&self, key: &CacheKey) -> Result<Option<Bytes>>;

    /// Write a value with the given TTL
    async fn write(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> Result<()>;

    /// Remove one key, reporting whether it existed
    async fn invalidate(&self, key: &CacheKey) -> Result<bool>;

    /// Remove all keys matching a glob pattern over the serialized key form.
    /// Returns the number of keys removed (0 for asynchronous tiers).
    async fn invalidate_pattern(&self, pattern: &str) -> Result<u64>;

    /// Remove every key in this tier. Returns the number removed.
    async fn clear(&self) -> Result<u64>;

    /// Point-in-time statistics snapshot
    fn stats(&self) -> CacheStats;

    /// Release backend resources. Default is a no-op.
    async fn shutdown(&self) {}
}
