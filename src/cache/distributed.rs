//! L2 Distributed Tier
//!
//! Wraps a remote key-value backend with cluster key-prefixing and optional
//! shard routing. Every physical key is prefixed with the configured
//! `key_prefix`; with sharding enabled, a stable hash of the composite key
//! maps it to one of N logical shards so repeated lookups for the same key
//! always land on the same shard.
//!
//! Physical key forms:
//!
//! ```text
//! <prefix>:<namespace>:<entity>:<id>[:<version>]          (sharding off)
//! <prefix>:s<shard>:<namespace>:<entity>:<id>[:<version>] (sharding on)
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use super::backend::CacheBackend;
use super::key::CacheKey;
use super::stats::{CacheLayer, CacheStats, TierMetrics};
use super::tier::CacheTier;
use crate::config::DistributedTierConfig;
use crate::error::Result;

/// L2 tier: distributed store with prefixing and shard routing
pub struct DistributedTier {
    backend: Arc<dyn CacheBackend>,
    config: DistributedTierConfig,
    metrics: TierMetrics,
}

impl DistributedTier {
    /// Create a distributed tier over the given backend
    pub fn new(config: DistributedTierConfig, backend: Arc<dyn CacheBackend>) -> Self {
        debug!(
            prefix = %config.key_prefix,
            cluster = config.cluster,
            sharding = config.sharding,
            shards = config.shard_count,
            "distributed tier configured"
        );
        Self {
            backend,
            config,
            metrics: TierMetrics::new(),
        }
    }

    /// Physical key for a logical cache key
    pub fn physical_key(&self, key: &CacheKey) -> String {
        if self.config.sharding {
            let shard = key.shard_index(self.config.shard_count);
            format!("{}:s{}:{}", self.config.key_prefix, shard, key.storage_key())
        } else {
            format!("{}:{}", self.config.key_prefix, key.storage_key())
        }
    }

    /// Translate a logical glob pattern into the physical key space
    fn physical_pattern(&self, pattern: &str) -> String {
        if self.config.sharding {
            format!("{}:s*:{}", self.config.key_prefix, pattern)
        } else {
            format!("{}:{}", self.config.key_prefix, pattern)
        }
    }
}

#[async_trait]
impl CacheTier for DistributedTier {
    fn layer(&self) -> CacheLayer {
        CacheLayer::L2
    }

    fn default_ttl(&self) -> Duration {
        self.config.cache.ttl
    }

    async fn read(&self, key: &CacheKey) -> Result<Option<Bytes>> {
        match self.backend.get(&self.physical_key(key)).await {
            Ok(Some(value)) => {
                self.metrics.record_hit();
                Ok(Some(value))
            }
            Ok(None) => {
                self.metrics.record_miss();
                Ok(None)
            }
            Err(e) => {
                self.metrics.record_error();
                Err(e)
            }
        }
    }

    async fn write(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> Result<()> {
        self.backend.set(&self.physical_key(key), value, ttl).await
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        self.backend.delete(&self.physical_key(key)).await
    }

    async fn invalidate_pattern(&self, pattern: &str) -> Result<u64> {
        self.backend
            .clear(Some(&self.physical_pattern(pattern)))
            .await
    }

    async fn clear(&self) -> Result<u64> {
        // Only this tier's prefix, never the whole shared store
        self.backend
            .clear(Some(&format!("{}:*", self.config.key_prefix)))
            .await
    }

    fn stats(&self) -> CacheStats {
        let memory_usage = self.backend.stats().size_bytes;
        self.metrics.snapshot(CacheLayer::L2, memory_usage)
    }
}

// =============================================================================
// Tests
// =============================================================================
