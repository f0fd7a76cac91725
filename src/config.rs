//! Configuration for the multi-layer cache and saga orchestrator
//!
//! Configuration is an immutable snapshot handed to [`CacheCoordinator::new`]
//! and [`SagaOrchestrator::new`] at construction. Loading it from the
//! environment or a file is the embedding service's concern.
//!
//! [`CacheCoordinator::new`]: crate::cache::CacheCoordinator::new
//! [`SagaOrchestrator::new`]: crate::saga::SagaOrchestrator::new

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Eviction policy for the memory tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Evict the least-recently-accessed entry
    Lru,
    /// Evict the lowest access count; ties broken by oldest insertion
    Lfu,
    /// Evict the oldest insertion regardless of access
    Fifo,
}

impl std::fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvictionPolicy::Lru => write!(f, "LRU"),
            EvictionPolicy::Lfu => write!(f, "LFU"),
            EvictionPolicy::Fifo => write!(f, "FIFO"),
        }
    }
}

/// Wire format for cached values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    /// JSON text encoding
    Json,
    /// MessagePack binary encoding
    Binary,
}

impl Default for SerializationFormat {
    fn default() -> Self {
        SerializationFormat::Json
    }
}

/// Per-operation cache configuration; overrides tier defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Time-to-live for entries written by this operation. Must be > 0.
    pub ttl: Duration,
    /// Maximum value size in bytes; larger values are not cached
    pub max_size: Option<u64>,
    /// Compress values before storing
    pub compression: bool,
    /// Serialization format for the value codec
    pub serialization: SerializationFormat,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_size: None,
            compression: false,
            serialization: SerializationFormat::Json,
        }
    }
}

impl CacheConfig {
    /// Create a config with the given TTL in seconds
    pub fn with_ttl_secs(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_secs),
            ..Default::default()
        }
    }
}

/// L1 (in-process memory) tier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryTierConfig {
    /// Base per-operation defaults for this tier
    pub cache: CacheConfig,
    /// Memory bound in megabytes
    pub max_memory_mb: u64,
    /// Victim selection when the bound is reached
    pub eviction_policy: EvictionPolicy,
}

impl Default for MemoryTierConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::with_ttl_secs(60),
            max_memory_mb: 256,
            eviction_policy: EvictionPolicy::Lru,
        }
    }
}

impl MemoryTierConfig {
    /// Memory bound in bytes
    pub fn capacity_bytes(&self) -> u64 {
        self.max_memory_mb * 1024 * 1024
    }
}

/// L2 (distributed key-value store) tier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributedTierConfig {
    /// Base per-operation defaults for this tier
    pub cache: CacheConfig,
    /// Cluster-mode client (multi-node deployment)
    pub cluster: bool,
    /// Prefix for every physical key written by this tier
    pub key_prefix: String,
    /// Route keys to logical shards via a stable hash
    pub sharding: bool,
    /// Number of logical shards when sharding is enabled
    pub shard_count: u32,
}

impl Default for DistributedTierConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::with_ttl_secs(600),
            cluster: false,
            key_prefix: "tierflow".to_string(),
            sharding: false,
            shard_count: 16,
        }
    }
}

/// L3 (edge/CDN) tier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeTierConfig {
    /// Base per-operation defaults for this tier
    pub cache: CacheConfig,
    /// Provider identifier (opaque to the coordinator)
    pub provider: String,
    /// Regions to fan out writes to
    pub regions: Vec<String>,
}

impl Default for EdgeTierConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::with_ttl_secs(3600),
            provider: "in-memory".to_string(),
            regions: vec!["local".to_string()],
        }
    }
}

/// Aggregate configuration for the three cache tiers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultiLayerCacheConfig {
    /// L1 memory tier
    pub memory: MemoryTierConfig,
    /// L2 distributed tier
    pub distributed: DistributedTierConfig,
    /// L3 edge tier
    pub edge: EdgeTierConfig,
}

impl MultiLayerCacheConfig {
    /// Validate the snapshot.
    ///
    /// Zero TTLs are rejected. TTLs that shrink from L1 to L3 are legal but
    /// suspicious (faster tiers should expire sooner), so they only warn.
    pub fn validate(&self) -> Result<()> {
        let ttls = [
            ("L1", self.memory.cache.ttl),
            ("L2", self.distributed.cache.ttl),
            ("L3", self.edge.cache.ttl),
        ];

        for (tier, ttl) in &ttls {
            if ttl.is_zero() {
                return Err(Error::Config(format!("{tier} TTL must be greater than zero")));
            }
        }

        if self.memory.cache.ttl > self.distributed.cache.ttl
            || self.distributed.cache.ttl > self.edge.cache.ttl
        {
            warn!(
                l1_ttl_secs = self.memory.cache.ttl.as_secs(),
                l2_ttl_secs = self.distributed.cache.ttl.as_secs(),
                l3_ttl_secs = self.edge.cache.ttl.as_secs(),
                "tier TTLs are not non-decreasing from L1 to L3"
            );
        }

        if self.memory.max_memory_mb == 0 {
            return Err(Error::Config("L1 max_memory_mb must be greater than zero".into()));
        }

        if self.distributed.sharding && self.distributed.shard_count == 0 {
            return Err(Error::Config("L2 shard_count must be greater than zero".into()));
        }

        if self.edge.regions.is_empty() {
            return Err(Error::Config("L3 requires at least one region".into()));
        }

        Ok(())
    }
}

/// Defaults applied to sagas that do not override them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaDefaults {
    /// Per-step timeout covering the forward action and its retries
    pub step_timeout: Option<Duration>,
    /// Forward-action retry count per step
    pub retries: u32,
    /// Fixed delay between forward-action retries
    pub retry_delay: Duration,
}

impl Default for SagaDefaults {
    fn default() -> Self {
        Self {
            step_timeout: Some(Duration::from_secs(30)),
            retries: 0,
            retry_delay: Duration::ZERO,
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
    fn test_default_config_is_valid() {
        let config = MultiLayerCacheConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut config = MultiLayerCacheConfig::default();
        config.distributed.cache.ttl = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_decreasing_ttl_is_legal() {
        // Warns but does not fail; the coordinator must not assume ordering.
        let mut config = MultiLayerCacheConfig::default();
        config.memory.cache.ttl = Duration::from_secs(7200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_regions_rejected() {
        let mut config = MultiLayerCacheConfig::default();
        config.edge.regions.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_shards_rejected_when_sharding() {
        let mut config = MultiLayerCacheConfig::default();
        config.distributed.sharding = true;
        config.distributed.shard_count = 0;
        assert!(config.validate().is_err());

        // Without sharding the shard count is ignored
        config.distributed.sharding = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_capacity_bytes() {
        let config = MemoryTierConfig {
            max_memory_mb: 2,
            ..Default::default()
        };
        assert_eq!(config.capacity_bytes(), 2 * 1024 * 1024);
    }

    #[test]
    fn test_config_roundtrip_serde() {
        let config = MultiLayerCacheConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: MultiLayerCacheConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.memory.max_memory_mb, config.memory.max_memory_mb);
        assert_eq!(back.distributed.key_prefix, config.distributed.key_prefix);
    }
}
