//! L3 Edge Tier
//!
//! Fronts an edge/CDN provider. Writes fan out to every configured region;
//! reads take the first region that answers (edge content is eventually
//! consistent, so any single region is acceptable). Invalidation is
//! best-effort and asynchronous: the work is spawned and the caller never
//! blocks on its completion.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;

use super::backend::{CacheBackend, MemoryStore};
use super::key::CacheKey;
use super::stats::{CacheLayer, CacheStats, TierMetrics};
use super::tier::CacheTier;
use crate::config::EdgeTierConfig;
use crate::error::Result;

/// One region's handle within the edge tier
#[derive(Clone)]
pub struct Region {
    /// Region name (e.g. `eu-west-1`)
    pub name: String,
    /// Store reachable in that region
    pub store: Arc<dyn CacheBackend>,
}

/// L3 tier: region-fanned edge cache
pub struct EdgeTier {
    config: EdgeTierConfig,
    regions: Vec<Region>,
    metrics: Arc<TierMetrics>,
}

impl EdgeTier {
    /// Create an edge tier over explicit per-region stores.
    ///
    /// The store list must align with `config.regions`; tests substitute
    /// fakes per region this way.
    pub fn new(config: EdgeTierConfig, regions: Vec<Region>) -> Self {
        Self {
            config,
            regions,
            metrics: Arc::new(TierMetrics::new()),
        }
    }

    /// Create an edge tier with an in-memory store per configured region
    pub fn in_memory(config: EdgeTierConfig) -> Self {
        let regions = config
            .regions
            .iter()
            .map(|name| Region {
                name: name.clone(),
                store: Arc::new(MemoryStore::new()) as Arc<dyn CacheBackend>,
            })
            .collect();
        Self::new(config, regions)
    }

    /// Provider identifier
    pub fn provider(&self) -> &str {
        &self.config.provider
    }
}

#[async_trait]
impl CacheTier for EdgeTier {
    fn layer(&self) -> CacheLayer {
        CacheLayer::L3
    }

    fn default_ttl(&self) -> Duration {
        self.config.cache.ttl
    }

    fn invalidation_is_synchronous(&self) -> bool {
        false
    }

    async fn read(&self, key: &CacheKey) -> Result<Option<Bytes>> {
        let storage_key = key.storage_key();

        // Any single region suffices; skip regions that error
        for region in &self.regions {
            match region.store.get(&storage_key).await {
                Ok(Some(value)) => {
                    self.metrics.record_hit();
                    return Ok(Some(value));
                }
                Ok(None) => continue,
                Err(e) => {
                    self.metrics.record_error();
                    warn!(region = %region.name, key = %key, error = %e,
                        "edge region read failed");
                }
            }
        }

        self.metrics.record_miss();
        Ok(None)
    }

    async fn write(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> Result<()> {
        let storage_key = key.storage_key();

        for region in &self.regions {
            if let Err(e) = region.store.set(&storage_key, value.clone(), ttl).await {
                self.metrics.record_error();
                warn!(region = %region.name, key = %key, error = %e,
                    "edge region write failed");
            }
        }
        Ok(())
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        let storage_key = key.storage_key();

        for region in self.regions.clone() {
            let storage_key = storage_key.clone();
            let metrics = self.metrics.clone();
            tokio::spawn(async move {
                if let Err(e) = region.store.delete(&storage_key).await {
                    metrics.record_error();
                    warn!(region = %region.name, key = %storage_key, error = %e,
                        "edge invalidation failed");
                }
            });
        }

        // Asynchronous removal: existence is unknown at return time
        Ok(false)
    }

    async fn invalidate_pattern(&self, pattern: &str) -> Result<u64> {
        let pattern = pattern.to_string();

        for region in self.regions.clone() {
            let pattern = pattern.clone();
            let metrics = self.metrics.clone();
            tokio::spawn(async move {
                if let Err(e) = region.store.clear(Some(&pattern)).await {
                    metrics.record_error();
                    warn!(region = %region.name, pattern = %pattern, error = %e,
                        "edge pattern invalidation failed");
                }
            });
        }
        Ok(0)
    }

    async fn clear(&self) -> Result<u64> {
        for region in self.regions.clone() {
            let metrics = self.metrics.clone();
            tokio::spawn(async move {
                if let Err(e) = region.store.clear(None).await {
                    metrics.record_error();
                    warn!(region = %region.name, error = %e, "edge clear failed");
                }
            });
        }
        Ok(0)
    }

    fn stats(&self) -> CacheStats {
        let memory_usage = self
            .regions
            .iter()
            .map(|r| r.store.stats().size_bytes)
            .sum();
        self.metrics.snapshot(CacheLayer::L3, memory_usage)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;

    fn two_region_config() -> EdgeTierConfig {
        EdgeTierConfig {
            cache: CacheConfig::with_ttl_secs(3600),
            provider: "test-cdn".into(),
            regions: vec!["eu-west-1".into(), "us-east-1".into()],
        }
    }

    fn key(id: &str) -> CacheKey {
        CacheKey::new("finance", "position", id)
    }

    async fn wait_until<F>(mut check: F)
    where
        F: FnMut() -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send>>,
    {
        for _ in 0..50 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met within bounded poll");
    }

    #[tokio::test]
    async fn test_write_fans_out_to_all_regions() {
        let tier = EdgeTier::in_memory(two_region_config());
        tier.write(&key("1"), Bytes::from_static(b"v"), Duration::from_secs(60))
            .await
            .unwrap();

        for region in &tier.regions {
            assert!(region
                .store
                .get("finance:position:1")
                .await
                .unwrap()
                .is_some());
        }
    }

    #[tokio::test]
    async fn test_read_from_any_region() {
        let tier = EdgeTier::in_memory(two_region_config());

        // Value present only in the second region (eventual consistency)
        tier.regions[1]
            .store
            .set("finance:position:1", Bytes::from_static(b"v"), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            tier.read(&key("1")).await.unwrap(),
            Some(Bytes::from_static(b"v"))
        );
    }

    #[tokio::test]
    async fn test_invalidation_is_eventual() {
        let tier = EdgeTier::in_memory(two_region_config());
        tier.write(&key("1"), Bytes::from_static(b"v"), Duration::from_secs(60))
            .await
            .unwrap();

        // Returns immediately without confirming removal
        assert!(!tier.invalidate(&key("1")).await.unwrap());

        let stores: Vec<Arc<dyn CacheBackend>> =
            tier.regions.iter().map(|r| r.store.clone()).collect();
        wait_until(move || {
            let stores = stores.clone();
            Box::pin(async move {
                for store in &stores {
                    if store.get("finance:position:1").await.unwrap().is_some() {
                        return false;
                    }
                }
                true
            })
        })
        .await;
    }

    #[tokio::test]
    async fn test_pattern_invalidation_is_eventual() {
        let tier = EdgeTier::in_memory(two_region_config());
        let ttl = Duration::from_secs(60);

        tier.write(&key("1"), Bytes::from_static(b"a"), ttl).await.unwrap();
        tier.write(&key("2"), Bytes::from_static(b"b"), ttl).await.unwrap();

        assert_eq!(tier.invalidate_pattern("finance:position:*").await.unwrap(), 0);

        let stores: Vec<Arc<dyn CacheBackend>> =
            tier.regions.iter().map(|r| r.store.clone()).collect();
        wait_until(move || {
            let stores = stores.clone();
            Box::pin(async move {
                for store in &stores {
                    if store.stats().entry_count > 0 {
                        return false;
                    }
                }
                true
            })
        })
        .await;
    }

    #[tokio::test]
    async fn test_read_skips_failing_region() {
        struct FailingStore;

        #[async_trait]
        impl CacheBackend for FailingStore {
            async fn get(&self, _key: &str) -> Result<Option<Bytes>> {
                Err(crate::error::Error::BackendUnavailable {
                    tier: "L3".into(),
                    reason: "region down".into(),
                })
            }
            async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<()> {
                Ok(())
            }
            async fn delete(&self, _key: &str) -> Result<bool> {
                Ok(false)
            }
            async fn clear(&self, _pattern: Option<&str>) -> Result<u64> {
                Ok(0)
            }
            fn stats(&self) -> crate::cache::stats::BackendStats {
                Default::default()
            }
        }

        let healthy = Arc::new(MemoryStore::new());
        healthy
            .set("finance:position:1", Bytes::from_static(b"v"), Duration::from_secs(60))
            .await
            .unwrap();

        let tier = EdgeTier::new(
            two_region_config(),
            vec![
                Region {
                    name: "eu-west-1".into(),
                    store: Arc::new(FailingStore),
                },
                Region {
                    name: "us-east-1".into(),
                    store: healthy,
                },
            ],
        );

        assert_eq!(
            tier.read(&key("1")).await.unwrap(),
            Some(Bytes::from_static(b"v"))
        );
    }
}
