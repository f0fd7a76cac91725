//! Cache Coordinator - Unified Multi-Layer Cache
//!
//! Composes the tier adapters into one logical cache with
//! read-through / write-through / invalidate-through semantics:
//!
//! - reads walk L1 → L2 → L3 and backfill faster tiers off the critical path
//! - a full miss computes the value exactly once per key, even under
//!   concurrent callers (single-flight), and writes through to all tiers
//! - a tier whose backend is down is skipped, never failing the overall call
//! - eviction is synchronous for L1/L2 and best-effort for the edge tier
//!
//! The coordinator is process-wide shared state: construct once at startup,
//! clone the handle freely, call [`CacheCoordinator::shutdown`] on teardown.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use super::backend::MemoryStore;
use super::codec::ValueCodec;
use super::distributed::DistributedTier;
use super::edge::EdgeTier;
use super::key::CacheKey;
use super::memory::MemoryTier;
use super::stats::{CacheLayer, CacheStats};
use super::tier::CacheTier;
use crate::config::{CacheConfig, MultiLayerCacheConfig};
use crate::error::{Error, Result};

/// Cloneable failure carried to every single-flight waiter
#[derive(Debug, Clone)]
struct FlightError {
    message: String,
}

type FlightResult = std::result::Result<Bytes, FlightError>;
type FlightReceiver = watch::Receiver<Option<FlightResult>>;

/// Removes the in-flight entry when the leader resolves or is dropped.
///
/// A leader cancelled mid-compute must not strand its waiters: dropping the
/// guard removes the entry and closes the channel, waking waiters into the
/// normal miss path.
struct FlightGuard<'a> {
    map: &'a DashMap<CacheKey, FlightReceiver>,
    key: &'a CacheKey,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(self.key);
    }
}

struct CoordinatorInner {
    tiers: Vec<Arc<dyn CacheTier>>,
    in_flight: DashMap<CacheKey, FlightReceiver>,
}

/// Unified multi-layer cache handle
#[derive(Clone)]
pub struct CacheCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl CacheCoordinator {
    /// Construct the coordinator with in-memory backends per tier.
    ///
    /// Remote L2/L3 backends plug in through [`Self::with_tiers`].
    pub fn new(config: MultiLayerCacheConfig) -> Result<Self> {
        config.validate()?;

        let tiers: Vec<Arc<dyn CacheTier>> = vec![
            Arc::new(MemoryTier::new(
                config.memory.clone(),
                Arc::new(MemoryStore::new()),
            )),
            Arc::new(DistributedTier::new(
                config.distributed.clone(),
                Arc::new(MemoryStore::new()),
            )),
            Arc::new(EdgeTier::in_memory(config.edge)),
        ];

        Ok(Self::with_tiers(tiers))
    }

    /// Construct over an explicit ordered tier list (fastest first).
    ///
    /// Tests substitute fakes per tier this way.
    pub fn with_tiers(tiers: Vec<Arc<dyn CacheTier>>) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                tiers,
                in_flight: DashMap::new(),
            }),
        }
    }

    // =========================================================================
    // Cacheable (read-through with single-flight)
    // =========================================================================

    /// Return the cached value for `key`, computing and caching it on a miss.
    ///
    /// All tiers are written with `config.ttl`. Concurrent callers for the
    /// same uncached key share a single `compute` invocation; if it fails,
    /// the error propagates to every waiter and no tier is written.
    #[instrument(skip(self, config, compute), fields(key = %key))]
    pub async fn cacheable<T, F, Fut>(
        &self,
        key: &CacheKey,
        config: &CacheConfig,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if config.ttl.is_zero() {
            return Err(Error::InvalidTtl {
                key: key.storage_key(),
            });
        }
        self.get_or_compute(key, config, Some(config.ttl), compute)
            .await
    }

    /// Core miss-path logic. `ttl_override = None` stores each tier with its
    /// own configured TTL.
    pub(crate) async fn get_or_compute<T, F, Fut>(
        &self,
        key: &CacheKey,
        config: &CacheConfig,
        ttl_override: Option<Duration>,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let codec = ValueCodec::new(config.serialization, config.compression);
        let mut compute = Some(compute);

        loop {
            if let Some(bytes) = self.read_through(key, ttl_override).await {
                return codec.decode(&bytes);
            }

            match self.inner.in_flight.entry(key.clone()) {
                Entry::Occupied(entry) => {
                    let mut rx = entry.get().clone();
                    drop(entry);

                    match Self::await_flight(&mut rx).await {
                        Some(Ok(bytes)) => return codec.decode(&bytes),
                        Some(Err(flight_err)) => {
                            return Err(Error::ComputeFailed {
                                key: key.storage_key(),
                                reason: flight_err.message,
                            })
                        }
                        // Leader dropped before resolving; re-enter the miss path
                        None => continue,
                    }
                }
                Entry::Vacant(entry) => {
                    let (tx, rx) = watch::channel(None);
                    entry.insert(rx);

                    let _guard = FlightGuard {
                        map: &self.inner.in_flight,
                        key,
                    };

                    // Another flight may have resolved between our miss and
                    // winning leadership; serve it to ourselves and our waiters.
                    if let Some(bytes) = self.read_through(key, ttl_override).await {
                        let _ = tx.send(Some(Ok(bytes.clone())));
                        return codec.decode(&bytes);
                    }

                    let Some(compute) = compute.take() else {
                        return Err(Error::Internal(
                            "single-flight leader elected twice for one call".into(),
                        ));
                    };

                    match compute().await {
                        Ok(value) => {
                            let bytes = match codec.encode(&value) {
                                Ok(bytes) => bytes,
                                Err(e) => {
                                    // The value is good; only the cache write
                                    // is lost. Closing the flight empty sends
                                    // waiters back to the miss path.
                                    warn!(key = %key, error = %e,
                                        "computed value could not be encoded, skipping cache write");
                                    return Ok(value);
                                }
                            };

                            self.write_through(key, bytes.clone(), ttl_override, config.max_size)
                                .await;
                            let _ = tx.send(Some(Ok(bytes)));
                            return Ok(value);
                        }
                        Err(e) => {
                            let message = e.to_string();
                            let _ = tx.send(Some(Err(FlightError {
                                message: message.clone(),
                            })));
                            return Err(Error::ComputeFailed {
                                key: key.storage_key(),
                                reason: message,
                            });
                        }
                    }
                }
            }
            // Leader paths return above; only waiters loop.
        }
    }

    /// Wait for an in-flight computation to resolve.
    ///
    /// `None` means the leader was dropped before publishing a result.
    async fn await_flight(rx: &mut FlightReceiver) -> Option<FlightResult> {
        loop {
            if let Some(result) = rx.borrow().clone() {
                return Some(result);
            }
            if rx.changed().await.is_err() {
                // Channel closed; the result may still have landed first
                return rx.borrow().clone();
            }
        }
    }

    // =========================================================================
    // Read/Write Paths
    // =========================================================================

    /// Walk tiers in order; on a lower-tier hit, backfill the faster tiers
    /// off the critical path. Unavailable tiers are skipped.
    async fn read_through(&self, key: &CacheKey, ttl_override: Option<Duration>) -> Option<Bytes> {
        for (depth, tier) in self.inner.tiers.iter().enumerate() {
            match tier.read(key).await {
                Ok(Some(bytes)) => {
                    debug!(layer = %tier.layer(), key = %key, "cache hit");
                    if depth > 0 {
                        self.backfill(key, bytes.clone(), ttl_override, depth);
                    }
                    return Some(bytes);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(layer = %tier.layer(), key = %key, error = %e,
                        "tier read failed, degrading to next tier");
                }
            }
        }
        None
    }

    /// Fire-and-forget write of a lower-tier hit into the faster tiers
    fn backfill(&self, key: &CacheKey, bytes: Bytes, ttl_override: Option<Duration>, depth: usize) {
        let inner = self.inner.clone();
        let key = key.clone();

        tokio::spawn(async move {
            for tier in &inner.tiers[..depth] {
                let ttl = ttl_override.unwrap_or_else(|| tier.default_ttl());
                if let Err(e) = tier.write(&key, bytes.clone(), ttl).await {
                    warn!(layer = %tier.layer(), key = %key, error = %e, "backfill failed");
                }
            }
        });
    }

    /// Write to every tier. A cache-write failure must never fail the
    /// business operation that produced the value, so failures only warn.
    async fn write_through(
        &self,
        key: &CacheKey,
        bytes: Bytes,
        ttl_override: Option<Duration>,
        max_size: Option<u64>,
    ) {
        if let Some(max) = max_size {
            if bytes.len() as u64 > max {
                warn!(key = %key, size = bytes.len(), max, "value exceeds max_size, not cached");
                return;
            }
        }

        for tier in &self.inner.tiers {
            let ttl = ttl_override.unwrap_or_else(|| tier.default_ttl());
            if let Err(e) = tier.write(key, bytes.clone(), ttl).await {
                warn!(layer = %tier.layer(), key = %key, error = %e, "tier write failed");
            }
        }
    }

    // =========================================================================
    // Evict / Put
    // =========================================================================

    /// Delete keys matching a glob pattern from the selected tiers
    /// (default: all). Returns the count removed from synchronous tiers;
    /// edge-tier removal is best-effort and excluded from the count.
    #[instrument(skip(self))]
    pub async fn evict(&self, pattern: &str, layers: Option<&[CacheLayer]>) -> Result<u64> {
        let mut removed = 0;

        for tier in &self.inner.tiers {
            if let Some(selected) = layers {
                if !selected.contains(&tier.layer()) {
                    continue;
                }
            }

            match tier.invalidate_pattern(pattern).await {
                Ok(count) if tier.invalidation_is_synchronous() => removed += count,
                Ok(_) => {}
                Err(e) => {
                    warn!(layer = %tier.layer(), pattern, error = %e, "tier eviction failed");
                }
            }
        }

        Ok(removed)
    }

    /// Unconditionally overwrite all tiers with `value`, bypassing the
    /// compute path. Used to warm the cache with an authoritative value a
    /// write operation already produced.
    #[instrument(skip(self, config, value), fields(key = %key))]
    pub async fn put<T: Serialize>(
        &self,
        key: &CacheKey,
        config: &CacheConfig,
        value: &T,
    ) -> Result<()> {
        if config.ttl.is_zero() {
            return Err(Error::InvalidTtl {
                key: key.storage_key(),
            });
        }

        let codec = ValueCodec::new(config.serialization, config.compression);
        let bytes = codec.encode(value)?;
        self.write_through(key, bytes, Some(config.ttl), config.max_size)
            .await;
        Ok(())
    }

    // =========================================================================
    // Raw Operation Interface
    // =========================================================================

    /// Read a value without computing on miss (still backfills faster tiers)
    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &CacheKey,
        config: &CacheConfig,
    ) -> Result<Option<T>> {
        let codec = ValueCodec::new(config.serialization, config.compression);
        match self.read_through(key, None).await {
            Some(bytes) => Ok(Some(codec.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Write a value to all tiers. `ttl = None` uses each tier's default.
    pub async fn set<T: Serialize>(
        &self,
        key: &CacheKey,
        config: &CacheConfig,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        if let Some(ttl) = ttl {
            if ttl.is_zero() {
                return Err(Error::InvalidTtl {
                    key: key.storage_key(),
                });
            }
        }

        let codec = ValueCodec::new(config.serialization, config.compression);
        let bytes = codec.encode(value)?;
        self.write_through(key, bytes, ttl, config.max_size).await;
        Ok(())
    }

    /// Delete one key from all tiers; true if any synchronous tier held it
    pub async fn delete(&self, key: &CacheKey) -> Result<bool> {
        let mut existed = false;
        for tier in &self.inner.tiers {
            match tier.invalidate(key).await {
                Ok(found) if tier.invalidation_is_synchronous() => existed |= found,
                Ok(_) => {}
                Err(e) => {
                    warn!(layer = %tier.layer(), key = %key, error = %e, "tier delete failed");
                }
            }
        }
        Ok(existed)
    }

    /// Clear all tiers, or only keys matching a pattern.
    /// Returns the count removed from synchronous tiers.
    pub async fn clear(&self, pattern: Option<&str>) -> Result<u64> {
        match pattern {
            Some(pat) => self.evict(pat, None).await,
            None => {
                let mut removed = 0;
                for tier in &self.inner.tiers {
                    match tier.clear().await {
                        Ok(count) if tier.invalidation_is_synchronous() => removed += count,
                        Ok(_) => {}
                        Err(e) => {
                            warn!(layer = %tier.layer(), error = %e, "tier clear failed");
                        }
                    }
                }
                Ok(removed)
            }
        }
    }

    // =========================================================================
    // Stats / Lifecycle
    // =========================================================================

    /// Snapshot one tier's statistics
    pub fn tier_stats(&self, layer: CacheLayer) -> Option<CacheStats> {
        self.inner
            .tiers
            .iter()
            .find(|t| t.layer() == layer)
            .map(|t| t.stats())
    }

    /// Snapshot every tier's statistics, fastest first
    pub fn stats(&self) -> Vec<CacheStats> {
        self.inner.tiers.iter().map(|t| t.stats()).collect()
    }

    /// Number of keys with an in-flight computation
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Release tier backends and drop pending flight registrations
    pub async fn shutdown(&self) {
        for tier in &self.inner.tiers {
            tier.shutdown().await;
        }
        self.inner.in_flight.clear();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> CacheCoordinator {
        CacheCoordinator::new(MultiLayerCacheConfig::default()).unwrap()
    }

    /// Coordinator over the synchronous tiers only, so tests that read right
    /// after an eviction are not racing the edge tier's async removal
    fn sync_coordinator() -> CacheCoordinator {
        let config = MultiLayerCacheConfig::default();
        CacheCoordinator::with_tiers(vec![
            Arc::new(crate::cache::memory::MemoryTier::new(
                config.memory,
                Arc::new(crate::cache::backend::MemoryStore::new()),
            )),
            Arc::new(crate::cache::distributed::DistributedTier::new(
                config.distributed,
                Arc::new(crate::cache::backend::MemoryStore::new()),
            )),
        ])
    }

    fn key(id: &str) -> CacheKey {
        CacheKey::new("finance", "position", id)
    }

    #[tokio::test]
    async fn test_cacheable_computes_on_miss_then_hits() {
        let cache = coordinator();
        let config = CacheConfig::default();

        let value: u64 = cache
            .cacheable(&key("1"), &config, || async { Ok(41 + 1) })
            .await
            .unwrap();
        assert_eq!(value, 42);

        // Second call must not recompute
        let value: u64 = cache
            .cacheable(&key("1"), &config, || async {
                panic!("compute must not run on a hit")
            })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_cacheable_rejects_zero_ttl() {
        let cache = coordinator();
        let config = CacheConfig {
            ttl: Duration::ZERO,
            ..Default::default()
        };

        let err = cache
            .cacheable::<u64, _, _>(&key("1"), &config, || async { Ok(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTtl { .. }));
    }

    #[tokio::test]
    async fn test_compute_failure_writes_nothing() {
        let cache = coordinator();
        let config = CacheConfig::default();

        let err = cache
            .cacheable::<u64, _, _>(&key("1"), &config, || async {
                Err(Error::Internal("ledger unavailable".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ComputeFailed { .. }));

        // No tier was mutated and the flight entry is gone
        let cached: Option<u64> = cache.get(&key("1"), &config).await.unwrap();
        assert_eq!(cached, None);
        assert_eq!(cache.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_unencodable_value_still_returned_to_caller() {
        use std::collections::HashMap;
        use std::sync::atomic::{AtomicU32, Ordering};

        let cache = coordinator();
        let config = CacheConfig::default();
        let computes = AtomicU32::new(0);

        // JSON has no non-string map keys, so encoding this value fails.
        // The computed result must reach the caller anyway, uncached.
        let grid: HashMap<(u32, u32), i64> = cache
            .cacheable(&key("grid"), &config, || async {
                computes.fetch_add(1, Ordering::SeqCst);
                Ok(HashMap::from([((1, 2), 3_i64)]))
            })
            .await
            .unwrap();
        assert_eq!(grid.get(&(1, 2)), Some(&3));
        assert_eq!(cache.in_flight_count(), 0);

        // Nothing landed in any tier, so the next call recomputes
        let _: HashMap<(u32, u32), i64> = cache
            .cacheable(&key("grid"), &config, || async {
                computes.fetch_add(1, Ordering::SeqCst);
                Ok(HashMap::from([((1, 2), 3_i64)]))
            })
            .await
            .unwrap();
        assert_eq!(computes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = coordinator();
        let config = CacheConfig::default();

        cache.put(&key("1"), &config, &"warm").await.unwrap();
        let value: Option<String> = cache.get(&key("1"), &config).await.unwrap();
        assert_eq!(value.as_deref(), Some("warm"));
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let cache = coordinator();
        let config = CacheConfig::default();

        cache.put(&key("1"), &config, &7u32).await.unwrap();
        let first = cache.tier_stats(CacheLayer::L1).unwrap().memory_usage;

        cache.put(&key("1"), &config, &7u32).await.unwrap();
        let second = cache.tier_stats(CacheLayer::L1).unwrap().memory_usage;
        assert_eq!(first, second);

        let value: Option<u32> = cache.get(&key("1"), &config).await.unwrap();
        assert_eq!(value, Some(7));
    }

    #[tokio::test]
    async fn test_evict_counts_synchronous_tiers() {
        let cache = sync_coordinator();
        let config = CacheConfig::default();

        cache.put(&key("1"), &config, &1u32).await.unwrap();
        cache.put(&key("2"), &config, &2u32).await.unwrap();

        // Both keys counted once per synchronous tier
        let removed = cache.evict("finance:position:*", None).await.unwrap();
        assert_eq!(removed, 4);

        let value: Option<u32> = cache.get(&key("1"), &config).await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_evict_layer_selection() {
        let cache = coordinator();
        let config = CacheConfig::default();

        cache.put(&key("1"), &config, &1u32).await.unwrap();

        let removed = cache
            .evict("finance:position:*", Some(&[CacheLayer::L1]))
            .await
            .unwrap();
        assert_eq!(removed, 1);

        // Still served from L2
        let value: Option<u32> = cache.get(&key("1"), &config).await.unwrap();
        assert_eq!(value, Some(1));
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let cache = coordinator();
        let config = CacheConfig::default();

        cache.put(&key("1"), &config, &1u32).await.unwrap();
        assert!(cache.delete(&key("1")).await.unwrap());
        assert!(!cache.delete(&key("1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let cache = coordinator();
        let config = CacheConfig::default();

        cache.put(&key("1"), &config, &1u32).await.unwrap();
        assert!(cache.clear(None).await.unwrap() > 0);
        assert_eq!(cache.clear(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stats_cover_all_layers() {
        let cache = coordinator();
        let stats = cache.stats();
        assert_eq!(stats.len(), 3);
        assert_eq!(stats[0].layer, CacheLayer::L1);
        assert_eq!(stats[2].layer, CacheLayer::L3);
    }

    #[tokio::test]
    async fn test_shutdown_clears_flights() {
        let cache = coordinator();
        cache.shutdown().await;
        assert_eq!(cache.in_flight_count(), 0);
    }
}
