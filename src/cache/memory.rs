//! L1 Memory Tier
//!
//! In-process tier bounded by `max_memory_mb`. When an insert would exceed
//! the bound, victims are evicted first (evict-then-insert, so the bound is
//! never transiently overshot) according to the configured policy:
//!
//! - LRU evicts the least-recently-accessed entry
//! - LFU evicts the lowest access count, ties broken by oldest insertion
//! - FIFO evicts the oldest insertion regardless of access

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::warn;

use super::backend::CacheBackend;
use super::key::CacheKey;
use super::stats::{CacheLayer, CacheStats, TierMetrics};
use super::tier::CacheTier;
use crate::config::{EvictionPolicy, MemoryTierConfig};
use crate::error::Result;

/// Per-entry bookkeeping for victim selection
#[derive(Debug, Clone, Copy)]
struct EntryMeta {
    size: u64,
    inserted_seq: u64,
    last_access_seq: u64,
    access_count: u64,
}

/// Adapter-side index over the backend's keys.
///
/// The backend stores the payloads; the index tracks the access metadata the
/// eviction policies need. Sequence numbers stand in for timestamps so
/// ordering is exact even for accesses within the same clock tick.
#[derive(Debug, Default)]
struct MemoryIndex {
    entries: HashMap<String, EntryMeta>,
    total_bytes: u64,
    seq: u64,
}

impl MemoryIndex {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn record_insert(&mut self, key: String, size: u64) {
        let seq = self.next_seq();
        if let Some(old) = self.entries.insert(
            key,
            EntryMeta {
                size,
                inserted_seq: seq,
                last_access_seq: seq,
                access_count: 0,
            },
        ) {
            self.total_bytes -= old.size;
        }
        self.total_bytes += size;
    }

    fn record_access(&mut self, key: &str) {
        let seq = self.next_seq();
        if let Some(meta) = self.entries.get_mut(key) {
            meta.last_access_seq = seq;
            meta.access_count += 1;
        }
    }

    fn remove(&mut self, key: &str) -> Option<EntryMeta> {
        let meta = self.entries.remove(key)?;
        self.total_bytes -= meta.size;
        Some(meta)
    }

    /// Pick the eviction victim under the given policy
    fn select_victim(&self, policy: EvictionPolicy) -> Option<String> {
        let best = match policy {
            EvictionPolicy::Lru => self
                .entries
                .iter()
                .min_by_key(|(_, meta)| meta.last_access_seq),
            EvictionPolicy::Lfu => self
                .entries
                .iter()
                .min_by_key(|(_, meta)| (meta.access_count, meta.inserted_seq)),
            EvictionPolicy::Fifo => self.entries.iter().min_by_key(|(_, meta)| meta.inserted_seq),
        };
        best.map(|(key, _)| key.clone())
    }
}

/// L1 tier: bounded in-process memory with policy-driven eviction
pub struct MemoryTier {
    backend: Arc<dyn CacheBackend>,
    config: MemoryTierConfig,
    index: Mutex<MemoryIndex>,
    metrics: TierMetrics,
}

impl MemoryTier {
    /// Create a memory tier over the given backend
    pub fn new(config: MemoryTierConfig, backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            config,
            index: Mutex::new(MemoryIndex::default()),
            metrics: TierMetrics::new(),
        }
    }

    fn capacity_bytes(&self) -> u64 {
        self.config.capacity_bytes()
    }

    /// Evict until `incoming` bytes fit under the bound, then reserve the
    /// incoming entry in the index under the same lock. The reservation is
    /// what keeps the bound intact under concurrent writers: each plan sees
    /// the bytes every earlier plan has already claimed, not just what the
    /// backend has finished writing.
    ///
    /// Returns the victims to delete from the backend; the caller deletes
    /// them outside the index lock and rolls the reservation back if the
    /// backend write fails.
    fn plan_eviction(&self, key: &str, incoming: u64) -> Vec<String> {
        let mut index = self.index.lock();

        // Replacing a key frees its old bytes first
        let replaced = index.entries.get(key).map(|m| m.size).unwrap_or(0);
        let mut projected = index.total_bytes - replaced + incoming;

        let mut victims = Vec::new();
        while projected > self.capacity_bytes() {
            let Some(victim) = index.select_victim(self.config.eviction_policy) else {
                break;
            };
            if victim == key {
                // Only the key being replaced remains; nothing else to free
                break;
            }
            if let Some(meta) = index.remove(&victim) {
                projected -= meta.size;
                victims.push(victim);
            }
        }

        index.record_insert(key.to_string(), incoming);
        victims
    }
}

#[async_trait]
impl CacheTier for MemoryTier {
    fn layer(&self) -> CacheLayer {
        CacheLayer::L1
    }

    fn default_ttl(&self) -> Duration {
        self.config.cache.ttl
    }

    async fn read(&self, key: &CacheKey) -> Result<Option<Bytes>> {
        let storage_key = key.storage_key();
        match self.backend.get(&storage_key).await {
            Ok(Some(value)) => {
                self.metrics.record_hit();
                self.index.lock().record_access(&storage_key);
                Ok(Some(value))
            }
            Ok(None) => {
                self.metrics.record_miss();
                // Entry may have expired in the backend; drop stale metadata
                self.index.lock().remove(&storage_key);
                Ok(None)
            }
            Err(e) => {
                self.metrics.record_error();
                Err(e)
            }
        }
    }

    async fn write(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> Result<()> {
        let storage_key = key.storage_key();
        let size = value.len() as u64;

        if size > self.capacity_bytes() {
            warn!(key = %key, size, capacity = self.capacity_bytes(),
                "value exceeds memory tier capacity, not cached");
            return Ok(());
        }

        let victims = self.plan_eviction(&storage_key, size);
        for victim in &victims {
            if let Err(e) = self.backend.delete(victim).await {
                warn!(key = %victim, error = %e, "eviction delete failed");
            }
        }
        self.metrics.record_evictions(victims.len() as u64);

        if let Err(e) = self.backend.set(&storage_key, value, ttl).await {
            // Release the reservation taken in plan_eviction
            self.index.lock().remove(&storage_key);
            return Err(e);
        }

        // A concurrent writer may have evicted the reservation while this
        // write was pending; its backend delete ran before this write landed,
        // so drop the orphaned value rather than leave it unindexed.
        if !self.index.lock().entries.contains_key(&storage_key) {
            let _ = self.backend.delete(&storage_key).await;
        }
        Ok(())
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        let storage_key = key.storage_key();
        self.index.lock().remove(&storage_key);
        self.backend.delete(&storage_key).await
    }

    async fn invalidate_pattern(&self, pattern: &str) -> Result<u64> {
        let matching: Vec<String> = {
            let index = self.index.lock();
            index
                .entries
                .keys()
                .filter(|k| super::backend::key_matches(pattern, k))
                .cloned()
                .collect()
        };

        let mut removed = 0;
        for key in matching {
            self.index.lock().remove(&key);
            if self.backend.delete(&key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<u64> {
        let removed = self.backend.clear(None).await?;
        let mut index = self.index.lock();
        index.entries.clear();
        index.total_bytes = 0;
        Ok(removed)
    }

    fn stats(&self) -> CacheStats {
        let memory_usage = self.index.lock().total_bytes;
        self.metrics.snapshot(CacheLayer::L1, memory_usage)
    }
}

// =============================================================================
// Tests
// =============================================================================
