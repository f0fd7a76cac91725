//! Multi-Layer Cache Subsystem
//!
//! Three-tier cache with declarative directives:
//!
//! - **L1 memory**: in-process, capacity-bounded, LRU/LFU/FIFO eviction
//! - **L2 distributed**: shared, namespaced and optionally sharded key space
//! - **L3 edge**: regional fan-out with best-effort invalidation
//!
//! Reads fall through L1 → L2 → L3 and backfill the faster tiers; writes and
//! invalidations go through all tiers. The [`CacheCoordinator`] owns the
//! cross-tier logic (read-through, write-through, single-flight) while each
//! tier adapter owns its layer's policy over a pluggable [`CacheBackend`].

pub mod backend;
pub mod codec;
pub mod coordinator;
pub mod directives;
pub mod distributed;
pub mod edge;
pub mod key;
pub mod memory;
pub mod stats;
pub mod tier;

#[cfg(test)]
mod proptest;

pub use backend::{CacheBackend, Clock, ManualClock, MemoryStore, SystemClock};
pub use coordinator::CacheCoordinator;
pub use directives::{
    cacheable_call, cacheable_evict_call, evict_call, put_call, CacheableOptions, EvictOptions,
    PutOptions,
};
pub use distributed::DistributedTier;
pub use edge::{EdgeTier, Region};
pub use key::CacheKey;
pub use memory::MemoryTier;
pub use stats::{BackendStats, CacheLayer, CacheStats};
pub use tier::CacheTier;
