//! TierFlow - Multi-Layer Cache Coordination and Saga Orchestration
//!
//! Declarative caching across three tiers plus compensating-transaction
//! sagas for multi-step business operations that cannot share one
//! database transaction.
//!
//! # Architecture
//!
//! ```text
//! Call Site ──(directives)──▶ Coordinator ──▶ L1 memory ─▶ L2 distributed ─▶ L3 edge
//!     │
//!     └──(ordered step list)──▶ Saga Orchestrator ──▶ forward / compensate
//! ```
//!
//! Reads fall through L1 → L2 → L3 and backfill faster tiers off the
//! critical path; a full miss computes the value exactly once per key under
//! concurrency (single-flight) and writes through to every tier. Sagas run
//! steps strictly in submission order and compensate completed steps in
//! exact reverse order on failure, reporting any compensation gaps.
//!
//! # Modules
//!
//! - [`cache`] - Coordinator, tier adapters, backends, declarative directives
//! - [`saga`] - Step model and sequential compensating orchestrator
//! - [`config`] - Immutable configuration snapshots handed in at construction
//! - [`error`] - Error taxonomy shared by both subsystems

pub mod cache;
pub mod config;
pub mod error;
pub mod saga;

// Re-export commonly used types
pub use cache::{CacheCoordinator, CacheKey, CacheLayer};
pub use config::{EvictionPolicy, MultiLayerCacheConfig, SagaDefaults, SerializationFormat};
pub use error::{Error, Result};
pub use saga::{Saga, SagaOrchestrator, SagaStep};
