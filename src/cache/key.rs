//! Cache Key Types
//!
//! Composite key identifying a cached value: `{namespace, entity, id, version}`.
//! Two keys are equal iff all four fields match; `version` participates in
//! equality so schema-incompatible cached values never collide.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Composite cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Namespace, typically the owning module name
    namespace: String,
    /// Entity, typically the method or resource name
    entity: String,
    /// Stable identity of the cached value (argument fingerprint)
    id: String,
    /// Schema version tag, participates in equality
    version: Option<String>,
}

impl CacheKey {
    /// Create a new cache key without a version tag
    pub fn new(
        namespace: impl Into<String>,
        entity: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            entity: entity.into(),
            id: id.into(),
            version: None,
        }
    }

    /// Attach a schema version tag
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Derive a key from method identity plus an argument fingerprint.
    ///
    /// The `id` becomes the stable JSON serialization of `args`. Key
    /// derivation is a call-site responsibility; this is a convenience for
    /// the common case.
    pub fn for_call<A: Serialize>(
        namespace: impl Into<String>,
        entity: impl Into<String>,
        args: &A,
        version: Option<&str>,
    ) -> Result<Self> {
        let fingerprint = serde_json::to_string(args)?;
        let mut key = Self::new(namespace, entity, fingerprint);
        if let Some(v) = version {
            key = key.with_version(v);
        }
        Ok(key)
    }

    /// Namespace component
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Entity component
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Identity component
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Version tag, if any
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Serialized physical form: `namespace:entity:id[:version]`.
    ///
    /// This is the form backends store and glob eviction patterns match.
    pub fn storage_key(&self) -> String {
        match &self.version {
            Some(v) => format!("{}:{}:{}:{}", self.namespace, self.entity, self.id, v),
            None => format!("{}:{}:{}", self.namespace, self.entity, self.id),
        }
    }

    /// Stable non-cryptographic hash of the serialized form (FxHash).
    ///
    /// Deterministic across processes, so repeated lookups for the same key
    /// always route to the same shard.
    pub fn stable_hash(&self) -> u64 {
        fx_hash(self.storage_key().as_bytes())
    }

    /// Map this key onto one of `shard_count` logical shards
    pub fn shard_index(&self, shard_count: u32) -> u32 {
        debug_assert!(shard_count > 0);
        (self.stable_hash() % shard_count as u64) as u32
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.storage_key())
    }
}

/// Fast non-cryptographic hash (FxHash algorithm)
#[inline]
pub(crate) fn fx_hash(bytes: &[u8]) -> u64 {
    const SEED: u64 = 0x517cc1b727220a95;
    let mut hash = SEED;
    for &byte in bytes {
        hash = hash.rotate_left(5) ^ (byte as u64);
        hash = hash.wrapping_mul(SEED);
    }
    hash
}

// =============================================================================
// Tests
// =============================================================================
