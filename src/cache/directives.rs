//! Declarative Cache Directives
//!
//! Annotation-equivalent contract for call sites, expressed as explicit
//! interceptor composition: a service wraps its method call through one of
//! the adapter functions here instead of attaching runtime metadata.
//!
//! - [`cacheable_call`]: cache the return value, compute on miss
//! - [`evict_call`]: invalidate a key pattern around the call
//! - [`put_call`]: warm the cache with the call's return value
//! - [`cacheable_evict_call`]: cache the return value and evict a separate
//!   key set in one call
//!
//! Each options struct is built once (typically as a `static` or a field on
//! the service) and applied per invocation.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::coordinator::CacheCoordinator;
use super::key::CacheKey;
use super::stats::CacheLayer;
use crate::config::{CacheConfig, SerializationFormat};
use crate::error::{Error, Result};

/// Options for [`cacheable_call`]
#[derive(Debug, Clone)]
pub struct CacheableOptions {
    pub key: CacheKey,
    /// Per-call TTL override; `None` stores each tier with its own default
    pub ttl: Option<Duration>,
    /// When false the cache is bypassed entirely and the call always runs
    pub condition: bool,
    pub serialization: SerializationFormat,
    pub compression: bool,
    pub max_size: Option<u64>,
}

impl CacheableOptions {
    pub fn new(key: CacheKey) -> Self {
        Self {
            key,
            ttl: None,
            condition: true,
            serialization: SerializationFormat::default(),
            compression: false,
            max_size: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_condition(mut self, condition: bool) -> Self {
        self.condition = condition;
        self
    }

    pub fn with_serialization(mut self, format: SerializationFormat) -> Self {
        self.serialization = format;
        self
    }

    pub fn with_compression(mut self, compression: bool) -> Self {
        self.compression = compression;
        self
    }

    fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: self.ttl.unwrap_or(CacheConfig::default().ttl),
            max_size: self.max_size,
            compression: self.compression,
            serialization: self.serialization,
        }
    }
}

/// Options for [`evict_call`]
#[derive(Debug, Clone)]
pub struct EvictOptions {
    /// Glob over storage keys, e.g. `"finance:position:*"`
    pub pattern: String,
    /// Evict before the call runs instead of after it succeeds.
    /// Before-eviction applies even when the call subsequently fails.
    pub before_invocation: bool,
    /// Restrict eviction to specific layers; `None` means all
    pub layers: Option<Vec<CacheLayer>>,
}

impl EvictOptions {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            before_invocation: false,
            layers: None,
        }
    }

    pub fn before_invocation(mut self) -> Self {
        self.before_invocation = true;
        self
    }

    pub fn with_layers(mut self, layers: Vec<CacheLayer>) -> Self {
        self.layers = Some(layers);
        self
    }
}

/// Options for [`put_call`]
#[derive(Debug, Clone)]
pub struct PutOptions {
    pub key: CacheKey,
    /// Per-call TTL override; `None` stores each tier with its own default
    pub ttl: Option<Duration>,
    pub serialization: SerializationFormat,
    pub compression: bool,
    pub max_size: Option<u64>,
}

impl PutOptions {
    pub fn new(key: CacheKey) -> Self {
        Self {
            key,
            ttl: None,
            serialization: SerializationFormat::default(),
            compression: false,
            max_size: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: self.ttl.unwrap_or(CacheConfig::default().ttl),
            max_size: self.max_size,
            compression: self.compression,
            serialization: self.serialization,
        }
    }
}

/// Cache the call's return value under `opts.key`, computing on miss.
///
/// With `condition = false` the cache is neither read nor written.
pub async fn cacheable_call<T, F, Fut>(
    cache: &CacheCoordinator,
    opts: &CacheableOptions,
    call: F,
) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if !opts.condition {
        return call().await;
    }
    if let Some(ttl) = opts.ttl {
        if ttl.is_zero() {
            return Err(Error::InvalidTtl {
                key: opts.key.storage_key(),
            });
        }
    }
    cache
        .get_or_compute(&opts.key, &opts.cache_config(), opts.ttl, call)
        .await
}

/// Run the call with pattern eviction before or after it, per
/// `opts.before_invocation`. After-eviction only runs when the call
/// succeeded; the stale entries stay cached if it failed.
pub async fn evict_call<T, F, Fut>(
    cache: &CacheCoordinator,
    opts: &EvictOptions,
    call: F,
) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if opts.before_invocation {
        cache.evict(&opts.pattern, opts.layers.as_deref()).await?;
        call().await
    } else {
        let value = call().await?;
        cache.evict(&opts.pattern, opts.layers.as_deref()).await?;
        Ok(value)
    }
}

/// Run the call and warm the cache with its return value on success
pub async fn put_call<T, F, Fut>(
    cache: &CacheCoordinator,
    opts: &PutOptions,
    call: F,
) -> Result<T>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let value = call().await?;
    cache
        .set(&opts.key, &opts.cache_config(), &value, opts.ttl)
        .await?;
    Ok(value)
}

/// Combined directive: cache the return value under `cache_opts.key` and
/// evict `evict_opts.pattern` around the same invocation. Eviction applies
/// on a cache hit too, since the caller declared the key set stale.
pub async fn cacheable_evict_call<T, F, Fut>(
    cache: &CacheCoordinator,
    cache_opts: &CacheableOptions,
    evict_opts: &EvictOptions,
    call: F,
) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if evict_opts.before_invocation {
        cache
            .evict(&evict_opts.pattern, evict_opts.layers.as_deref())
            .await?;
        cacheable_call(cache, cache_opts, call).await
    } else {
        let value = cacheable_call(cache, cache_opts, call).await?;
        cache
            .evict(&evict_opts.pattern, evict_opts.layers.as_deref())
            .await?;
        Ok(value)
    }
}

// =============================================================================
// Tests
// =============================================================================
