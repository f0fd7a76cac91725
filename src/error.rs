//! Error types for the cache coordinator and saga orchestrator

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tierflow
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Cache Errors
    // =========================================================================
    /// Non-positive TTL supplied to a cache write
    #[error("invalid TTL for key '{key}': TTL must be greater than zero")]
    InvalidTtl { key: String },

    /// A tier's backend cannot be reached
    #[error("cache backend for {tier} unavailable: {reason}")]
    BackendUnavailable { tier: String, reason: String },

    /// The wrapped business computation failed; no tier was mutated
    #[error("compute failed for key '{key}': {reason}")]
    ComputeFailed { key: String, reason: String },

    /// Value serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Value deserialization failed
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Compression failed
    #[error("compression with {algorithm} failed: {reason}")]
    CompressionFailed { algorithm: String, reason: String },

    /// Decompression failed
    #[error("decompression with {algorithm} failed: {reason}")]
    DecompressionFailed { algorithm: String, reason: String },

    // =========================================================================
    // Saga Errors
    // =========================================================================
    /// A saga step's forward action exhausted its retries
    #[error("saga step '{step}' failed after {attempts} attempt(s): {reason}")]
    StepExecutionFailed {
        step: String,
        attempts: u32,
        reason: String,
    },

    /// A saga step's forward action (including retries) exceeded its timeout
    #[error("saga step '{step}' timed out after {timeout_ms}ms")]
    StepTimeout { step: String, timeout_ms: u64 },

    /// A compensating action failed; recorded as a gap, sweep continues
    #[error("compensation for step '{step}' failed: {reason}")]
    CompensationFailed { step: String, reason: String },

    /// Saga terminated with one or more compensation gaps
    #[error("saga {saga_id} incomplete: uncompensated steps {gaps:?}")]
    SagaIncomplete { saga_id: String, gaps: Vec<String> },

    /// Saga failed but every completed step was compensated
    #[error("saga {saga_id} rolled back at step '{step}': {reason}")]
    SagaRolledBack {
        saga_id: String,
        step: String,
        reason: String,
    },

    // =========================================================================
    // General Errors
    // =========================================================================
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
