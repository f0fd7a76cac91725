//! Compensating-Transaction Saga Subsystem
//!
//! Approximates atomicity across steps that cannot share one transaction:
//! forward actions run strictly in submission order, and on failure, the
//! completed steps' compensating actions run in exact reverse order. Steps
//! a sweep could not undo are surfaced as compensation gaps for manual
//! operation rather than silently swallowed.

pub mod orchestrator;
pub mod step;

pub use orchestrator::{Saga, SagaOptions, SagaOrchestrator};
pub use step::{SagaReport, SagaStatus, SagaStep, StepRecord, StepStatus};
