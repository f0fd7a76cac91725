//! Saga Step and Run-State Model
//!
//! A step pairs a forward action with an optional compensating action.
//! Actions are plain async function values stored by value in the ordered
//! step list; forward outputs are erased to JSON so heterogeneous steps can
//! share one report.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use uuid::Uuid;

use crate::error::{Error, Result};

type ExecuteFn = Box<dyn Fn() -> BoxFuture<'static, Result<serde_json::Value>> + Send + Sync>;
type CompensateFn = Box<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// One forward action with an optional compensating action.
///
/// The forward action may run more than once (retries); the compensating
/// action runs at most once. A step without a compensating action is
/// non-reversible: if it completed and a later step fails, it is recorded
/// as a compensation gap.
pub struct SagaStep {
    name: String,
    execute: ExecuteFn,
    compensate: Option<CompensateFn>,
}

impl SagaStep {
    pub fn new<F, Fut, T>(name: impl Into<String>, execute: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Serialize,
    {
        Self {
            name: name.into(),
            execute: Box::new(move || {
                let fut = execute();
                Box::pin(async move {
                    let value = fut.await?;
                    serde_json::to_value(value).map_err(Error::from)
                })
            }),
            compensate: None,
        }
    }

    pub fn with_compensation<C, Fut>(mut self, compensate: C) -> Self
    where
        C: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.compensate = Some(Box::new(move || Box::pin(compensate())));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_reversible(&self) -> bool {
        self.compensate.is_some()
    }

    pub(crate) fn run_forward(&self) -> BoxFuture<'static, Result<serde_json::Value>> {
        (self.execute)()
    }

    pub(crate) fn run_compensation(&self) -> Option<BoxFuture<'static, Result<()>>> {
        self.compensate.as_ref().map(|c| c())
    }
}

impl fmt::Debug for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SagaStep")
            .field("name", &self.name)
            .field("reversible", &self.is_reversible())
            .finish()
    }
}

/// Per-step lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Compensated,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "PENDING",
            StepStatus::Running => "RUNNING",
            StepStatus::Completed => "COMPLETED",
            StepStatus::Failed => "FAILED",
            StepStatus::Compensated => "COMPENSATED",
        };
        f.write_str(s)
    }
}

/// Saga run lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStatus {
    Created,
    Running,
    Completed,
    Failed,
    Compensating,
    Compensated,
}

impl SagaStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaStatus::Completed | SagaStatus::Failed | SagaStatus::Compensated
        )
    }
}

impl fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SagaStatus::Created => "CREATED",
            SagaStatus::Running => "RUNNING",
            SagaStatus::Completed => "COMPLETED",
            SagaStatus::Failed => "FAILED",
            SagaStatus::Compensating => "COMPENSATING",
            SagaStatus::Compensated => "COMPENSATED",
        };
        f.write_str(s)
    }
}

/// Audit record for one step of a saga run
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub name: String,
    pub status: StepStatus,
    /// Forward attempts actually started, including the first
    pub attempts: u32,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Set when the compensating action itself failed; the step keeps its
    /// COMPLETED status and is listed as a compensation gap
    pub compensation_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StepRecord {
    pub(crate) fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: StepStatus::Pending,
            attempts: 0,
            output: None,
            error: None,
            compensation_error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

/// Final outcome of one saga run, consumed by the caller once terminal
#[derive(Debug, Clone, Serialize)]
pub struct SagaReport {
    pub id: Uuid,
    pub name: String,
    pub status: SagaStatus,
    pub steps: Vec<StepRecord>,
    /// The failure that triggered compensation, if any
    pub error: Option<String>,
    /// Completed steps whose compensating action is missing or failed
    pub compensation_gaps: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SagaReport {
    pub(crate) fn new(name: &str, step_names: &[&str]) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            status: SagaStatus::Created,
            steps: step_names.iter().map(|n| StepRecord::pending(n)).collect(),
            error: None,
            compensation_gaps: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }

    /// Name of the step whose forward action failed, if any
    pub fn failed_step(&self) -> Option<&str> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::Failed)
            .map(|s| s.name.as_str())
    }

    /// Map the terminal status onto the error taxonomy.
    ///
    /// `COMPLETED` is `Ok`; a fully compensated rollback and a rollback with
    /// gaps are distinct errors so callers can alert on gaps specifically.
    pub fn into_result(self) -> Result<SagaReport> {
        match self.status {
            SagaStatus::Completed => Ok(self),
            SagaStatus::Failed => Err(Error::SagaIncomplete {
                saga_id: self.id.to_string(),
                gaps: self.compensation_gaps,
            }),
            SagaStatus::Compensated => {
                let step = self.failed_step().unwrap_or("<unknown>").to_string();
                let reason = self.error.unwrap_or_else(|| "step failed".to_string());
                Err(Error::SagaRolledBack {
                    saga_id: self.id.to_string(),
                    step,
                    reason,
                })
            }
            status => Err(Error::Internal(format!(
                "saga {} finished in non-terminal status {status}",
                self.id
            ))),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
