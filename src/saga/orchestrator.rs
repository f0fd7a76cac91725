//! Saga Orchestrator
//!
//! Executes an ordered step list strictly sequentially, retrying forward
//! actions per policy, and runs compensating actions in reverse order when
//! a step fails.
//!
//! # Design
//!
//! - Steps are never reordered or parallelized, even if independent;
//!   compensation correctness depends on exact reverse order.
//! - The per-step timeout bounds a step's forward attempts in aggregate.
//! - Compensation is single-attempt and best-effort: a failed or missing
//!   compensating action is recorded as a gap and the sweep continues.
//! - Run state lives only for one execution; nothing is persisted across
//!   process restarts.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use super::step::{SagaReport, SagaStatus, SagaStep, StepStatus};
use crate::config::SagaDefaults;
use crate::error::{Error, Result};

/// Per-saga overrides; `None` falls back to [`SagaDefaults`]
#[derive(Debug, Clone, Default)]
pub struct SagaOptions {
    /// Bounds each step's forward attempts in aggregate
    pub step_timeout: Option<Duration>,
    /// Additional forward attempts after the first failure
    pub retries: Option<u32>,
    /// Delay between forward attempts
    pub retry_delay: Option<Duration>,
}

/// An ordered step list submitted for one execution
pub struct Saga {
    name: String,
    steps: Vec<SagaStep>,
    options: SagaOptions,
}

impl Saga {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            options: SagaOptions::default(),
        }
    }

    pub fn step(mut self, step: SagaStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_options(mut self, options: SagaOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

/// Executes sagas with defaults applied to unconfigured options
#[derive(Debug, Clone, Default)]
pub struct SagaOrchestrator {
    defaults: SagaDefaults,
}

impl SagaOrchestrator {
    pub fn new(defaults: SagaDefaults) -> Self {
        Self { defaults }
    }

    /// Run the saga to a terminal status.
    ///
    /// Always returns the full report; [`SagaReport::into_result`] maps the
    /// terminal status onto the error taxonomy when a `Result` is wanted.
    #[instrument(skip(self, saga), fields(saga = %saga.name))]
    pub async fn run(&self, saga: Saga) -> SagaReport {
        let step_names: Vec<&str> = saga.steps.iter().map(|s| s.name()).collect();
        let mut report = SagaReport::new(&saga.name, &step_names);

        let mut seen = HashSet::new();
        for name in &step_names {
            if !seen.insert(*name) {
                report.status = SagaStatus::Failed;
                report.error = Some(format!("duplicate step name: {name}"));
                report.finished_at = Some(Utc::now());
                warn!(saga_id = %report.id, step = name, "rejected saga with duplicate step name");
                return report;
            }
        }

        let timeout = saga.options.step_timeout.or(self.defaults.step_timeout);
        let retries = saga.options.retries.unwrap_or(self.defaults.retries);
        let retry_delay = saga.options.retry_delay.unwrap_or(self.defaults.retry_delay);

        report.status = SagaStatus::Running;
        info!(saga_id = %report.id, steps = saga.steps.len(), "saga started");

        let mut failure: Option<(usize, String)> = None;
        for (idx, step) in saga.steps.iter().enumerate() {
            let record = &mut report.steps[idx];
            record.status = StepStatus::Running;
            record.started_at = Some(Utc::now());

            let attempts = AtomicU32::new(0);
            let outcome = Self::run_forward(step, timeout, retries, retry_delay, &attempts).await;
            record.attempts = attempts.load(Ordering::SeqCst).max(1);
            record.finished_at = Some(Utc::now());

            match outcome {
                Ok(output) => {
                    debug!(saga_id = %report.id, step = step.name(),
                        attempts = record.attempts, "step completed");
                    record.status = StepStatus::Completed;
                    record.output = Some(output);
                }
                Err(e) => {
                    warn!(saga_id = %report.id, step = step.name(),
                        attempts = record.attempts, error = %e, "step failed");
                    record.status = StepStatus::Failed;
                    record.error = Some(e.to_string());
                    failure = Some((idx, e.to_string()));
                    break;
                }
            }
        }

        match failure {
            None => report.status = SagaStatus::Completed,
            Some((failed_idx, reason)) => {
                report.error = Some(reason);
                report.status = SagaStatus::Compensating;
                Self::compensate(&saga.steps, &mut report, failed_idx).await;
                report.status = if report.compensation_gaps.is_empty() {
                    SagaStatus::Compensated
                } else {
                    SagaStatus::Failed
                };
            }
        }

        report.finished_at = Some(Utc::now());
        info!(saga_id = %report.id, status = %report.status,
            gaps = report.compensation_gaps.len(), "saga finished");
        report
    }

    /// Convenience wrapper: run and map the terminal status onto an error
    pub async fn run_to_result(&self, saga: Saga) -> Result<SagaReport> {
        self.run(saga).await.into_result()
    }

    /// Execute one step's forward action under the retry and timeout policy.
    ///
    /// `attempts` is shared so the caller can observe how many attempts
    /// started even when the timeout cuts the loop short.
    async fn run_forward(
        step: &SagaStep,
        timeout: Option<Duration>,
        retries: u32,
        retry_delay: Duration,
        attempts: &AtomicU32,
    ) -> Result<serde_json::Value> {
        let budget = retries.saturating_add(1);
        let forward = async {
            let mut last_err = None;
            for attempt in 1..=budget {
                attempts.store(attempt, Ordering::SeqCst);
                match step.run_forward().await {
                    Ok(output) => return Ok(output),
                    Err(e) => {
                        warn!(step = step.name(), attempt, budget, error = %e,
                            "forward action failed");
                        last_err = Some(e);
                        if attempt < budget && !retry_delay.is_zero() {
                            tokio::time::sleep(retry_delay).await;
                        }
                    }
                }
            }
            Err(last_err.unwrap_or_else(|| Error::Internal("zero-attempt budget".into())))
        };

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, forward).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(Error::StepTimeout {
                        step: step.name().to_string(),
                        timeout_ms: limit.as_millis() as u64,
                    })
                }
            },
            None => forward.await,
        };

        outcome.map_err(|e| Error::StepExecutionFailed {
            step: step.name().to_string(),
            attempts: attempts.load(Ordering::SeqCst),
            reason: e.to_string(),
        })
    }

    /// Sweep completed steps in reverse order, compensating each at most
    /// once. Failures and missing compensating actions become gaps; the
    /// sweep never aborts early.
    async fn compensate(steps: &[SagaStep], report: &mut SagaReport, failed_idx: usize) {
        for idx in (0..failed_idx).rev() {
            if report.steps[idx].status != StepStatus::Completed {
                continue;
            }
            let step = &steps[idx];

            match step.run_compensation() {
                None => {
                    warn!(saga_id = %report.id, step = step.name(),
                        "step has no compensating action, recording gap");
                    report.compensation_gaps.push(step.name().to_string());
                }
                Some(fut) => match fut.await {
                    Ok(()) => {
                        debug!(saga_id = %report.id, step = step.name(), "step compensated");
                        report.steps[idx].status = StepStatus::Compensated;
                    }
                    Err(e) => {
                        let gap = Error::CompensationFailed {
                            step: step.name().to_string(),
                            reason: e.to_string(),
                        };
                        warn!(saga_id = %report.id, error = %gap, "recording gap");
                        report.steps[idx].compensation_error = Some(gap.to_string());
                        report.compensation_gaps.push(step.name().to_string());
                    }
                },
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
