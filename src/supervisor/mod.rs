//! Worker supervision for one batch
//!
//! Every worker of a batch runs as its own tokio task driving its stage chain.
//! Under fail-fast supervision the first failure aborts the sibling tasks;
//! aborting drops their in-flight subprocess futures, which kills the child
//! process groups. Under best-effort supervision every worker is joined and
//! failures are only reported.

use crate::batch::Batch;
use crate::error::{PipelineError, Result};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, warn};

/// What a batch does when one of its workers fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SupervisionPolicy {
    /// Terminate the remaining workers and fail the batch
    #[default]
    FailFast,
    /// Let every worker finish and report failures
    BestEffort,
}

/// Identity of one worker within a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSpec {
    pub batch_number: usize,
    pub worker: usize,
    pub simulation_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    Succeeded,
    Failed(String),
    /// Stopped because a sibling failed
    Terminated,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerStatus::Succeeded => write!(f, "succeeded"),
            WorkerStatus::Failed(reason) => write!(f, "failed: {reason}"),
            WorkerStatus::Terminated => write!(f, "terminated"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    pub spec: WorkerSpec,
    pub status: WorkerStatus,
}

/// Per-worker results of a batch, ordered by worker index
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch_number: usize,
    pub outcomes: Vec<WorkerOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == WorkerStatus::Succeeded)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn status_of(&self, worker: usize) -> Option<&WorkerStatus> {
        self.outcomes
            .iter()
            .find(|o| o.spec.worker == worker)
            .map(|o| &o.status)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerSupervisor {
    policy: SupervisionPolicy,
}

impl WorkerSupervisor {
    pub fn new(policy: SupervisionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> SupervisionPolicy {
        self.policy
    }

    /// Run one task per worker of `batch` and wait for all of them
    pub async fn run_batch<F>(&self, batch: &Batch, executor: F) -> Result<BatchReport>
    where
        F: Fn(WorkerSpec) -> BoxFuture<'static, Result<()>>,
    {
        info!(
            "Running {} with {} workers ({:?})",
            batch, batch.worker_count, self.policy
        );

        let mut tasks = FuturesUnordered::new();
        let mut abort_handles = Vec::with_capacity(batch.worker_count);

        for worker in batch.workers() {
            let Some(simulation_index) = batch.sim_number(worker) else {
                continue;
            };
            let spec = WorkerSpec {
                batch_number: batch.batch_number,
                worker,
                simulation_index,
            };
            let handle = tokio::spawn(executor(spec));
            abort_handles.push(handle.abort_handle());
            tasks.push(async move { (spec, handle.await) });
        }

        let mut outcomes = Vec::with_capacity(batch.worker_count);
        let mut aborted = false;

        while let Some((spec, joined)) = tasks.next().await {
            let status = match joined {
                Ok(Ok(())) => {
                    debug!("Worker {} (simulation {}) succeeded", spec.worker, spec.simulation_index);
                    WorkerStatus::Succeeded
                }
                Ok(Err(e)) => {
                    error!(
                        "Worker {} failed on simulation {}: {}",
                        spec.worker, spec.simulation_index, e
                    );
                    WorkerStatus::Failed(e.to_string())
                }
                Err(e) if e.is_cancelled() => WorkerStatus::Terminated,
                Err(e) => {
                    error!("Worker {} panicked: {}", spec.worker, e);
                    WorkerStatus::Failed(format!("worker task panicked: {e}"))
                }
            };

            if matches!(status, WorkerStatus::Failed(_))
                && self.policy == SupervisionPolicy::FailFast
                && !aborted
            {
                error!("Worker failed. Terminating all other running workers.");
                for handle in &abort_handles {
                    handle.abort();
                }
                aborted = true;
            }

            outcomes.push(WorkerOutcome { spec, status });
        }

        outcomes.sort_by_key(|o| o.spec.worker);
        let report = BatchReport {
            batch_number: batch.batch_number,
            outcomes,
        };

        let failed = report
            .outcomes
            .iter()
            .filter(|o| matches!(o.status, WorkerStatus::Failed(_)))
            .count();
        if failed == 0 {
            return Ok(report);
        }

        match self.policy {
            SupervisionPolicy::FailFast => Err(PipelineError::BatchFailed {
                batch_number: batch.batch_number,
                failed,
                total: report.outcomes.len(),
            }),
            SupervisionPolicy::BestEffort => {
                warn!(
                    "{} of {} workers failed in batch {}; continuing with the rest",
                    failed,
                    report.outcomes.len(),
                    batch.batch_number
                );
                Ok(report)
            }
        }
    }
}
