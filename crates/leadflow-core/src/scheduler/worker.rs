//! Polling worker that delivers due resumption tasks to the runner.
//!
//! Each tick claims a batch of due tasks under a lease, hands `resume_flow`
//! payloads to `FlowRunner::resume`, and then completes or releases each task.
//! A task whose handler crashes mid-flight is handed out again once its lease
//! expires, so delivery is at-least-once.
//!
//! A released task is due again after an exponential backoff. Once it has
//! been claimed `max_attempts` times it is dropped and its execution failed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use leadflow_types::config::WorkerConfig;
use leadflow_types::error::RepositoryError;
use leadflow_types::task::{RESUME_FLOW_TASK, ScheduledTask};
use tokio_util::sync::CancellationToken;

use crate::engine::runner::{FlowRunner, ResumeOutcome};
use crate::repository::execution::ExecutionRepository;
use crate::repository::flow::FlowRepository;

use super::queue::TaskQueue;

/// Upper bound on the delay before a released task is due again.
const MAX_BACKOFF: Duration = Duration::from_secs(3600);

/// Poll cadence, batch shape and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    pub poll_interval: Duration,
    pub batch_size: u32,
    pub lease: Duration,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from_config(&WorkerConfig::default())
    }
}

impl WorkerSettings {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            batch_size: config.batch_size.max(1),
            lease: Duration::from_secs(config.lease_secs.max(1)),
            max_attempts: config.max_attempts.max(1),
            retry_backoff: Duration::from_secs(config.retry_backoff_secs),
        }
    }

    /// Delay before a task released after its `attempts`-th claim is due again.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let doublings = attempts.saturating_sub(1).min(16);
        self.retry_backoff
            .saturating_mul(1 << doublings)
            .min(MAX_BACKOFF)
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub claimed: usize,
    pub resumed: usize,
    pub discarded: usize,
    /// Tasks released back to the queue after an engine error.
    pub released: usize,
    /// Tasks dropped after exhausting their attempts.
    pub dropped: usize,
}

enum Handled {
    Resumed,
    Discarded,
    Released,
    Dropped,
}

pub struct ResumeWorker<F, E, Q>
where
    F: FlowRepository,
    E: ExecutionRepository,
    Q: TaskQueue,
{
    runner: Arc<FlowRunner<F, E, Q>>,
    settings: WorkerSettings,
}

impl<F, E, Q> ResumeWorker<F, E, Q>
where
    F: FlowRepository,
    E: ExecutionRepository,
    Q: TaskQueue,
{
    pub fn new(runner: Arc<FlowRunner<F, E, Q>>, settings: WorkerSettings) -> Self {
        Self { runner, settings }
    }

    pub fn settings(&self) -> WorkerSettings {
        self.settings
    }

    /// Claim and process one batch of due tasks.
    pub async fn tick(&self) -> Result<TickSummary, RepositoryError> {
        let tasks = self
            .runner
            .queue()
            .claim_due(Utc::now(), self.settings.batch_size, self.settings.lease)
            .await?;

        let mut summary = TickSummary {
            claimed: tasks.len(),
            ..TickSummary::default()
        };

        for task in &tasks {
            match self.handle(task).await {
                Handled::Resumed => summary.resumed += 1,
                Handled::Discarded => summary.discarded += 1,
                Handled::Released => summary.released += 1,
                Handled::Dropped => summary.dropped += 1,
            }
        }

        if summary.claimed > 0 {
            tracing::info!(
                claimed = summary.claimed,
                resumed = summary.resumed,
                discarded = summary.discarded,
                released = summary.released,
                dropped = summary.dropped,
                "processed due tasks"
            );
        }
        Ok(summary)
    }

    /// Tick until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            batch_size = self.settings.batch_size,
            "resume worker started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "failed to claim due tasks");
                    }
                }
            }
        }

        tracing::info!("resume worker stopped");
    }

    async fn handle(&self, task: &ScheduledTask) -> Handled {
        if task.task_type != RESUME_FLOW_TASK {
            tracing::warn!(task_id = %task.id, task_type = task.task_type.as_str(), "dropping task of unknown type");
            self.complete(task).await;
            return Handled::Discarded;
        }

        let payload = match task.resume_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(task_id = %task.id, error = %e, "dropping task with malformed payload");
                self.complete(task).await;
                return Handled::Discarded;
            }
        };

        match self.runner.resume(&payload).await {
            Ok(ResumeOutcome::Resumed(report)) => {
                tracing::debug!(
                    task_id = %task.id,
                    execution_id = %report.execution_id,
                    status = %report.status,
                    "resumption finished"
                );
                self.complete(task).await;
                Handled::Resumed
            }
            Ok(ResumeOutcome::Discarded(reason)) => {
                tracing::info!(task_id = %task.id, reason = reason.as_str(), "discarded resumption");
                self.complete(task).await;
                Handled::Discarded
            }
            Err(e) => {
                let error = e.to_string();
                if task.attempts >= self.settings.max_attempts {
                    tracing::error!(
                        task_id = %task.id,
                        attempts = task.attempts,
                        error = error.as_str(),
                        "resumption failed too often; dropping task"
                    );
                    let reason = format!("Resumption failed after {} attempts: {error}", task.attempts);
                    if let Err(abandon_err) = self.runner.abandon(&payload, &reason).await {
                        tracing::error!(task_id = %task.id, error = %abandon_err, "failed to record abandoned execution");
                    }
                    self.complete(task).await;
                    return Handled::Dropped;
                }

                let backoff = self.settings.backoff(task.attempts);
                let retry_at = Utc::now()
                    + chrono::Duration::from_std(backoff).unwrap_or(chrono::Duration::zero());
                tracing::error!(
                    task_id = %task.id,
                    attempts = task.attempts,
                    retry_in_secs = backoff.as_secs(),
                    error = error.as_str(),
                    "resumption failed; releasing task"
                );
                if let Err(release_err) = self.runner.queue().release(&task.id, &error, retry_at).await {
                    tracing::error!(task_id = %task.id, error = %release_err, "failed to release task");
                }
                Handled::Released
            }
        }
    }

    async fn complete(&self, task: &ScheduledTask) {
        if let Err(e) = self.runner.queue().complete(&task.id).await {
            // The lease expires and the task is handed out again.
            tracing::error!(task_id = %task.id, error = %e, "failed to complete task");
        }
    }
}
