//! Durable execution/step checkpoints.
//!
//! Wraps `ExecutionRepository` with the transitions the runner needs. Every
//! transition is persisted before the runner moves on, so a resumption in
//! another process sees exactly what this one did.

use chrono::Utc;
use leadflow_types::execution::{ExecutionStatus, ExecutionStep, StepInput, StepStatus};
use leadflow_types::flow::Node;
use serde_json::Value;
use uuid::Uuid;

use crate::repository::execution::ExecutionRepository;

use super::label::step_label;

// ---------------------------------------------------------------------------
// ExecutionRecorder
// ---------------------------------------------------------------------------

/// Records step and execution state transitions.
///
/// Generic over `R: ExecutionRepository` so it works with any storage
/// backend (SQLite, in-memory mock, etc.).
pub struct ExecutionRecorder<R: ExecutionRepository> {
    repo: R,
}

impl<R: ExecutionRepository> ExecutionRecorder<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Access the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    // -----------------------------------------------------------------------
    // Step-level checkpoints
    // -----------------------------------------------------------------------

    /// Checkpoint a step as starting (pending -> running).
    ///
    /// A `pending` step left on this node by a retry reset is reused, so the
    /// execution keeps one step per node visit.
    pub async fn start_step(&self, execution_id: Uuid, node: &Node) -> Result<Uuid, RecorderError> {
        let input = StepInput {
            node_type: node.node_type.clone(),
            node_subtype: node.subtype.clone(),
            node_label: step_label(node),
        };
        let now = Utc::now();

        let existing = self
            .repo
            .find_pending_step(&execution_id, &node.id)
            .await
            .map_err(|e| RecorderError::Repository(e.to_string()))?;

        let step = match existing {
            Some(mut step) => {
                step.status = StepStatus::Running;
                step.input = Some(input);
                step.output = None;
                step.error = None;
                step.started_at = Some(now);
                step.completed_at = None;
                step
            }
            None => ExecutionStep {
                id: Uuid::now_v7(),
                execution_id,
                node_id: node.id,
                status: StepStatus::Running,
                input: Some(input),
                output: None,
                error: None,
                started_at: Some(now),
                completed_at: None,
                created_at: now,
            },
        };

        self.repo
            .save_step(&step)
            .await
            .map_err(|e| RecorderError::Repository(e.to_string()))?;

        tracing::debug!(
            execution_id = %execution_id,
            node_id = %node.id,
            step_id = %step.id,
            "checkpointed step start"
        );

        Ok(step.id)
    }

    /// Checkpoint a step as completed.
    pub async fn complete_step(&self, step_id: Uuid, output: &Value) -> Result<(), RecorderError> {
        self.set_step(step_id, StepStatus::Completed, Some(output), None)
            .await?;
        tracing::debug!(step_id = %step_id, "checkpointed step complete");
        Ok(())
    }

    /// Checkpoint a step as skipped; `reason` goes in the step's error column.
    pub async fn skip_step(
        &self,
        step_id: Uuid,
        reason: &str,
        output: &Value,
    ) -> Result<(), RecorderError> {
        self.set_step(step_id, StepStatus::Skipped, Some(output), Some(reason))
            .await?;
        tracing::debug!(step_id = %step_id, reason, "checkpointed step skipped");
        Ok(())
    }

    /// Checkpoint a step as failed.
    pub async fn fail_step(&self, step_id: Uuid, error: &str) -> Result<(), RecorderError> {
        self.set_step(step_id, StepStatus::Failed, None, Some(error))
            .await?;
        tracing::debug!(step_id = %step_id, error, "checkpointed step failed");
        Ok(())
    }

    /// Record a wait step's scheduling output. The step stays `running`
    /// until its resumption completes it.
    pub async fn suspend_step(&self, step_id: Uuid, output: &Value) -> Result<(), RecorderError> {
        self.set_step(step_id, StepStatus::Running, Some(output), None)
            .await?;
        tracing::debug!(step_id = %step_id, "checkpointed step suspended");
        Ok(())
    }

    /// Number of steps of the execution still `running`.
    pub async fn running_steps(&self, execution_id: Uuid) -> Result<u64, RecorderError> {
        self.repo
            .count_running_steps(&execution_id)
            .await
            .map_err(|e| RecorderError::Repository(e.to_string()))
    }

    /// Fail every step of the execution that is still `running`, keeping
    /// its output. Returns how many steps were closed.
    pub async fn close_running_steps(
        &self,
        execution_id: Uuid,
        reason: &str,
    ) -> Result<usize, RecorderError> {
        let steps = self
            .repo
            .list_steps(&execution_id)
            .await
            .map_err(|e| RecorderError::Repository(e.to_string()))?;

        let mut closed = 0;
        for step in steps.iter().filter(|s| s.status == StepStatus::Running) {
            self.set_step(step.id, StepStatus::Failed, None, Some(reason))
                .await?;
            closed += 1;
        }
        if closed > 0 {
            tracing::debug!(execution_id = %execution_id, closed, "closed running steps");
        }
        Ok(closed)
    }

    async fn set_step(
        &self,
        step_id: Uuid,
        status: StepStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> Result<(), RecorderError> {
        self.repo
            .update_step_status(&step_id, status, output, error)
            .await
            .map_err(|e| RecorderError::Repository(e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Execution-level checkpoints
    // -----------------------------------------------------------------------

    /// Mark the execution running and store the context snapshot.
    pub async fn execution_running(
        &self,
        execution_id: Uuid,
        context: &Value,
    ) -> Result<(), RecorderError> {
        self.set_execution(execution_id, ExecutionStatus::Running, None, None, context)
            .await
    }

    pub async fn complete_execution(
        &self,
        execution_id: Uuid,
        result: &Value,
        context: &Value,
    ) -> Result<(), RecorderError> {
        self.set_execution(
            execution_id,
            ExecutionStatus::Completed,
            None,
            Some(result),
            context,
        )
        .await
    }

    pub async fn fail_execution(
        &self,
        execution_id: Uuid,
        error: &str,
        context: &Value,
    ) -> Result<(), RecorderError> {
        self.set_execution(
            execution_id,
            ExecutionStatus::Failed,
            Some(error),
            None,
            context,
        )
        .await
    }

    /// Check the resumed node off its wait step and mark the execution
    /// running, in one transaction. The wait step stays `running` until its
    /// last scheduled node resumes.
    pub async fn begin_resumption(
        &self,
        execution_id: Uuid,
        wait_step_id: Uuid,
        resumed_node_id: Uuid,
        wait_output: &Value,
    ) -> Result<bool, RecorderError> {
        let completed = self
            .repo
            .begin_resumption(&execution_id, &wait_step_id, &resumed_node_id, wait_output)
            .await
            .map_err(|e| RecorderError::Repository(e.to_string()))?;

        tracing::debug!(
            execution_id = %execution_id,
            wait_step_id = %wait_step_id,
            resumed_node_id = %resumed_node_id,
            completed,
            "checkpointed resumption"
        );
        Ok(completed)
    }

    async fn set_execution(
        &self,
        execution_id: Uuid,
        status: ExecutionStatus,
        error: Option<&str>,
        result: Option<&Value>,
        context: &Value,
    ) -> Result<(), RecorderError> {
        self.repo
            .update_execution_status(&execution_id, status, error, result, Some(context))
            .await
            .map_err(|e| RecorderError::Repository(e.to_string()))?;

        tracing::debug!(
            execution_id = %execution_id,
            status = %status,
            "checkpointed execution status"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while recording checkpoints.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    /// Underlying repository operation failed.
    #[error("checkpoint repository error: {0}")]
    Repository(String),
}
