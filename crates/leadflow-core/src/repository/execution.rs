//! Execution repository trait definition.
//!
//! Defines the storage interface for flow executions and their steps. The
//! infrastructure layer (leadflow-infra) implements this trait with SQLite
//! persistence.

use leadflow_types::error::RepositoryError;
use leadflow_types::execution::{
    ExecutionFilter, ExecutionStats, ExecutionStatus, ExecutionStep, FlowExecution, StepStatus,
};
use serde_json::Value;
use uuid::Uuid;

/// Repository trait for execution persistence.
///
/// Covers two entity families:
/// - **Executions:** create/update/query one record per run.
/// - **Steps:** create/update/query one record per node visit.
///
/// Status transitions fully overwrite status, timestamps and payload, so
/// replaying one is harmless.
pub trait ExecutionRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    /// Create a new execution record.
    fn create_execution(
        &self,
        execution: &FlowExecution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get an execution by its UUID.
    fn get_execution(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<FlowExecution>, RepositoryError>> + Send;

    /// Update an execution's status and optionally its error, result and context.
    ///
    /// Moving to `running` sets `started_at` if it is unset. Moving to a
    /// terminal status sets `completed_at`.
    fn update_execution_status(
        &self,
        id: &Uuid,
        status: ExecutionStatus,
        error: Option<&str>,
        result: Option<&Value>,
        context: Option<&Value>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Atomically reset a `failed` execution for another attempt.
    ///
    /// Sets status `pending`, clears error/result/started_at/completed_at, increments
    /// `attempt`, and resets every step to `pending` with error and
    /// completed_at cleared. Returns `false` (and changes nothing) when the
    /// execution does not exist or is not `failed`.
    fn reset_for_retry(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Atomically check `resumed_node_id` off the wait step that scheduled a
    /// resumption (if it is still `running`) and mark the execution `running`.
    ///
    /// The wait step completes with `wait_output` only once every node in its
    /// `scheduled_node_ids` has resumed (see
    /// `leadflow_types::execution::check_off_resumption`). Returns `true` if
    /// the wait step was completed by this call.
    fn begin_resumption(
        &self,
        execution_id: &Uuid,
        wait_step_id: &Uuid,
        resumed_node_id: &Uuid,
        wait_output: &Value,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// List executions matching the filter, newest first.
    fn list_executions(
        &self,
        filter: &ExecutionFilter,
    ) -> impl std::future::Future<Output = Result<Vec<FlowExecution>, RepositoryError>> + Send;

    /// Counts per status plus per-day totals over the last `days` days.
    fn execution_stats(
        &self,
        days: u32,
    ) -> impl std::future::Future<Output = Result<ExecutionStats, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    /// Insert a step, or overwrite every column of an existing step with the same id.
    fn save_step(
        &self,
        step: &ExecutionStep,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Update a step's status, output and error.
    ///
    /// Terminal statuses set `completed_at`; `pending`/`running` clear it.
    fn update_step_status(
        &self,
        id: &Uuid,
        status: StepStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_step(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ExecutionStep>, RepositoryError>> + Send;

    /// The oldest `pending` step for a node within an execution, if any.
    fn find_pending_step(
        &self,
        execution_id: &Uuid,
        node_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ExecutionStep>, RepositoryError>> + Send;

    /// All steps of an execution in creation order.
    fn list_steps(
        &self,
        execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<ExecutionStep>, RepositoryError>> + Send;

    /// Number of steps of an execution currently `running`.
    fn count_running_steps(
        &self,
        execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
