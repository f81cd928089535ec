//! Durable delayed task queue trait.

use std::time::Duration;

use chrono::{DateTime, Utc};
use leadflow_types::error::RepositoryError;
use leadflow_types::task::ScheduledTask;
use serde_json::Value;
use uuid::Uuid;

/// At-least-once delayed task dispatch.
///
/// A claimed task is leased: it stays invisible until `complete`, `release`
/// or lease expiry, after which it is handed out again.
pub trait TaskQueue: Send + Sync {
    /// Enqueue a task that becomes due at `not_before`. Returns the task id.
    fn schedule(
        &self,
        task_type: &str,
        payload: &Value,
        not_before: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Uuid, RepositoryError>> + Send;

    /// Lease up to `limit` tasks due at `now`, oldest `run_at` first.
    fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
        lease: Duration,
    ) -> impl std::future::Future<Output = Result<Vec<ScheduledTask>, RepositoryError>> + Send;

    /// Remove a finished task.
    fn complete(
        &self,
        task_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Drop the lease, record `error` and make the task due again at `retry_at`.
    fn release(
        &self,
        task_id: &Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Number of tasks still queued (leased or not).
    fn pending_count(
        &self,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
