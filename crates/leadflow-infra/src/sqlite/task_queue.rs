//! SQLite-backed durable task queue.
//!
//! Tasks survive restarts. `claim_due` leases rows in a single
//! `UPDATE ... RETURNING` statement so two workers sharing a database never
//! receive the same task while its lease is live.

use std::time::Duration;

use chrono::{DateTime, Utc};
use leadflow_core::scheduler::queue::TaskQueue;
use leadflow_types::error::RepositoryError;
use leadflow_types::task::ScheduledTask;
use serde_json::Value;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, from_json, parse_datetime, parse_uuid, query_err, to_json};

/// SQLite implementation of `TaskQueue`.
#[derive(Clone)]
pub struct SqliteTaskQueue {
    pool: DatabasePool,
}

impl SqliteTaskQueue {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct TaskRow {
    id: String,
    task_type: String,
    payload: String,
    run_at: String,
    attempts: i64,
    locked_until: Option<String>,
    last_error: Option<String>,
    created_at: String,
}

impl TaskRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            task_type: row.try_get("task_type")?,
            payload: row.try_get("payload")?,
            run_at: row.try_get("run_at")?,
            attempts: row.try_get("attempts")?,
            locked_until: row.try_get("locked_until")?,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_task(self) -> Result<ScheduledTask, RepositoryError> {
        Ok(ScheduledTask {
            id: parse_uuid(&self.id)?,
            task_type: self.task_type,
            payload: from_json("payload", &self.payload)?,
            run_at: parse_datetime(&self.run_at)?,
            attempts: u32::try_from(self.attempts).unwrap_or(u32::MAX),
            locked_until: self.locked_until.as_deref().map(parse_datetime).transpose()?,
            last_error: self.last_error,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

impl TaskQueue for SqliteTaskQueue {
    async fn schedule(
        &self,
        task_type: &str,
        payload: &Value,
        not_before: DateTime<Utc>,
    ) -> Result<Uuid, RepositoryError> {
        let task = ScheduledTask::new(task_type, payload.clone(), not_before);

        sqlx::query(
            r#"INSERT INTO scheduled_tasks (id, task_type, payload, run_at, attempts, created_at)
               VALUES (?, ?, ?, ?, 0, ?)"#,
        )
        .bind(task.id.to_string())
        .bind(&task.task_type)
        .bind(to_json(&task.payload)?)
        .bind(format_datetime(&task.run_at))
        .bind(format_datetime(&task.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        tracing::debug!(task_id = %task.id, task_type, run_at = %task.run_at, "scheduled task");
        Ok(task.id)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
        lease: Duration,
    ) -> Result<Vec<ScheduledTask>, RepositoryError> {
        let lease = chrono::Duration::from_std(lease).map_err(|e| RepositoryError::Query(e.to_string()))?;
        let now_str = format_datetime(&now);

        let rows = sqlx::query(
            r#"UPDATE scheduled_tasks SET
                 locked_until = ?,
                 attempts = attempts + 1
               WHERE id IN (
                 SELECT id FROM scheduled_tasks
                 WHERE run_at <= ?
                   AND (locked_until IS NULL OR locked_until <= ?)
                 ORDER BY run_at ASC
                 LIMIT ?
               )
               RETURNING *"#,
        )
        .bind(format_datetime(&(now + lease)))
        .bind(&now_str)
        .bind(&now_str)
        .bind(i64::from(limit))
        .fetch_all(&self.pool.writer)
        .await
        .map_err(query_err)?;

        let mut tasks = rows
            .iter()
            .map(|row| TaskRow::from_row(row).map_err(query_err)?.into_task())
            .collect::<Result<Vec<_>, _>>()?;
        // RETURNING order is unspecified.
        tasks.sort_by_key(|t| t.run_at);
        Ok(tasks)
    }

    async fn complete(&self, task_id: &Uuid) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM scheduled_tasks WHERE id = ?")
            .bind(task_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn release(
        &self,
        task_id: &Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE scheduled_tasks SET locked_until = NULL, last_error = ?, run_at = ? WHERE id = ?",
        )
        .bind(error)
        .bind(format_datetime(&retry_at))
        .bind(task_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn pending_count(&self) -> Result<u64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM scheduled_tasks")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(query_err)?;
        let n: i64 = row.try_get("n").map_err(query_err)?;
        Ok(u64::try_from(n).unwrap_or(0))
    }
}
