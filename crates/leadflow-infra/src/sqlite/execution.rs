//! SQLite execution repository implementation.
//!
//! Implements `ExecutionRepository` for SQLite. Executions and steps live in
//! `flow_executions` and `execution_steps`. Steps are returned in insertion
//! order (`rowid`), which is the order traversal visited them.

use chrono::{DateTime, Days, NaiveDate, Utc};
use leadflow_core::repository::execution::ExecutionRepository;
use leadflow_types::error::RepositoryError;
use leadflow_types::execution::{
    DailyExecutionCount, ExecutionFilter, ExecutionStats, ExecutionStatus, ExecutionStep,
    FlowExecution, StepInput, StepStatus, check_off_resumption,
};
use serde_json::Value;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, from_json, parse_datetime, parse_uuid, query_err, to_json};

/// SQLite-backed implementation of `ExecutionRepository`.
#[derive(Clone)]
pub struct SqliteExecutionRepository {
    pool: DatabasePool,
}

impl SqliteExecutionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct ExecutionRow {
    id: String,
    flow_id: String,
    triggered_by: Option<String>,
    status: String,
    context: String,
    result: Option<String>,
    attempt: i64,
    started_at: Option<String>,
    completed_at: Option<String>,
    error: Option<String>,
    created_at: String,
}

impl ExecutionRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            flow_id: row.try_get("flow_id")?,
            triggered_by: row.try_get("triggered_by")?,
            status: row.try_get("status")?,
            context: row.try_get("context")?,
            result: row.try_get("result")?,
            attempt: row.try_get("attempt")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            error: row.try_get("error")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_execution(self) -> Result<FlowExecution, RepositoryError> {
        let status: ExecutionStatus = self.status.parse().map_err(RepositoryError::Query)?;

        Ok(FlowExecution {
            id: parse_uuid(&self.id)?,
            flow_id: parse_uuid(&self.flow_id)?,
            triggered_by: self.triggered_by.as_deref().map(parse_uuid).transpose()?,
            status,
            context: from_json("context", &self.context)?,
            result: self.result.as_deref().map(|s| from_json("result", s)).transpose()?,
            attempt: u32::try_from(self.attempt).unwrap_or(1),
            started_at: self.started_at.as_deref().map(parse_datetime).transpose()?,
            completed_at: self.completed_at.as_deref().map(parse_datetime).transpose()?,
            error: self.error,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

struct StepRow {
    id: String,
    execution_id: String,
    node_id: String,
    status: String,
    input: Option<String>,
    output: Option<String>,
    error: Option<String>,
    started_at: Option<String>,
    completed_at: Option<String>,
    created_at: String,
}

impl StepRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            execution_id: row.try_get("execution_id")?,
            node_id: row.try_get("node_id")?,
            status: row.try_get("status")?,
            input: row.try_get("input")?,
            output: row.try_get("output")?,
            error: row.try_get("error")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_step(self) -> Result<ExecutionStep, RepositoryError> {
        let status: StepStatus = self.status.parse().map_err(RepositoryError::Query)?;
        let input: Option<StepInput> = self
            .input
            .as_deref()
            .map(|s| from_json("step input", s))
            .transpose()?;

        Ok(ExecutionStep {
            id: parse_uuid(&self.id)?,
            execution_id: parse_uuid(&self.execution_id)?,
            node_id: parse_uuid(&self.node_id)?,
            status,
            input,
            output: self.output.as_deref().map(|s| from_json("step output", s)).transpose()?,
            error: self.error,
            started_at: self.started_at.as_deref().map(parse_datetime).transpose()?,
            completed_at: self.completed_at.as_deref().map(parse_datetime).transpose()?,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

fn optional_datetime(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.as_ref().map(format_datetime)
}

fn count_column(row: &SqliteRow, column: &str) -> Result<u64, RepositoryError> {
    let n: i64 = row.try_get(column).map_err(query_err)?;
    Ok(u64::try_from(n).unwrap_or(0))
}

// ---------------------------------------------------------------------------
// ExecutionRepository impl
// ---------------------------------------------------------------------------

impl ExecutionRepository for SqliteExecutionRepository {
    async fn create_execution(&self, execution: &FlowExecution) -> Result<(), RepositoryError> {
        let result = execution.result.as_ref().map(to_json).transpose()?;

        sqlx::query(
            r#"INSERT INTO flow_executions
               (id, flow_id, triggered_by, status, context, result, attempt,
                started_at, completed_at, error, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(execution.id.to_string())
        .bind(execution.flow_id.to_string())
        .bind(execution.triggered_by.map(|id| id.to_string()))
        .bind(execution.status.as_str())
        .bind(to_json(&execution.context)?)
        .bind(result)
        .bind(i64::from(execution.attempt))
        .bind(optional_datetime(execution.started_at))
        .bind(optional_datetime(execution.completed_at))
        .bind(&execution.error)
        .bind(format_datetime(&execution.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<FlowExecution>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM flow_executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => Ok(Some(
                ExecutionRow::from_row(&row).map_err(query_err)?.into_execution()?,
            )),
            None => Ok(None),
        }
    }

    async fn update_execution_status(
        &self,
        id: &Uuid,
        status: ExecutionStatus,
        error: Option<&str>,
        result: Option<&Value>,
        context: Option<&Value>,
    ) -> Result<(), RepositoryError> {
        let now = format_datetime(&Utc::now());
        let started_at = (status == ExecutionStatus::Running).then(|| now.clone());
        let completed_at = status.is_terminal().then(|| now.clone());

        let affected = sqlx::query(
            r#"UPDATE flow_executions SET
                 status = ?,
                 error = ?,
                 result = COALESCE(?, result),
                 context = COALESCE(?, context),
                 started_at = COALESCE(started_at, ?),
                 completed_at = COALESCE(?, completed_at)
               WHERE id = ?"#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(result.map(to_json).transpose()?)
        .bind(context.map(to_json).transpose()?)
        .bind(started_at)
        .bind(completed_at)
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?
        .rows_affected();

        if affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn reset_for_retry(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let reset = sqlx::query(
            r#"UPDATE flow_executions SET
                 status = 'pending',
                 error = NULL,
                 result = NULL,
                 started_at = NULL,
                 completed_at = NULL,
                 attempt = attempt + 1
               WHERE id = ? AND status = 'failed'"#,
        )
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(query_err)?
        .rows_affected();

        if reset == 0 {
            tx.rollback().await.map_err(query_err)?;
            return Ok(false);
        }

        sqlx::query(
            r#"UPDATE execution_steps SET
                 status = 'pending',
                 error = NULL,
                 completed_at = NULL
               WHERE execution_id = ?"#,
        )
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        tx.commit().await.map_err(query_err)?;
        Ok(true)
    }

    async fn begin_resumption(
        &self,
        execution_id: &Uuid,
        wait_step_id: &Uuid,
        resumed_node_id: &Uuid,
        wait_output: &Value,
    ) -> Result<bool, RepositoryError> {
        let now = format_datetime(&Utc::now());
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let suspended = sqlx::query(
            "SELECT output FROM execution_steps WHERE id = ? AND status = 'running'",
        )
        .bind(wait_step_id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(query_err)?;

        let mut completed = false;
        if let Some(row) = suspended {
            let current: Option<String> = row.try_get("output").map_err(query_err)?;
            let current: Option<Value> = current
                .as_deref()
                .map(|raw| from_json("output", raw))
                .transpose()?;
            let (output, done) =
                check_off_resumption(current.as_ref(), resumed_node_id, wait_output);
            let status = if done { StepStatus::Completed } else { StepStatus::Running };

            sqlx::query(
                r#"UPDATE execution_steps SET
                     status = ?,
                     output = ?,
                     error = NULL,
                     completed_at = ?
                   WHERE id = ?"#,
            )
            .bind(status.as_str())
            .bind(to_json(&output)?)
            .bind(done.then(|| now.clone()))
            .bind(wait_step_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
            completed = done;
        }

        sqlx::query(
            r#"UPDATE flow_executions SET
                 status = 'running',
                 started_at = COALESCE(started_at, ?)
               WHERE id = ?"#,
        )
        .bind(&now)
        .bind(execution_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        tx.commit().await.map_err(query_err)?;
        Ok(completed)
    }

    async fn list_executions(
        &self,
        filter: &ExecutionFilter,
    ) -> Result<Vec<FlowExecution>, RepositoryError> {
        let flow_id = filter.flow_id.map(|id| id.to_string());
        let status = filter.status.map(|s| s.as_str());

        let rows = sqlx::query(
            r#"SELECT * FROM flow_executions
               WHERE (? IS NULL OR flow_id = ?)
                 AND (? IS NULL OR status = ?)
               ORDER BY created_at DESC, id DESC
               LIMIT ? OFFSET ?"#,
        )
        .bind(&flow_id)
        .bind(&flow_id)
        .bind(status)
        .bind(status)
        .bind(i64::from(filter.limit))
        .bind(i64::from(filter.offset))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.iter()
            .map(|row| ExecutionRow::from_row(row).map_err(query_err)?.into_execution())
            .collect()
    }

    async fn execution_stats(&self, days: u32) -> Result<ExecutionStats, RepositoryError> {
        let totals = sqlx::query(
            r#"SELECT
                 COUNT(*) AS total,
                 COALESCE(SUM(status = 'completed'), 0) AS completed,
                 COALESCE(SUM(status = 'failed'), 0) AS failed,
                 COALESCE(SUM(status = 'pending'), 0) AS pending,
                 COALESCE(SUM(status = 'running'), 0) AS running
               FROM flow_executions"#,
        )
        .fetch_one(&self.pool.reader)
        .await
        .map_err(query_err)?;

        let today = Utc::now().date_naive();
        let first_day = today
            .checked_sub_days(Days::new(u64::from(days.saturating_sub(1))))
            .unwrap_or(today);

        let rows = sqlx::query(
            r#"SELECT
                 substr(created_at, 1, 10) AS day,
                 COUNT(*) AS total,
                 COALESCE(SUM(status = 'completed'), 0) AS completed,
                 COALESCE(SUM(status = 'failed'), 0) AS failed
               FROM flow_executions
               WHERE created_at >= ?
               GROUP BY day"#,
        )
        .bind(first_day.format("%Y-%m-%d").to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        let mut per_day = std::collections::HashMap::new();
        for row in &rows {
            let day: String = row.try_get("day").map_err(query_err)?;
            let date = NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                .map_err(|e| RepositoryError::Query(format!("invalid date: {e}")))?;
            per_day.insert(
                date,
                (
                    count_column(row, "total")?,
                    count_column(row, "completed")?,
                    count_column(row, "failed")?,
                ),
            );
        }

        let recent_executions = (0..days)
            .rev()
            .filter_map(|back| today.checked_sub_days(Days::new(u64::from(back))))
            .map(|date| {
                let (count, successful, failed) = per_day.get(&date).copied().unwrap_or_default();
                DailyExecutionCount {
                    date,
                    count,
                    successful,
                    failed,
                }
            })
            .collect();

        Ok(ExecutionStats {
            total_executions: count_column(&totals, "total")?,
            successful_executions: count_column(&totals, "completed")?,
            failed_executions: count_column(&totals, "failed")?,
            pending_executions: count_column(&totals, "pending")?,
            running_executions: count_column(&totals, "running")?,
            recent_executions,
        })
    }

    async fn save_step(&self, step: &ExecutionStep) -> Result<(), RepositoryError> {
        let input = step.input.as_ref().map(to_json).transpose()?;
        let output = step.output.as_ref().map(to_json).transpose()?;

        sqlx::query(
            r#"INSERT INTO execution_steps
               (id, execution_id, node_id, status, input, output, error,
                started_at, completed_at, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 node_id = excluded.node_id,
                 status = excluded.status,
                 input = excluded.input,
                 output = excluded.output,
                 error = excluded.error,
                 started_at = excluded.started_at,
                 completed_at = excluded.completed_at"#,
        )
        .bind(step.id.to_string())
        .bind(step.execution_id.to_string())
        .bind(step.node_id.to_string())
        .bind(step.status.as_str())
        .bind(input)
        .bind(output)
        .bind(&step.error)
        .bind(optional_datetime(step.started_at))
        .bind(optional_datetime(step.completed_at))
        .bind(format_datetime(&step.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn update_step_status(
        &self,
        id: &Uuid,
        status: StepStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let completed_at = status.is_terminal().then(|| format_datetime(&Utc::now()));

        let affected = sqlx::query(
            r#"UPDATE execution_steps SET
                 status = ?,
                 output = COALESCE(?, output),
                 error = ?,
                 completed_at = ?
               WHERE id = ?"#,
        )
        .bind(status.as_str())
        .bind(output.map(to_json).transpose()?)
        .bind(error)
        .bind(completed_at)
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?
        .rows_affected();

        if affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn get_step(&self, id: &Uuid) -> Result<Option<ExecutionStep>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM execution_steps WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => Ok(Some(StepRow::from_row(&row).map_err(query_err)?.into_step()?)),
            None => Ok(None),
        }
    }

    async fn find_pending_step(
        &self,
        execution_id: &Uuid,
        node_id: &Uuid,
    ) -> Result<Option<ExecutionStep>, RepositoryError> {
        let row = sqlx::query(
            r#"SELECT * FROM execution_steps
               WHERE execution_id = ? AND node_id = ? AND status = 'pending'
               ORDER BY rowid ASC
               LIMIT 1"#,
        )
        .bind(execution_id.to_string())
        .bind(node_id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_err)?;

        match row {
            Some(row) => Ok(Some(StepRow::from_row(&row).map_err(query_err)?.into_step()?)),
            None => Ok(None),
        }
    }

    async fn list_steps(&self, execution_id: &Uuid) -> Result<Vec<ExecutionStep>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM execution_steps WHERE execution_id = ? ORDER BY rowid ASC")
            .bind(execution_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        rows.iter()
            .map(|row| StepRow::from_row(row).map_err(query_err)?.into_step())
            .collect()
    }

    async fn count_running_steps(&self, execution_id: &Uuid) -> Result<u64, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM execution_steps WHERE execution_id = ? AND status = 'running'",
        )
        .bind(execution_id.to_string())
        .fetch_one(&self.pool.reader)
        .await
        .map_err(query_err)?;

        count_column(&row, "n")
    }
}
