//! SQLite storage layer.
//!
//! Repository and task queue implementations backed by SQLite with WAL mode
//! and split read/write connection pools.

pub mod contact;
pub mod execution;
pub mod flow;
pub mod pool;
pub mod task_queue;

use chrono::{DateTime, SecondsFormat, Utc};
use leadflow_types::error::RepositoryError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

pub use contact::SqliteContactRepository;
pub use execution::SqliteExecutionRepository;
pub use flow::SqliteFlowRepository;
pub use pool::DatabasePool;
pub use task_queue::SqliteTaskQueue;

// ---------------------------------------------------------------------------
// Column helpers shared by the repositories
// ---------------------------------------------------------------------------

pub(crate) fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width RFC 3339 so text comparison in SQL orders correctly.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Query(format!("serialize: {e}")))
}

pub(crate) fn from_json<T: DeserializeOwned>(column: &str, s: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(s).map_err(|e| RepositoryError::Query(format!("invalid {column} JSON: {e}")))
}

#[cfg(test)]
pub(crate) async fn test_pool() -> DatabasePool {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let url = format!("sqlite://{}?mode=rwc", db_path.display());
    std::mem::forget(dir);
    DatabasePool::new(&url).await.unwrap()
}
