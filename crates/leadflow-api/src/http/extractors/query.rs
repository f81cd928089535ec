//! Query parameter extractors for list endpoints.

use serde::Deserialize;
use uuid::Uuid;

use leadflow_types::execution::{ExecutionFilter, ExecutionStatus};

use crate::http::error::AppError;

/// Upper bound on `limit` for execution listings.
const MAX_LIMIT: u32 = 200;

/// Query parameters for `GET /executions`.
#[derive(Debug, Deserialize, Default)]
pub struct ExecutionListQuery {
    /// Filter by flow.
    pub flow_id: Option<Uuid>,
    /// Filter by status (pending, running, completed, failed).
    pub status: Option<String>,
    /// Maximum results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
}

impl ExecutionListQuery {
    pub fn into_filter(self) -> Result<ExecutionFilter, AppError> {
        let status = self
            .status
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<ExecutionStatus>())
            .transpose()
            .map_err(AppError::Validation)?;

        let defaults = ExecutionFilter::default();
        Ok(ExecutionFilter {
            flow_id: self.flow_id,
            status,
            limit: self.limit.unwrap_or(defaults.limit).clamp(1, MAX_LIMIT),
            offset: self.offset.unwrap_or(defaults.offset),
        })
    }
}

/// Query parameters for `GET /executions/stats`.
#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default = "default_days")]
    pub days: u32,
}

fn default_days() -> u32 {
    7
}
