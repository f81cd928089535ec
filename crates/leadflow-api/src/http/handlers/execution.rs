//! Execution monitoring and retry handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use uuid::Uuid;

use leadflow_core::engine::RunReport;
use leadflow_core::repository::execution::ExecutionRepository;
use leadflow_types::execution::{ExecutionStats, ExecutionStep, FlowExecution};

use crate::http::error::AppError;
use crate::http::extractors::query::{ExecutionListQuery, StatsQuery};
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// GET /api/v1/executions - List executions, newest first.
pub async fn list_executions(
    State(state): State<AppState>,
    Query(query): Query<ExecutionListQuery>,
) -> Result<Json<ApiResponse<Vec<FlowExecution>>>, AppError> {
    let timer = RequestTimer::start();
    let filter = query.into_filter()?;
    let executions = state.runner.executions().list_executions(&filter).await?;
    Ok(Json(timer.respond(executions).with_link("self", "/api/v1/executions")))
}

/// GET /api/v1/executions/stats - Counts per status and per day.
pub async fn execution_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<ApiResponse<ExecutionStats>>, AppError> {
    let timer = RequestTimer::start();
    let stats = state.runner.executions().execution_stats(query.days).await?;
    Ok(Json(timer.respond(stats)))
}

/// GET /api/v1/executions/{id} - One execution record.
pub async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<FlowExecution>>, AppError> {
    let timer = RequestTimer::start();
    let execution = state
        .runner
        .executions()
        .get_execution(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Execution not found: {id}")))?;
    Ok(Json(
        timer
            .respond(execution)
            .with_link("self", &format!("/api/v1/executions/{id}"))
            .with_link("steps", &format!("/api/v1/executions/{id}/steps")),
    ))
}

/// GET /api/v1/executions/{id}/steps - Steps in start order.
pub async fn list_steps(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<ExecutionStep>>>, AppError> {
    let timer = RequestTimer::start();
    let executions = state.runner.executions();
    if executions.get_execution(&id).await?.is_none() {
        return Err(AppError::NotFound(format!("Execution not found: {id}")));
    }
    let steps = executions.list_steps(&id).await?;
    Ok(Json(timer.respond(steps)))
}

/// POST /api/v1/executions/{id}/retry - Re-run a failed execution.
pub async fn retry_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<RunReport>>, AppError> {
    let timer = RequestTimer::start();
    let report = state.runner.retry(id).await?;
    Ok(Json(
        timer
            .respond(report)
            .with_link("execution", &format!("/api/v1/executions/{id}")),
    ))
}
