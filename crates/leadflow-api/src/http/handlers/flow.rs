//! Flow definition handlers for the REST API.

use axum::Json;
use axum::extract::{Path, State};
use serde_json::Value;
use uuid::Uuid;

use leadflow_core::engine::RunReport;
use leadflow_types::contact::{Contact, ContactSubmission};
use leadflow_types::flow::Flow;

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// GET /api/v1/flows - List flow definitions.
pub async fn list_flows(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Flow>>>, AppError> {
    let timer = RequestTimer::start();
    let flows = state.flow_service.list().await?;
    Ok(Json(timer.respond(flows).with_link("self", "/api/v1/flows")))
}

/// POST /api/v1/flows - Validate and save a flow (create or replace by id).
pub async fn save_flow(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<ApiResponse<Flow>>, AppError> {
    let timer = RequestTimer::start();
    let flow: Flow = serde_json::from_value(body)
        .map_err(|e| AppError::Validation(format!("invalid flow document: {e}")))?;

    let flow = state.flow_service.save(flow).await?;
    let id = flow.id;
    Ok(Json(
        timer
            .respond(flow)
            .with_link("self", &format!("/api/v1/flows/{id}"))
            .with_link("run", &format!("/api/v1/flows/{id}/run")),
    ))
}

/// GET /api/v1/flows/{id} - Get a flow with its nodes and edges.
pub async fn get_flow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Flow>>, AppError> {
    let timer = RequestTimer::start();
    let flow = state.flow_service.get(&id).await?;
    Ok(Json(
        timer
            .respond(flow)
            .with_link("self", &format!("/api/v1/flows/{id}"))
            .with_link("executions", &format!("/api/v1/executions?flow_id={id}")),
    ))
}

/// DELETE /api/v1/flows/{id} - Delete a flow definition.
pub async fn delete_flow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let timer = RequestTimer::start();
    state.flow_service.delete(&id).await?;
    Ok(Json(timer.respond(serde_json::json!({ "deleted": id }))))
}

/// POST /api/v1/flows/{id}/run - Run a flow for a transient contact.
pub async fn run_flow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ContactSubmission>,
) -> Result<Json<ApiResponse<RunReport>>, AppError> {
    let timer = RequestTimer::start();
    let contact = Contact::transient(body.name, body.email, body.phone);
    let report = state.runner.run_flow(id, &contact).await?;
    let execution_id = report.execution_id;
    Ok(Json(
        timer
            .respond(report)
            .with_link("execution", &format!("/api/v1/executions/{execution_id}"))
            .with_link("steps", &format!("/api/v1/executions/{execution_id}/steps")),
    ))
}
