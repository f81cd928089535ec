//! Contact form submission handler.

use axum::Json;
use axum::extract::State;

use leadflow_core::service::contact::SubmitOutcome;
use leadflow_types::contact::ContactSubmission;

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// POST /api/v1/contacts - Store a contact and start the active form flow.
///
/// Field validation failures come back as 400 with one `details` entry per
/// rejected field.
pub async fn submit_contact(
    State(state): State<AppState>,
    Json(body): Json<ContactSubmission>,
) -> Result<Json<ApiResponse<SubmitOutcome>>, AppError> {
    let timer = RequestTimer::start();
    let outcome = state.contact_service.submit(&body).await?;

    let execution = outcome.run.as_ref().map(|r| r.execution_id);
    let mut resp = timer.respond(outcome);
    if let Some(id) = execution {
        resp = resp.with_link("execution", &format!("/api/v1/executions/{id}"));
    }
    Ok(Json(resp))
}
