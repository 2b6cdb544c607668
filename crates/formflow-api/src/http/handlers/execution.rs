//! Execution inspection and cancellation handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use uuid::Uuid;

use formflow_core::repository::execution::ExecutionRepository;
use formflow_types::execution::{AutomationExecution, AutomationStepExecution};

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

async fn find_execution(state: &AppState, id: &Uuid) -> Result<AutomationExecution, AppError> {
    state
        .engine
        .executions()
        .get_execution(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("execution {id} not found")))
}

/// GET /api/v1/executions/:id - Get one execution record.
pub async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AutomationExecution>>, AppError> {
    let timer = RequestTimer::start();

    let execution = find_execution(&state, &id).await?;
    let automation_link = format!("/api/v1/automations/{}", execution.automation_id);

    Ok(Json(
        timer
            .respond(execution)
            .with_link("steps", &format!("/api/v1/executions/{id}/steps"))
            .with_link("automation", &automation_link),
    ))
}

/// GET /api/v1/executions/:id/steps - Step outcomes of one run, in order.
pub async fn list_step_executions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<AutomationStepExecution>>>, AppError> {
    let timer = RequestTimer::start();

    find_execution(&state, &id).await?;
    let steps = state.engine.executions().list_step_executions(&id).await?;

    Ok(Json(timer.respond(steps).with_link("execution", &format!("/api/v1/executions/{id}"))))
}

/// POST /api/v1/executions/:id/cancel - Cancel a running execution.
///
/// Cancellation takes effect at the next step boundary or sleep; an
/// in-flight webhook call is allowed to finish.
pub async fn cancel_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), AppError> {
    let timer = RequestTimer::start();

    if !state.engine.cancel(id) {
        let execution = find_execution(&state, &id).await?;
        return Err(AppError::Conflict(format!(
            "execution {id} is not running (status: {})",
            execution.status
        )));
    }

    let resp = timer
        .respond(serde_json::json!({"executionId": id, "cancelRequested": true}))
        .with_link("execution", &format!("/api/v1/executions/{id}"));
    Ok((StatusCode::ACCEPTED, Json(resp)))
}
