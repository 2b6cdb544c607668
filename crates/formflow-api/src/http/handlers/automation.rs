//! Automation definition and trigger handlers for the REST API.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use uuid::Uuid;

use formflow_core::automation::engine::EngineError;
use formflow_core::repository::execution::ExecutionRepository;
use formflow_types::automation::{
    AutomationWithSteps, CreateAutomationRequest, UpdateAutomationRequest,
};
use formflow_types::execution::{AutomationExecution, AutomationStepExecution, ExecutionResult};

use crate::http::error::{AppError, engine_parts};
use crate::http::extractors::origin::Origin;
use crate::http::extractors::payload::JsonPayload;
use crate::http::extractors::query::ExecutionListQuery;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// GET /api/v1/automations - List automations with their steps.
pub async fn list_automations(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<AutomationWithSteps>>>, AppError> {
    let timer = RequestTimer::start();

    let automations = state.automation_service.list_automations().await?;

    Ok(Json(timer.respond(automations).with_link("self", "/api/v1/automations")))
}

/// POST /api/v1/automations - Create an automation and its steps.
pub async fn create_automation(
    State(state): State<AppState>,
    Json(body): Json<CreateAutomationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AutomationWithSteps>>), AppError> {
    let timer = RequestTimer::start();

    let automation = state.automation_service.create_automation(body).await?;
    let id = automation.automation.id;

    let resp = timer
        .respond(automation)
        .with_link("self", &format!("/api/v1/automations/{id}"))
        .with_link("execute", &format!("/api/v1/automations/{id}/execute"));
    Ok((StatusCode::CREATED, Json(resp)))
}

/// GET /api/v1/automations/:id - Get an automation with its steps.
pub async fn get_automation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AutomationWithSteps>>, AppError> {
    let timer = RequestTimer::start();

    let automation = state.automation_service.get_automation(&id).await?;

    Ok(Json(
        timer
            .respond(automation)
            .with_link("self", &format!("/api/v1/automations/{id}"))
            .with_link("execute", &format!("/api/v1/automations/{id}/execute"))
            .with_link("executions", &format!("/api/v1/automations/{id}/executions")),
    ))
}

/// PUT /api/v1/automations/:id - Partially update an automation.
///
/// A `steps` array in the body replaces every existing step.
pub async fn update_automation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateAutomationRequest>,
) -> Result<Json<ApiResponse<AutomationWithSteps>>, AppError> {
    let timer = RequestTimer::start();

    let automation = state.automation_service.update_automation(&id, body).await?;

    Ok(Json(timer.respond(automation).with_link("self", &format!("/api/v1/automations/{id}"))))
}

/// DELETE /api/v1/automations/:id - Delete an automation. History is kept.
pub async fn delete_automation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let timer = RequestTimer::start();

    state.automation_service.delete_automation(&id).await?;

    Ok(Json(timer.respond(serde_json::json!({"deleted": true, "id": id}))))
}

/// POST /api/v1/automations/:id/execute - Run an automation and wait for it.
///
/// The request body is the trigger data. A run that finishes answers 200
/// with its result, even when a step failed. A run rejected before starting
/// answers with the configuration error and no data. A run that was cut
/// short (cancelled, or an unexpected error) is recorded as failed first,
/// then answers 409 or 500 with both its result and the error.
pub async fn execute_automation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Origin(origin): Origin,
    JsonPayload(trigger_data): JsonPayload,
) -> Result<(StatusCode, Json<ApiResponse<ExecutionResult>>), AppError> {
    let timer = RequestTimer::start();

    let (report, failure) = match state.engine.trigger(id, trigger_data, origin).await {
        Ok(report) => (report, None),
        Err(EngineError::Aborted { report, source }) => (*report, Some(engine_parts(&source))),
        Err(e) => return Err(e.into()),
    };
    let execution_id = report.execution_id;

    let mut resp = timer
        .respond(report.into_result())
        .with_link("execution", &format!("/api/v1/executions/{execution_id}"))
        .with_link("steps", &format!("/api/v1/executions/{execution_id}/steps"))
        .with_link("executions", &format!("/api/v1/automations/{id}/executions"));

    let status = match failure {
        Some((status, code, message)) => {
            resp = resp.with_error(code, &message);
            status
        }
        None => StatusCode::OK,
    };
    Ok((status, Json(resp)))
}

/// POST /api/v1/automations/:id/execute/async - Start a run in the background.
///
/// Answers 202 with the reserved execution id as soon as the run is spawned.
pub async fn execute_automation_async(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Origin(origin): Origin,
    JsonPayload(trigger_data): JsonPayload,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), AppError> {
    let timer = RequestTimer::start();

    // Reject unknown automations up front; the run itself re-checks.
    state.automation_service.get_automation(&id).await?;

    // The handle is dropped; the run continues on its own task.
    let (execution_id, _handle) = state.engine.spawn(id, trigger_data, origin);
    tracing::info!(automation_id = %id, execution_id = %execution_id, "automation run submitted");

    let resp = timer
        .respond(serde_json::json!({
            "executionId": execution_id,
            "automationId": id,
            "status": "submitted",
        }))
        .with_link("steps", &format!("/api/v1/executions/{execution_id}/steps"))
        .with_link("cancel", &format!("/api/v1/executions/{execution_id}/cancel"));
    Ok((StatusCode::ACCEPTED, Json(resp)))
}

/// GET /api/v1/automations/:id/executions - Execution history, newest first.
pub async fn list_executions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ExecutionListQuery>,
) -> Result<Json<ApiResponse<Vec<AutomationExecution>>>, AppError> {
    let timer = RequestTimer::start();

    let limit = query.limit.unwrap_or(state.config.engine.execution_list_limit);
    let executions = state.engine.executions().list_executions(&id, limit).await?;

    Ok(Json(
        timer
            .respond(executions)
            .with_link("automation", &format!("/api/v1/automations/{id}")),
    ))
}

/// GET /api/v1/automations/:id/step-executions - Step executions across all
/// runs of the automation, newest first.
pub async fn list_automation_step_executions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ExecutionListQuery>,
) -> Result<Json<ApiResponse<Vec<AutomationStepExecution>>>, AppError> {
    let timer = RequestTimer::start();

    let limit = query.limit.unwrap_or(state.config.engine.execution_list_limit);
    let steps = state
        .engine
        .executions()
        .list_step_executions_for_automation(&id, limit)
        .await?;

    Ok(Json(
        timer
            .respond(steps)
            .with_link("automation", &format!("/api/v1/automations/{id}"))
            .with_link("executions", &format!("/api/v1/automations/{id}/executions")),
    ))
}
