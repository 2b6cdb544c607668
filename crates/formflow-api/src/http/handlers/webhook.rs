//! Webhook registry handlers for the REST API.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use uuid::Uuid;

use formflow_types::execution::InvocationResult;
use formflow_types::webhook::{CreateWebhookRequest, UpdateWebhookRequest, Webhook};

use crate::http::error::AppError;
use crate::http::extractors::origin::Origin;
use crate::http::extractors::payload::JsonPayload;
use crate::http::extractors::query::WebhookListQuery;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// GET /api/v1/webhooks - List webhooks, optionally only active ones.
pub async fn list_webhooks(
    State(state): State<AppState>,
    Query(query): Query<WebhookListQuery>,
) -> Result<Json<ApiResponse<Vec<Webhook>>>, AppError> {
    let timer = RequestTimer::start();

    let webhooks = state.webhook_service.list_webhooks(query.active).await?;

    Ok(Json(timer.respond(webhooks).with_link("self", "/api/v1/webhooks")))
}

/// POST /api/v1/webhooks - Register a new webhook.
pub async fn create_webhook(
    State(state): State<AppState>,
    Json(body): Json<CreateWebhookRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Webhook>>), AppError> {
    let timer = RequestTimer::start();

    let webhook = state.webhook_service.create_webhook(body).await?;
    let self_link = format!("/api/v1/webhooks/{}", webhook.id);
    let test_link = format!("/api/v1/webhooks/{}/test", webhook.id);

    let resp = timer
        .respond(webhook)
        .with_link("self", &self_link)
        .with_link("test", &test_link);
    Ok((StatusCode::CREATED, Json(resp)))
}

/// GET /api/v1/webhooks/:id - Get a webhook.
pub async fn get_webhook(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Webhook>>, AppError> {
    let timer = RequestTimer::start();

    let webhook = state.webhook_service.get_webhook(&id).await?;

    Ok(Json(
        timer
            .respond(webhook)
            .with_link("self", &format!("/api/v1/webhooks/{id}"))
            .with_link("test", &format!("/api/v1/webhooks/{id}/test")),
    ))
}

/// PUT /api/v1/webhooks/:id - Partially update a webhook.
pub async fn update_webhook(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateWebhookRequest>,
) -> Result<Json<ApiResponse<Webhook>>, AppError> {
    let timer = RequestTimer::start();

    let webhook = state.webhook_service.update_webhook(&id, body).await?;

    Ok(Json(timer.respond(webhook).with_link("self", &format!("/api/v1/webhooks/{id}"))))
}

/// DELETE /api/v1/webhooks/:id - Delete a webhook no step references.
pub async fn delete_webhook(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let timer = RequestTimer::start();

    state.webhook_service.delete_webhook(&id).await?;

    Ok(Json(timer.respond(serde_json::json!({"deleted": true, "id": id}))))
}

/// POST /api/v1/webhooks/:id/test - Send one ad-hoc request to a webhook.
///
/// The request body is the payload (rendered through the webhook's template
/// if it has one). Nothing is written to the execution history.
pub async fn test_webhook(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Origin(origin): Origin,
    JsonPayload(payload): JsonPayload,
) -> Result<Json<ApiResponse<InvocationResult>>, AppError> {
    let timer = RequestTimer::start();

    // 404 before any network traffic
    state.webhook_service.get_webhook(&id).await?;

    let result = state.engine.test_webhook(id, payload, origin).await;

    Ok(Json(timer.respond(result).with_link("webhook", &format!("/api/v1/webhooks/{id}"))))
}
