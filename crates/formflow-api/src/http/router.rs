//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Webhook registry
        .route(
            "/webhooks",
            get(handlers::webhook::list_webhooks).post(handlers::webhook::create_webhook),
        )
        .route(
            "/webhooks/{id}",
            get(handlers::webhook::get_webhook)
                .put(handlers::webhook::update_webhook)
                .delete(handlers::webhook::delete_webhook),
        )
        .route("/webhooks/{id}/test", post(handlers::webhook::test_webhook))
        // Automation definitions
        .route(
            "/automations",
            get(handlers::automation::list_automations)
                .post(handlers::automation::create_automation),
        )
        .route(
            "/automations/{id}",
            get(handlers::automation::get_automation)
                .put(handlers::automation::update_automation)
                .delete(handlers::automation::delete_automation),
        )
        // Triggering
        .route(
            "/automations/{id}/execute",
            post(handlers::automation::execute_automation),
        )
        .route(
            "/automations/{id}/execute/async",
            post(handlers::automation::execute_automation_async),
        )
        // Execution history
        .route(
            "/automations/{id}/executions",
            get(handlers::automation::list_executions),
        )
        .route(
            "/automations/{id}/step-executions",
            get(handlers::automation::list_automation_step_executions),
        )
        .route("/executions/{id}", get(handlers::execution::get_execution))
        .route(
            "/executions/{id}/steps",
            get(handlers::execution::list_step_executions),
        )
        .route(
            "/executions/{id}/cancel",
            post(handlers::execution::cancel_execution),
        )
        // Audit log
        .route("/events", get(handlers::event::list_events));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
