//! System event log handler.

use axum::Json;
use axum::extract::{Query, State};

use formflow_types::event::{EventFilter, SystemEvent};

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// Upper bound on `limit` for one page of events.
const MAX_PAGE_SIZE: u32 = 500;

/// GET /api/v1/events - Query the audit log, newest first.
///
/// Filters: `type`, `category`, `from`, `to` (RFC 3339), `search`,
/// `user_id`, `session_id`; pagination via `limit` and `offset`.
pub async fn list_events(
    State(state): State<AppState>,
    Query(mut filter): Query<EventFilter>,
) -> Result<Json<ApiResponse<Vec<SystemEvent>>>, AppError> {
    let timer = RequestTimer::start();

    if let (Some(from), Some(to)) = (&filter.from, &filter.to) {
        if from > to {
            return Err(AppError::Validation("'from' must not be after 'to'".to_string()));
        }
    }
    filter.limit = filter.limit.min(MAX_PAGE_SIZE);

    let events = state.events.list_events(&filter).await?;

    Ok(Json(timer.respond(events).with_link("self", "/api/v1/events")))
}
