//! Optional JSON body extractor.
//!
//! Trigger and test endpoints accept any JSON document as the payload. An
//! empty body means `{}`.

use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use serde_json::Value;

use crate::http::error::AppError;

/// Raw JSON payload of a trigger or test request.
pub struct JsonPayload(pub Value);

impl<S: Send + Sync> FromRequest<S> for JsonPayload {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::Validation(format!("failed to read body: {e}")))?;
        parse_payload(&body).map(JsonPayload)
    }
}

fn parse_payload(body: &[u8]) -> Result<Value, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(body).map_err(|e| AppError::Validation(format!("invalid JSON body: {e}")))
}
