//! Envelope response format for all API responses.
//!
//! Every response is wrapped in a consistent envelope:
//! ```json
//! {
//!   "data": { ... },
//!   "meta": { "request_id": "...", "timestamp": "...", "response_time_ms": 5 },
//!   "errors": [],
//!   "_links": { "self": "..." }
//! }
//! ```

use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;

/// Envelope response wrapping all API data.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// The main response payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    /// Request metadata.
    pub meta: ApiMeta,

    /// Error list (empty on success).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ApiErrorDetail>,

    /// HATEOAS-style links for discoverability.
    #[serde(rename = "_links", skip_serializing_if = "HashMap::is_empty")]
    pub links: HashMap<String, String>,
}

/// Metadata included in every response.
#[derive(Debug, Serialize)]
pub struct ApiMeta {
    /// Unique request identifier for tracing.
    pub request_id: String,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
    /// Response time in milliseconds.
    pub response_time_ms: u64,
}

impl ApiMeta {
    fn now(request_id: String, response_time_ms: u64) -> Self {
        Self {
            request_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
            response_time_ms,
        }
    }
}

/// Individual error detail.
#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// Request id and start time captured at the top of a handler.
pub struct RequestTimer {
    request_id: String,
    start: Instant,
}

impl RequestTimer {
    pub fn start() -> Self {
        Self {
            request_id: uuid::Uuid::now_v7().to_string(),
            start: Instant::now(),
        }
    }

    /// Wrap `data` in a success envelope stamped with this request's timing.
    pub fn respond<T: Serialize>(self, data: T) -> ApiResponse<T> {
        ApiResponse::success(data, self.request_id, self.start.elapsed().as_millis() as u64)
    }
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a success response with data.
    pub fn success(data: T, request_id: String, response_time_ms: u64) -> Self {
        Self {
            data: Some(data),
            meta: ApiMeta::now(request_id, response_time_ms),
            errors: Vec::new(),
            links: HashMap::new(),
        }
    }

    /// Attach an error to a response that still carries data.
    pub fn with_error(mut self, code: &str, message: &str) -> Self {
        self.errors.push(ApiErrorDetail {
            code: code.to_string(),
            message: message.to_string(),
        });
        self
    }

    /// Add a HATEOAS link.
    pub fn with_link(mut self, rel: &str, href: &str) -> Self {
        self.links.insert(rel.to_string(), href.to_string());
        self
    }
}

impl ApiResponse<()> {
    /// Create an error response (no data).
    pub fn error(code: &str, message: &str, request_id: String) -> Self {
        Self {
            data: None,
            meta: ApiMeta::now(request_id, 0),
            errors: vec![ApiErrorDetail {
                code: code.to_string(),
                message: message.to_string(),
            }],
            links: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_omits_errors() {
        let resp = RequestTimer::start()
            .respond(serde_json::json!({"id": 1}))
            .with_link("self", "/api/v1/webhooks/1");
        let value = serde_json::to_value(&resp).unwrap();

        assert_eq!(value["data"]["id"], 1);
        assert!(value.get("errors").is_none());
        assert_eq!(value["_links"]["self"], "/api/v1/webhooks/1");
        assert!(value["meta"]["request_id"].as_str().is_some_and(|s| !s.is_empty()));
    }

    #[test]
    fn data_and_errors_can_travel_together() {
        let resp = RequestTimer::start()
            .respond(serde_json::json!({"success": false}))
            .with_error("EXECUTION_ERROR", "step 1 aborted");
        let value = serde_json::to_value(&resp).unwrap();

        assert_eq!(value["data"]["success"], false);
        assert_eq!(value["errors"][0]["code"], "EXECUTION_ERROR");
    }

    #[test]
    fn error_envelope_omits_data() {
        let resp = ApiResponse::error("NOT_FOUND", "webhook not found", "req-1".to_string());
        let value = serde_json::to_value(&resp).unwrap();

        assert!(value.get("data").is_none());
        assert_eq!(value["errors"][0]["code"], "NOT_FOUND");
        assert_eq!(value["meta"]["request_id"], "req-1");
    }
}
