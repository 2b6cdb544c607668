//! Trigger origin extractor.
//!
//! Builds a [`TriggerOrigin`] from request headers:
//! - `User-Agent`
//! - `X-Session-Id`
//! - `X-Forwarded-For` (first hop only)

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use formflow_types::execution::TriggerOrigin;

/// Caller context for the audit events a request produces. Never rejects.
pub struct Origin(pub TriggerOrigin);

impl<S: Send + Sync> FromRequestParts<S> for Origin {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Origin(origin_from_headers(&parts.headers)))
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn origin_from_headers(headers: &HeaderMap) -> TriggerOrigin {
    let ip_address = header(headers, "x-forwarded-for").and_then(|hops| {
        hops.split(',')
            .next()
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string)
    });

    TriggerOrigin {
        session_id: header(headers, "x-session-id"),
        user_agent: header(headers, "user-agent"),
        ip_address,
    }
}
