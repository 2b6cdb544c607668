//! Outbound HTTP port used by the webhook invoker.
//!
//! The invoker builds a [`WebhookRequest`] and hands it to a
//! [`WebhookTransport`]. formflow-infra implements the trait on top of
//! reqwest; tests substitute a scripted transport.

use std::collections::BTreeMap;
use std::time::Duration;

use formflow_types::webhook::HttpMethod;

/// A fully-built outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookRequest {
    pub method: HttpMethod,
    pub url: String,
    /// Lowercased header names.
    pub headers: BTreeMap<String, String>,
    /// `None` for methods that carry no body.
    pub body: Option<String>,
    pub timeout: Duration,
    /// Response bytes worth reading; the rest is never stored.
    pub max_body_bytes: usize,
}

/// Whatever the target answered, 2xx or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: u16,
    pub body: String,
}

impl WebhookResponse {
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }
}

/// Failures where no HTTP status was received.
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid request: {0}")]
    Request(String),
}

/// Sends one HTTP request. Implementations must not retry.
pub trait WebhookTransport: Send + Sync {
    fn send(
        &self,
        request: WebhookRequest,
    ) -> impl std::future::Future<Output = Result<WebhookResponse, InvocationError>> + Send;
}
