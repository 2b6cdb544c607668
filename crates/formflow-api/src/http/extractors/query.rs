//! Query parameter extractors for list endpoints.

use serde::Deserialize;

/// Query parameters for the webhook list endpoint.
#[derive(Debug, Deserialize, Default)]
pub struct WebhookListQuery {
    /// Only return active webhooks.
    #[serde(default)]
    pub active: bool,
}

/// Query parameters for the execution and step-execution history endpoints.
#[derive(Debug, Deserialize, Default)]
pub struct ExecutionListQuery {
    /// Maximum results; falls back to `engine.execution_list_limit`.
    pub limit: Option<u32>,
}
