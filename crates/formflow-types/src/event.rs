//! System audit events.
//!
//! Events are immutable once written. The engine only appends; the admin
//! surface reads them back through [`EventFilter`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::execution::TriggerOrigin;

/// Event type values written by the engine.
pub mod event_type {
    pub const WEBHOOK: &str = "webhook";
    pub const AUTOMATION: &str = "automation";
}

/// Event category values written by the engine.
pub mod event_category {
    pub const INTEGRATION: &str = "integration";
}

/// Event names written by the engine.
pub mod event_name {
    pub const AUTOMATION_STARTED: &str = "automation_started";
    pub const AUTOMATION_COMPLETED: &str = "automation_completed";
    pub const AUTOMATION_FAILED: &str = "automation_failed";
    pub const STEP_SKIPPED: &str = "step_skipped";
    pub const WEBHOOK_TRIGGERED: &str = "webhook_triggered";
    pub const WEBHOOK_SUCCEEDED: &str = "webhook_succeeded";
    pub const WEBHOOK_FAILED: &str = "webhook_failed";
}

/// A persisted audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemEvent {
    pub id: Uuid,
    pub event_type: String,
    pub event_category: String,
    pub event_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An event about to be logged. Id and timestamp are assigned on write.
#[derive(Debug, Clone)]
pub struct NewSystemEvent {
    pub event_type: String,
    pub event_category: String,
    pub event_name: String,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
    pub origin: TriggerOrigin,
}

impl NewSystemEvent {
    pub fn new(event_type: &str, event_category: &str, event_name: &str) -> Self {
        Self {
            event_type: event_type.to_string(),
            event_category: event_category.to_string(),
            event_name: event_name.to_string(),
            description: None,
            metadata: serde_json::Value::Object(Default::default()),
            origin: TriggerOrigin::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_origin(mut self, origin: &TriggerOrigin) -> Self {
        self.origin = origin.clone();
        self
    }

    /// Materialize into a stored record.
    pub fn into_event(self) -> SystemEvent {
        SystemEvent {
            id: Uuid::now_v7(),
            event_type: self.event_type,
            event_category: self.event_category,
            event_name: self.event_name,
            description: self.description,
            metadata: self.metadata,
            session_id: self.origin.session_id,
            user_agent: self.origin.user_agent,
            ip_address: self.origin.ip_address,
            created_at: Utc::now(),
        }
    }
}

/// Filters for querying the event log. Results are newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFilter {
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    /// Substring match over event name and description.
    #[serde(default)]
    pub search: Option<String>,
    /// Matches `metadata.user_id`.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            event_type: None,
            category: None,
            from: None,
            to: None,
            search: None,
            user_id: None,
            session_id: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}
