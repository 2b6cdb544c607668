//! Automation domain types.
//!
//! An automation is an ordered list of steps, each invoking one webhook.
//! Steps layer their own delay, condition, and failure policy over the
//! referenced webhook's retry and timeout policy.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::webhook::Webhook;

// ---------------------------------------------------------------------------
// Trigger type
// ---------------------------------------------------------------------------

/// What kind of event is expected to fire an automation.
///
/// The engine does not interpret this; callers use it to pick which
/// automations to trigger for a given application event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    #[default]
    Manual,
    FormSubmitted,
    SignatureCompleted,
    Api,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Manual => "manual",
            TriggerType::FormSubmitted => "form_submitted",
            TriggerType::SignatureCompleted => "signature_completed",
            TriggerType::Api => "api",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(TriggerType::Manual),
            "form_submitted" => Ok(TriggerType::FormSubmitted),
            "signature_completed" => Ok(TriggerType::SignatureCompleted),
            "api" => Ok(TriggerType::Api),
            other => Err(format!("invalid trigger type: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Automation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Automation {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_active: bool,
    pub trigger_type: TriggerType,
    /// Opaque trigger configuration owned by the caller.
    #[serde(default)]
    pub trigger_config: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Predicate deciding whether a conditional step runs.
///
/// The expression is JEXL, evaluated against
/// `{ trigger, steps, execution }` where `steps` maps each earlier
/// step's `stepOrder` to `{ status, success, statusCode }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionConfig {
    pub expression: String,
}

impl ConditionConfig {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }
}

/// One position in an automation's sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationStep {
    pub id: Uuid,
    pub automation_id: Uuid,
    pub webhook_id: Uuid,
    pub step_order: u32,
    pub is_conditional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_config: Option<ConditionConfig>,
    pub delay_seconds: u32,
    /// When false, the webhook's retry policy is ignored for this step.
    pub retry_on_failure: bool,
    pub continue_on_failure: bool,
}

/// An automation together with its steps ordered by `step_order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationWithSteps {
    #[serde(flatten)]
    pub automation: Automation,
    pub steps: Vec<AutomationStep>,
}

/// A step paired with its (active) webhook, as loaded for execution.
#[derive(Debug, Clone)]
pub struct ActiveStep {
    pub step: AutomationStep,
    pub webhook: Webhook,
}

// ---------------------------------------------------------------------------
// Write requests
// ---------------------------------------------------------------------------

/// A step as submitted to the definition store, before ids are assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepInput {
    pub webhook_id: Uuid,
    pub step_order: u32,
    #[serde(default)]
    pub is_conditional: bool,
    #[serde(default)]
    pub condition_config: Option<ConditionConfig>,
    #[serde(default)]
    pub delay_seconds: u32,
    #[serde(default = "default_true")]
    pub retry_on_failure: bool,
    #[serde(default)]
    pub continue_on_failure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAutomationRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub trigger_config: serde_json::Value,
    #[serde(default)]
    pub steps: Vec<StepInput>,
}

/// Partial update of an automation.
///
/// When `steps` is present it replaces the whole step list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAutomationRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub trigger_type: Option<TriggerType>,
    pub trigger_config: Option<serde_json::Value>,
    pub steps: Option<Vec<StepInput>>,
}

fn default_true() -> bool {
    true
}
