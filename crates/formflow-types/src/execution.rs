//! Execution tracking types.
//!
//! `AutomationExecution` is one run of an automation, `AutomationStepExecution`
//! is the persisted outcome of one step inside that run. Both are owned and
//! mutated exclusively by the execution engine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

/// Overall status of an automation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            other => Err(format!("invalid execution status: '{other}'")),
        }
    }
}

/// Status of one step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepExecutionStatus {
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepExecutionStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepExecutionStatus::Running => "running",
            StepExecutionStatus::Completed => "completed",
            StepExecutionStatus::Failed => "failed",
            StepExecutionStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(StepExecutionStatus::Running),
            "completed" => Ok(StepExecutionStatus::Completed),
            "failed" => Ok(StepExecutionStatus::Failed),
            "skipped" => Ok(StepExecutionStatus::Skipped),
            other => Err(format!("invalid step status: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A single run of an automation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationExecution {
    pub id: Uuid,
    pub automation_id: Uuid,
    pub status: ExecutionStatus,
    /// Opaque payload the run was triggered with.
    pub trigger_data: serde_json::Value,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Persisted outcome of one step within one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationStepExecution {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub step_id: Uuid,
    pub webhook_id: Uuid,
    pub status: StepExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_response_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_response_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// HTTP calls issued for this step (0 when skipped).
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Terminal outcome written onto a step execution row.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub status: StepExecutionStatus,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub attempts: u32,
}

impl StepOutcome {
    pub fn skipped() -> Self {
        Self {
            status: StepExecutionStatus::Skipped,
            response_status: None,
            response_body: None,
            error_message: None,
            attempts: 0,
        }
    }

    pub fn failed(message: impl Into<String>, attempts: u32) -> Self {
        Self {
            status: StepExecutionStatus::Failed,
            response_status: None,
            response_body: None,
            error_message: Some(message.into()),
            attempts,
        }
    }

    /// Build the outcome of a finished webhook invocation.
    pub fn from_invocation(result: &InvocationResult) -> Self {
        Self {
            status: if result.success {
                StepExecutionStatus::Completed
            } else {
                StepExecutionStatus::Failed
            },
            response_status: result.status_code,
            response_body: result.response_body.clone(),
            error_message: result.error_message.clone(),
            attempts: result.attempts,
        }
    }
}

// ---------------------------------------------------------------------------
// Results returned to callers
// ---------------------------------------------------------------------------

/// Outcome of invoking a webhook (after retries).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub success: bool,
    pub status_code: Option<u16>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub response_time_ms: u64,
    pub attempts: u32,
}

impl InvocationResult {
    /// A failure that never reached the network.
    pub fn not_sent(message: impl Into<String>) -> Self {
        Self {
            success: false,
            status_code: None,
            response_body: None,
            error_message: Some(message.into()),
            response_time_ms: 0,
            attempts: 0,
        }
    }
}

/// Structured result of triggering an automation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    /// `None` when the run was rejected before an execution row existed.
    pub execution_id: Option<Uuid>,
    pub completed_steps: u32,
    pub total_steps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub execution_time_ms: u64,
}

impl ExecutionResult {
    /// Rejection before any row was written.
    pub fn rejected(message: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            execution_id: None,
            completed_steps: 0,
            total_steps: 0,
            error_message: Some(message.into()),
            execution_time_ms,
        }
    }
}

/// Caller context attached to every audit event a run emits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerOrigin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}
