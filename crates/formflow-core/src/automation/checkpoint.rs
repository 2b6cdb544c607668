//! Durable checkpoints for automation runs.
//!
//! Wraps `ExecutionRepository` with the transitions the engine performs:
//! run started/finished and step started/skipped/finished. Each transition
//! is written before the engine moves on, so what is stored is always what
//! has happened so far.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use formflow_types::automation::AutomationStep;
use formflow_types::execution::{
    AutomationExecution, AutomationStepExecution, ExecutionStatus, StepExecutionStatus,
    StepOutcome,
};

use crate::repository::execution::ExecutionRepository;

/// Records execution state transitions.
pub struct CheckpointManager<X: ExecutionRepository> {
    repo: Arc<X>,
}

impl<X: ExecutionRepository> CheckpointManager<X> {
    pub fn new(repo: Arc<X>) -> Self {
        Self { repo }
    }

    /// Access the underlying repository.
    pub fn repo(&self) -> &X {
        &self.repo
    }

    // -----------------------------------------------------------------------
    // Run-level checkpoints
    // -----------------------------------------------------------------------

    /// Create the execution row in the running state.
    pub async fn start_execution(
        &self,
        execution_id: Uuid,
        automation_id: Uuid,
        trigger_data: &Value,
    ) -> Result<AutomationExecution, CheckpointError> {
        let execution = AutomationExecution {
            id: execution_id,
            automation_id,
            status: ExecutionStatus::Running,
            trigger_data: trigger_data.clone(),
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
        };

        self.repo
            .create_execution(&execution)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(execution_id = %execution_id, "checkpointed execution start");
        Ok(execution)
    }

    /// Move the execution to its terminal status.
    pub async fn finish_execution(
        &self,
        execution_id: Uuid,
        status: ExecutionStatus,
        error_message: Option<&str>,
    ) -> Result<(), CheckpointError> {
        self.repo
            .finish_execution(&execution_id, status, error_message, Utc::now())
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(
            execution_id = %execution_id,
            status = %status,
            "checkpointed execution finish"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Step-level checkpoints
    // -----------------------------------------------------------------------

    /// Create a running step execution row. Returns its id.
    pub async fn step_start(
        &self,
        execution_id: Uuid,
        step: &AutomationStep,
    ) -> Result<Uuid, CheckpointError> {
        let id = Uuid::now_v7();
        let row = AutomationStepExecution {
            id,
            execution_id,
            step_id: step.id,
            webhook_id: step.webhook_id,
            status: StepExecutionStatus::Running,
            webhook_response_status: None,
            webhook_response_body: None,
            error_message: None,
            attempts: 0,
            started_at: Utc::now(),
            completed_at: None,
        };

        self.repo
            .create_step_execution(&row)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(
            execution_id = %execution_id,
            step_order = step.step_order,
            step_execution_id = %id,
            "checkpointed step start"
        );
        Ok(id)
    }

    /// Mark a step skipped (condition evaluated false).
    pub async fn step_skipped(&self, step_execution_id: Uuid) -> Result<(), CheckpointError> {
        self.step_finished(step_execution_id, &StepOutcome::skipped())
            .await
    }

    /// Write a step's terminal outcome.
    pub async fn step_finished(
        &self,
        step_execution_id: Uuid,
        outcome: &StepOutcome,
    ) -> Result<(), CheckpointError> {
        self.repo
            .finish_step_execution(&step_execution_id, outcome, Utc::now())
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(
            step_execution_id = %step_execution_id,
            status = %outcome.status,
            attempts = outcome.attempts,
            "checkpointed step finish"
        );
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint repository error: {0}")]
    Repository(String),
}
