//! Execution repository trait definition.
//!
//! Defines the storage interface for automation runs and their per-step
//! records. Only the execution engine writes through this trait.

use chrono::{DateTime, Utc};
use formflow_types::error::RepositoryError;
use formflow_types::execution::{
    AutomationExecution, AutomationStepExecution, ExecutionStatus, StepOutcome,
};
use uuid::Uuid;

/// Repository trait for execution persistence.
///
/// Covers two entity families:
/// - **Runs:** create, finalize and query automation executions.
/// - **Steps:** create, finalize and query step executions.
///
/// Finalizing is a one-way transition: implementations must only update
/// rows still in the running state and report `NotFound` otherwise.
pub trait ExecutionRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    fn create_execution(
        &self,
        execution: &AutomationExecution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Move a running execution to a terminal status.
    fn finish_execution(
        &self,
        id: &Uuid,
        status: ExecutionStatus,
        error_message: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_execution(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<AutomationExecution>, RepositoryError>> + Send;

    /// List executions of an automation, newest first.
    fn list_executions(
        &self,
        automation_id: &Uuid,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<AutomationExecution>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    fn create_step_execution(
        &self,
        step: &AutomationStepExecution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Write a running step's terminal outcome.
    fn finish_step_execution(
        &self,
        id: &Uuid,
        outcome: &StepOutcome,
        completed_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Step executions of one run, in the order they were started.
    fn list_step_executions(
        &self,
        execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<AutomationStepExecution>, RepositoryError>> + Send;

    /// Step executions across all runs of an automation, newest first.
    fn list_step_executions_for_automation(
        &self,
        automation_id: &Uuid,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<AutomationStepExecution>, RepositoryError>> + Send;
}
