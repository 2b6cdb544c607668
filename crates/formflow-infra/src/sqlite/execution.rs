//! SQLite execution history repository implementation.
//!
//! Runs and step runs are created in the `running` state and finished
//! exactly once. The finish updates are guarded by `status = 'running'`, so
//! a terminal row is never rewritten.

use chrono::{DateTime, Utc};
use formflow_core::repository::execution::ExecutionRepository;
use formflow_types::error::RepositoryError;
use formflow_types::execution::{
    AutomationExecution, AutomationStepExecution, ExecutionStatus, StepExecutionStatus,
    StepOutcome,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_json, parse_uuid, to_json, write_error};

/// SQLite-backed implementation of `ExecutionRepository`.
pub struct SqliteExecutionRepository {
    pool: DatabasePool,
}

impl SqliteExecutionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct ExecutionRow {
    id: String,
    automation_id: String,
    status: String,
    trigger_data: String,
    started_at: String,
    completed_at: Option<String>,
    error_message: Option<String>,
}

impl ExecutionRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            automation_id: row.try_get("automation_id")?,
            status: row.try_get("status")?,
            trigger_data: row.try_get("trigger_data")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            error_message: row.try_get("error_message")?,
        })
    }

    fn into_execution(self) -> Result<AutomationExecution, RepositoryError> {
        Ok(AutomationExecution {
            id: parse_uuid(&self.id)?,
            automation_id: parse_uuid(&self.automation_id)?,
            status: self
                .status
                .parse::<ExecutionStatus>()
                .map_err(RepositoryError::Query)?,
            trigger_data: parse_json(&self.trigger_data, "trigger_data")?,
            started_at: parse_datetime(&self.started_at)?,
            completed_at: self.completed_at.as_deref().map(parse_datetime).transpose()?,
            error_message: self.error_message,
        })
    }
}

struct StepExecutionRow {
    id: String,
    execution_id: String,
    step_id: String,
    webhook_id: String,
    status: String,
    webhook_response_status: Option<i64>,
    webhook_response_body: Option<String>,
    error_message: Option<String>,
    attempts: i64,
    started_at: String,
    completed_at: Option<String>,
}

impl StepExecutionRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            execution_id: row.try_get("execution_id")?,
            step_id: row.try_get("step_id")?,
            webhook_id: row.try_get("webhook_id")?,
            status: row.try_get("status")?,
            webhook_response_status: row.try_get("webhook_response_status")?,
            webhook_response_body: row.try_get("webhook_response_body")?,
            error_message: row.try_get("error_message")?,
            attempts: row.try_get("attempts")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_step_execution(self) -> Result<AutomationStepExecution, RepositoryError> {
        Ok(AutomationStepExecution {
            id: parse_uuid(&self.id)?,
            execution_id: parse_uuid(&self.execution_id)?,
            step_id: parse_uuid(&self.step_id)?,
            webhook_id: parse_uuid(&self.webhook_id)?,
            status: self
                .status
                .parse::<StepExecutionStatus>()
                .map_err(RepositoryError::Query)?,
            webhook_response_status: self.webhook_response_status.map(|s| s as u16),
            webhook_response_body: self.webhook_response_body,
            error_message: self.error_message,
            attempts: self.attempts as u32,
            started_at: parse_datetime(&self.started_at)?,
            completed_at: self.completed_at.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

fn collect_step_executions(rows: &[SqliteRow]) -> Result<Vec<AutomationStepExecution>, RepositoryError> {
    let mut result = Vec::with_capacity(rows.len());
    for row in rows {
        let r = StepExecutionRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
        result.push(r.into_step_execution()?);
    }
    Ok(result)
}

// ---------------------------------------------------------------------------
// ExecutionRepository impl
// ---------------------------------------------------------------------------

impl ExecutionRepository for SqliteExecutionRepository {
    async fn create_execution(&self, execution: &AutomationExecution) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO automation_executions
               (id, automation_id, status, trigger_data, started_at, completed_at, error_message)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(execution.id.to_string())
        .bind(execution.automation_id.to_string())
        .bind(execution.status.as_str())
        .bind(to_json(&execution.trigger_data)?)
        .bind(format_datetime(&execution.started_at))
        .bind(execution.completed_at.as_ref().map(format_datetime))
        .bind(&execution.error_message)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| write_error(e, || format!("execution {} already exists", execution.id)))?;

        Ok(())
    }

    async fn finish_execution(
        &self,
        id: &Uuid,
        status: ExecutionStatus,
        error_message: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE automation_executions
               SET status = ?, error_message = ?, completed_at = ?
               WHERE id = ? AND status = 'running'"#,
        )
        .bind(status.as_str())
        .bind(error_message)
        .bind(format_datetime(&completed_at))
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<AutomationExecution>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM automation_executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = ExecutionRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_execution()?))
            }
            None => Ok(None),
        }
    }

    async fn list_executions(
        &self,
        automation_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<AutomationExecution>, RepositoryError> {
        // UUID v7 ids sort by creation time; they break started_at ties.
        let rows = sqlx::query(
            r#"SELECT * FROM automation_executions
               WHERE automation_id = ?
               ORDER BY started_at DESC, id DESC
               LIMIT ?"#,
        )
        .bind(automation_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut result = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = ExecutionRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            result.push(r.into_execution()?);
        }
        Ok(result)
    }

    async fn create_step_execution(&self, step: &AutomationStepExecution) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO automation_step_executions
               (id, execution_id, step_id, webhook_id, status, webhook_response_status,
                webhook_response_body, error_message, attempts, started_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(step.id.to_string())
        .bind(step.execution_id.to_string())
        .bind(step.step_id.to_string())
        .bind(step.webhook_id.to_string())
        .bind(step.status.as_str())
        .bind(step.webhook_response_status.map(|s| s as i64))
        .bind(&step.webhook_response_body)
        .bind(&step.error_message)
        .bind(step.attempts as i64)
        .bind(format_datetime(&step.started_at))
        .bind(step.completed_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| {
            write_error(e, || {
                format!("step execution {} conflicts or its run is missing", step.id)
            })
        })?;

        Ok(())
    }

    async fn finish_step_execution(
        &self,
        id: &Uuid,
        outcome: &StepOutcome,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE automation_step_executions
               SET status = ?, webhook_response_status = ?, webhook_response_body = ?,
                   error_message = ?, attempts = ?, completed_at = ?
               WHERE id = ? AND status = 'running'"#,
        )
        .bind(outcome.status.as_str())
        .bind(outcome.response_status.map(|s| s as i64))
        .bind(&outcome.response_body)
        .bind(&outcome.error_message)
        .bind(outcome.attempts as i64)
        .bind(format_datetime(&completed_at))
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_step_executions(
        &self,
        execution_id: &Uuid,
    ) -> Result<Vec<AutomationStepExecution>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT * FROM automation_step_executions
               WHERE execution_id = ?
               ORDER BY started_at ASC, id ASC"#,
        )
        .bind(execution_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        collect_step_executions(&rows)
    }

    async fn list_step_executions_for_automation(
        &self,
        automation_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<AutomationStepExecution>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT se.* FROM automation_step_executions se
               JOIN automation_executions e ON e.id = se.execution_id
               WHERE e.automation_id = ?
               ORDER BY se.started_at DESC, se.id DESC
               LIMIT ?"#,
        )
        .bind(automation_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        collect_step_executions(&rows)
    }
}
