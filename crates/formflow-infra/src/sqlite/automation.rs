//! SQLite automation repository implementation.
//!
//! An automation and its steps are written in one transaction. Updating an
//! automation replaces its step rows wholesale.

use formflow_core::repository::automation::AutomationRepository;
use formflow_types::automation::{
    ActiveStep, Automation, AutomationStep, AutomationWithSteps, ConditionConfig, TriggerType,
};
use formflow_types::error::RepositoryError;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::webhook::WebhookRow;
use super::{format_datetime, parse_datetime, parse_json, parse_uuid, to_json, write_error};

/// SQLite-backed implementation of `AutomationRepository`.
pub struct SqliteAutomationRepository {
    pool: DatabasePool,
}

impl SqliteAutomationRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn steps_for(&self, automation_id: &Uuid) -> Result<Vec<AutomationStep>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM automation_steps WHERE automation_id = ? ORDER BY step_order ASC",
        )
        .bind(automation_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter().map(row_to_step).collect()
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn row_to_automation(row: &SqliteRow) -> Result<Automation, RepositoryError> {
    let get = |e: sqlx::Error| RepositoryError::Query(e.to_string());

    let id: String = row.try_get("id").map_err(get)?;
    let trigger_type: String = row.try_get("trigger_type").map_err(get)?;
    let trigger_config: String = row.try_get("trigger_config").map_err(get)?;
    let created_at: String = row.try_get("created_at").map_err(get)?;
    let updated_at: String = row.try_get("updated_at").map_err(get)?;

    Ok(Automation {
        id: parse_uuid(&id)?,
        name: row.try_get("name").map_err(get)?,
        description: row.try_get("description").map_err(get)?,
        is_active: row.try_get("is_active").map_err(get)?,
        trigger_type: trigger_type
            .parse::<TriggerType>()
            .map_err(RepositoryError::Query)?,
        trigger_config: parse_json(&trigger_config, "trigger_config")?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

fn row_to_step(row: &SqliteRow) -> Result<AutomationStep, RepositoryError> {
    let get = |e: sqlx::Error| RepositoryError::Query(e.to_string());

    let id: String = row.try_get("id").map_err(get)?;
    let automation_id: String = row.try_get("automation_id").map_err(get)?;
    let webhook_id: String = row.try_get("webhook_id").map_err(get)?;
    let step_order: i64 = row.try_get("step_order").map_err(get)?;
    let delay_seconds: i64 = row.try_get("delay_seconds").map_err(get)?;
    let condition_config: Option<String> = row.try_get("condition_config").map_err(get)?;

    let condition_config = condition_config
        .as_deref()
        .map(|s| {
            serde_json::from_str::<ConditionConfig>(s)
                .map_err(|e| RepositoryError::Query(format!("invalid condition_config JSON: {e}")))
        })
        .transpose()?;

    Ok(AutomationStep {
        id: parse_uuid(&id)?,
        automation_id: parse_uuid(&automation_id)?,
        webhook_id: parse_uuid(&webhook_id)?,
        step_order: step_order as u32,
        is_conditional: row.try_get("is_conditional").map_err(get)?,
        condition_config,
        delay_seconds: delay_seconds as u32,
        retry_on_failure: row.try_get("retry_on_failure").map_err(get)?,
        continue_on_failure: row.try_get("continue_on_failure").map_err(get)?,
    })
}

async fn insert_steps(
    conn: &mut sqlx::SqliteConnection,
    steps: &[AutomationStep],
) -> Result<(), RepositoryError> {
    for step in steps {
        let condition_config = step.condition_config.as_ref().map(to_json).transpose()?;
        sqlx::query(
            r#"INSERT INTO automation_steps (id, automation_id, webhook_id, step_order,
                   is_conditional, condition_config, delay_seconds, retry_on_failure,
                   continue_on_failure)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(step.id.to_string())
        .bind(step.automation_id.to_string())
        .bind(step.webhook_id.to_string())
        .bind(step.step_order as i64)
        .bind(step.is_conditional)
        .bind(&condition_config)
        .bind(step.delay_seconds as i64)
        .bind(step.retry_on_failure)
        .bind(step.continue_on_failure)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            write_error(e, || {
                format!(
                    "step {} conflicts with an existing step or references a missing webhook",
                    step.step_order
                )
            })
        })?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// AutomationRepository impl
// ---------------------------------------------------------------------------

impl AutomationRepository for SqliteAutomationRepository {
    async fn create_automation(&self, definition: &AutomationWithSteps) -> Result<(), RepositoryError> {
        let automation = &definition.automation;
        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO automations (id, name, description, is_active, trigger_type,
                   trigger_config, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(automation.id.to_string())
        .bind(&automation.name)
        .bind(&automation.description)
        .bind(automation.is_active)
        .bind(automation.trigger_type.as_str())
        .bind(to_json(&automation.trigger_config)?)
        .bind(format_datetime(&automation.created_at))
        .bind(format_datetime(&automation.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| write_error(e, || format!("automation {} already exists", automation.id)))?;

        insert_steps(&mut *tx, &definition.steps).await?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    async fn get_automation(&self, id: &Uuid) -> Result<Option<Automation>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM automations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.as_ref().map(row_to_automation).transpose()
    }

    async fn get_automation_with_steps(
        &self,
        id: &Uuid,
    ) -> Result<Option<AutomationWithSteps>, RepositoryError> {
        let Some(automation) = self.get_automation(id).await? else {
            return Ok(None);
        };
        let steps = self.steps_for(id).await?;
        Ok(Some(AutomationWithSteps { automation, steps }))
    }

    async fn list_automations(&self) -> Result<Vec<AutomationWithSteps>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM automations ORDER BY name ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut result = Vec::with_capacity(rows.len());
        for row in &rows {
            let automation = row_to_automation(row)?;
            let steps = self.steps_for(&automation.id).await?;
            result.push(AutomationWithSteps { automation, steps });
        }
        Ok(result)
    }

    async fn update_automation(&self, definition: &AutomationWithSteps) -> Result<(), RepositoryError> {
        let automation = &definition.automation;
        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let result = sqlx::query(
            r#"UPDATE automations SET name = ?, description = ?, is_active = ?, trigger_type = ?,
                   trigger_config = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&automation.name)
        .bind(&automation.description)
        .bind(automation.is_active)
        .bind(automation.trigger_type.as_str())
        .bind(to_json(&automation.trigger_config)?)
        .bind(format_datetime(&automation.updated_at))
        .bind(automation.id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        sqlx::query("DELETE FROM automation_steps WHERE automation_id = ?")
            .bind(automation.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        insert_steps(&mut *tx, &definition.steps).await?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    async fn delete_automation(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        // Steps go with the automation (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM automations WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_active_steps(&self, automation_id: &Uuid) -> Result<Vec<ActiveStep>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT s.*,
                   w.id AS w_id, w.name AS w_name, w.url AS w_url, w.method AS w_method,
                   w.is_active AS w_is_active, w.retry_enabled AS w_retry_enabled,
                   w.retry_count AS w_retry_count, w.retry_delay_seconds AS w_retry_delay_seconds,
                   w.timeout_seconds AS w_timeout_seconds, w.headers AS w_headers,
                   w.payload_type AS w_payload_type, w.payload_template AS w_payload_template,
                   w.created_at AS w_created_at, w.updated_at AS w_updated_at
               FROM automation_steps s
               JOIN webhooks w ON w.id = s.webhook_id
               WHERE s.automation_id = ? AND w.is_active = 1
               ORDER BY s.step_order ASC"#,
        )
        .bind(automation_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut steps = Vec::with_capacity(rows.len());
        for row in &rows {
            let step = row_to_step(row)?;
            let webhook = WebhookRow::from_row_prefixed(row, "w_")
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_webhook()?;
            steps.push(ActiveStep { step, webhook });
        }
        Ok(steps)
    }
}
