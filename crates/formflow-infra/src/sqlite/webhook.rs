//! SQLite webhook repository implementation.

use formflow_core::repository::webhook::WebhookRepository;
use formflow_types::error::RepositoryError;
use formflow_types::webhook::{HttpMethod, PayloadTemplate, PayloadType, Webhook, WebhookHeaders};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_json, parse_uuid, to_json, write_error};

/// SQLite-backed implementation of `WebhookRepository`.
pub struct SqliteWebhookRepository {
    pool: DatabasePool,
}

impl SqliteWebhookRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

pub(crate) const WEBHOOK_COLUMNS: &str = "id, name, url, method, is_active, retry_enabled, \
    retry_count, retry_delay_seconds, timeout_seconds, headers, payload_type, \
    payload_template, created_at, updated_at";

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

pub(crate) struct WebhookRow {
    id: String,
    name: String,
    url: String,
    method: String,
    is_active: bool,
    retry_enabled: bool,
    retry_count: i64,
    retry_delay_seconds: i64,
    timeout_seconds: i64,
    headers: String,
    payload_type: String,
    payload_template: Option<String>,
    created_at: String,
    updated_at: String,
}

impl WebhookRow {
    /// Read a webhook from `row`, prefixing every column with `prefix`.
    pub(crate) fn from_row_prefixed(
        row: &sqlx::sqlite::SqliteRow,
        prefix: &str,
    ) -> Result<Self, sqlx::Error> {
        let col = |name: &str| format!("{prefix}{name}");
        Ok(Self {
            id: row.try_get(col("id").as_str())?,
            name: row.try_get(col("name").as_str())?,
            url: row.try_get(col("url").as_str())?,
            method: row.try_get(col("method").as_str())?,
            is_active: row.try_get(col("is_active").as_str())?,
            retry_enabled: row.try_get(col("retry_enabled").as_str())?,
            retry_count: row.try_get(col("retry_count").as_str())?,
            retry_delay_seconds: row.try_get(col("retry_delay_seconds").as_str())?,
            timeout_seconds: row.try_get(col("timeout_seconds").as_str())?,
            headers: row.try_get(col("headers").as_str())?,
            payload_type: row.try_get(col("payload_type").as_str())?,
            payload_template: row.try_get(col("payload_template").as_str())?,
            created_at: row.try_get(col("created_at").as_str())?,
            updated_at: row.try_get(col("updated_at").as_str())?,
        })
    }

    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Self::from_row_prefixed(row, "")
    }

    pub(crate) fn into_webhook(self) -> Result<Webhook, RepositoryError> {
        let method: HttpMethod = self.method.parse().map_err(RepositoryError::Query)?;
        let payload_type: PayloadType = self.payload_type.parse().map_err(RepositoryError::Query)?;
        let headers: WebhookHeaders = serde_json::from_str(&self.headers)
            .map_err(|e| RepositoryError::Query(format!("invalid headers JSON: {e}")))?;
        let payload_template = self
            .payload_template
            .as_deref()
            .map(|s| parse_json(s, "payload_template").map(PayloadTemplate::new))
            .transpose()?;

        Ok(Webhook {
            id: parse_uuid(&self.id)?,
            name: self.name,
            url: self.url,
            method,
            is_active: self.is_active,
            retry_enabled: self.retry_enabled,
            retry_count: self.retry_count as u32,
            retry_delay_seconds: self.retry_delay_seconds as u32,
            timeout_seconds: self.timeout_seconds as u32,
            headers,
            payload_type,
            payload_template,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn template_json(webhook: &Webhook) -> Result<Option<String>, RepositoryError> {
    webhook
        .payload_template
        .as_ref()
        .map(|t| to_json(t.as_value()))
        .transpose()
}

// ---------------------------------------------------------------------------
// WebhookRepository impl
// ---------------------------------------------------------------------------

impl WebhookRepository for SqliteWebhookRepository {
    async fn create_webhook(&self, webhook: &Webhook) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO webhooks (id, name, url, method, is_active, retry_enabled, retry_count,
                   retry_delay_seconds, timeout_seconds, headers, payload_type, payload_template,
                   created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(webhook.id.to_string())
        .bind(&webhook.name)
        .bind(&webhook.url)
        .bind(webhook.method.as_str())
        .bind(webhook.is_active)
        .bind(webhook.retry_enabled)
        .bind(webhook.retry_count as i64)
        .bind(webhook.retry_delay_seconds as i64)
        .bind(webhook.timeout_seconds as i64)
        .bind(to_json(&webhook.headers)?)
        .bind(webhook.payload_type.as_str())
        .bind(template_json(webhook)?)
        .bind(format_datetime(&webhook.created_at))
        .bind(format_datetime(&webhook.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| write_error(e, || format!("webhook {} already exists", webhook.id)))?;

        Ok(())
    }

    async fn get_webhook(&self, id: &Uuid) -> Result<Option<Webhook>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {WEBHOOK_COLUMNS} FROM webhooks WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = WebhookRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_webhook()?))
            }
            None => Ok(None),
        }
    }

    async fn list_webhooks(&self, active_only: bool) -> Result<Vec<Webhook>, RepositoryError> {
        let sql = if active_only {
            format!("SELECT {WEBHOOK_COLUMNS} FROM webhooks WHERE is_active = 1 ORDER BY name ASC")
        } else {
            format!("SELECT {WEBHOOK_COLUMNS} FROM webhooks ORDER BY name ASC")
        };

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut webhooks = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = WebhookRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            webhooks.push(r.into_webhook()?);
        }
        Ok(webhooks)
    }

    async fn update_webhook(&self, webhook: &Webhook) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE webhooks SET name = ?, url = ?, method = ?, is_active = ?, retry_enabled = ?,
                   retry_count = ?, retry_delay_seconds = ?, timeout_seconds = ?, headers = ?,
                   payload_type = ?, payload_template = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&webhook.name)
        .bind(&webhook.url)
        .bind(webhook.method.as_str())
        .bind(webhook.is_active)
        .bind(webhook.retry_enabled)
        .bind(webhook.retry_count as i64)
        .bind(webhook.retry_delay_seconds as i64)
        .bind(webhook.timeout_seconds as i64)
        .bind(to_json(&webhook.headers)?)
        .bind(webhook.payload_type.as_str())
        .bind(template_json(webhook)?)
        .bind(format_datetime(&webhook.updated_at))
        .bind(webhook.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete_webhook(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM webhooks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| {
                write_error(e, || {
                    format!("webhook {id} is referenced by automation steps")
                })
            })?;

        Ok(result.rows_affected() > 0)
    }
}
