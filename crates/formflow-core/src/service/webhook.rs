//! Webhook registry service.
//!
//! Creates, updates and deletes webhook definitions. Every write is
//! validated before it reaches the repository: the name must be non-empty,
//! the URL must be an absolute http(s) URL and the timeout must be positive.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use formflow_types::error::{RegistryError, RepositoryError};
use formflow_types::webhook::{CreateWebhookRequest, UpdateWebhookRequest, Webhook};

use crate::repository::webhook::WebhookRepository;

/// Service managing webhook definitions.
pub struct WebhookService<W: WebhookRepository> {
    repo: Arc<W>,
}

impl<W: WebhookRepository> Clone for WebhookService<W> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
        }
    }
}

impl<W: WebhookRepository> WebhookService<W> {
    pub fn new(repo: Arc<W>) -> Self {
        Self { repo }
    }

    /// List webhooks ordered by name.
    pub async fn list_webhooks(&self, active_only: bool) -> Result<Vec<Webhook>, RegistryError> {
        Ok(self.repo.list_webhooks(active_only).await?)
    }

    pub async fn get_webhook(&self, id: &Uuid) -> Result<Webhook, RegistryError> {
        self.repo
            .get_webhook(id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("webhook {id}")))
    }

    pub async fn create_webhook(
        &self,
        request: CreateWebhookRequest,
    ) -> Result<Webhook, RegistryError> {
        let now = Utc::now();
        let webhook = Webhook {
            id: Uuid::now_v7(),
            name: request.name.trim().to_string(),
            url: request.url.trim().to_string(),
            method: request.method,
            is_active: request.is_active,
            retry_enabled: request.retry_enabled,
            retry_count: request.retry_count,
            retry_delay_seconds: request.retry_delay_seconds,
            timeout_seconds: request.timeout_seconds,
            headers: request.headers,
            payload_type: request.payload_type,
            payload_template: request.payload_template,
            created_at: now,
            updated_at: now,
        };
        validate_webhook(&webhook)?;

        self.repo.create_webhook(&webhook).await?;
        tracing::info!(webhook_id = %webhook.id, name = %webhook.name, "webhook created");
        Ok(webhook)
    }

    /// Apply a partial update. Fields left as `None` keep their value.
    pub async fn update_webhook(
        &self,
        id: &Uuid,
        request: UpdateWebhookRequest,
    ) -> Result<Webhook, RegistryError> {
        let mut webhook = self.get_webhook(id).await?;

        if let Some(name) = request.name {
            webhook.name = name.trim().to_string();
        }
        if let Some(url) = request.url {
            webhook.url = url.trim().to_string();
        }
        if let Some(method) = request.method {
            webhook.method = method;
        }
        if let Some(is_active) = request.is_active {
            webhook.is_active = is_active;
        }
        if let Some(retry_enabled) = request.retry_enabled {
            webhook.retry_enabled = retry_enabled;
        }
        if let Some(retry_count) = request.retry_count {
            webhook.retry_count = retry_count;
        }
        if let Some(delay) = request.retry_delay_seconds {
            webhook.retry_delay_seconds = delay;
        }
        if let Some(timeout) = request.timeout_seconds {
            webhook.timeout_seconds = timeout;
        }
        if let Some(headers) = request.headers {
            webhook.headers = headers;
        }
        if let Some(payload_type) = request.payload_type {
            webhook.payload_type = payload_type;
        }
        if let Some(template) = request.payload_template {
            webhook.payload_template = template;
        }
        webhook.updated_at = Utc::now();
        validate_webhook(&webhook)?;

        self.repo.update_webhook(&webhook).await.map_err(|e| match e {
            RepositoryError::NotFound => RegistryError::NotFound(format!("webhook {id}")),
            other => other.into(),
        })?;
        Ok(webhook)
    }

    /// Delete a webhook. Fails with `Conflict` while any automation step
    /// still references it.
    pub async fn delete_webhook(&self, id: &Uuid) -> Result<(), RegistryError> {
        if !self.repo.delete_webhook(id).await? {
            return Err(RegistryError::NotFound(format!("webhook {id}")));
        }
        tracing::info!(webhook_id = %id, "webhook deleted");
        Ok(())
    }
}

/// Check a webhook definition before it is stored.
pub fn validate_webhook(webhook: &Webhook) -> Result<(), RegistryError> {
    if webhook.name.trim().is_empty() {
        return Err(RegistryError::Validation("name cannot be empty".to_string()));
    }

    let url = url::Url::parse(&webhook.url)
        .map_err(|e| RegistryError::Validation(format!("invalid url '{}': {e}", webhook.url)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(RegistryError::Validation(format!(
            "url scheme must be http or https, got '{}'",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(RegistryError::Validation("url must include a host".to_string()));
    }

    if webhook.timeout_seconds == 0 {
        return Err(RegistryError::Validation(
            "timeout_seconds must be greater than 0".to_string(),
        ));
    }

    if webhook.headers.iter().any(|(name, _)| name.trim().is_empty()) {
        return Err(RegistryError::Validation("header names cannot be empty".to_string()));
    }

    Ok(())
}
