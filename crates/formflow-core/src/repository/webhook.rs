//! Webhook repository trait definition.

use formflow_types::error::RepositoryError;
use formflow_types::webhook::Webhook;
use uuid::Uuid;

/// Repository trait for webhook persistence.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait WebhookRepository: Send + Sync {
    /// Insert a new webhook.
    fn create_webhook(
        &self,
        webhook: &Webhook,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_webhook(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Webhook>, RepositoryError>> + Send;

    /// List webhooks ordered by name.
    fn list_webhooks(
        &self,
        active_only: bool,
    ) -> impl std::future::Future<Output = Result<Vec<Webhook>, RepositoryError>> + Send;

    /// Replace a webhook's fields. Returns `NotFound` if it does not exist.
    fn update_webhook(
        &self,
        webhook: &Webhook,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a webhook. Returns `true` if it existed.
    ///
    /// Fails with `Conflict` while any automation step still references it.
    fn delete_webhook(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
