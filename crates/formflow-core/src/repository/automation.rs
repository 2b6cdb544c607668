//! Automation definition repository trait.
//!
//! Automations and their steps are always written together so a step list
//! is never observed half-replaced.

use formflow_types::automation::{ActiveStep, Automation, AutomationWithSteps};
use formflow_types::error::RepositoryError;
use uuid::Uuid;

pub trait AutomationRepository: Send + Sync {
    /// Insert an automation and all of its steps atomically.
    fn create_automation(
        &self,
        automation: &AutomationWithSteps,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Load just the automation header (no steps).
    fn get_automation(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Automation>, RepositoryError>> + Send;

    /// Load an automation with its steps ordered by `step_order`.
    fn get_automation_with_steps(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<AutomationWithSteps>, RepositoryError>> + Send;

    /// List all automations with their steps, ordered by name.
    fn list_automations(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<AutomationWithSteps>, RepositoryError>> + Send;

    /// Replace the automation header and its whole step list atomically.
    fn update_automation(
        &self,
        automation: &AutomationWithSteps,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete an automation and its steps. Returns `true` if it existed.
    fn delete_automation(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Steps whose webhook is active, joined with that webhook, ascending by
    /// `step_order`. Steps pointing at inactive webhooks are left out.
    fn list_active_steps(
        &self,
        automation_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<ActiveStep>, RepositoryError>> + Send;
}
