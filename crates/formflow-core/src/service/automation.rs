//! Automation definition store.
//!
//! An automation is written together with its ordered step list. Steps are
//! validated as a whole: step orders are unique, every referenced webhook
//! exists, and conditional steps carry an expression that parses. Updating the
//! steps replaces the whole list.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use formflow_types::automation::{
    Automation, AutomationStep, AutomationWithSteps, CreateAutomationRequest, StepInput,
    UpdateAutomationRequest,
};
use formflow_types::error::{RegistryError, RepositoryError};

use crate::automation::condition::ConditionEvaluator;
use crate::repository::automation::AutomationRepository;
use crate::repository::webhook::WebhookRepository;

/// Service managing automations and their steps.
pub struct AutomationService<A: AutomationRepository, W: WebhookRepository> {
    automations: Arc<A>,
    webhooks: Arc<W>,
}

impl<A: AutomationRepository, W: WebhookRepository> Clone for AutomationService<A, W> {
    fn clone(&self) -> Self {
        Self {
            automations: Arc::clone(&self.automations),
            webhooks: Arc::clone(&self.webhooks),
        }
    }
}

impl<A: AutomationRepository, W: WebhookRepository> AutomationService<A, W> {
    pub fn new(automations: Arc<A>, webhooks: Arc<W>) -> Self {
        Self {
            automations,
            webhooks,
        }
    }

    pub async fn list_automations(&self) -> Result<Vec<AutomationWithSteps>, RegistryError> {
        Ok(self.automations.list_automations().await?)
    }

    pub async fn get_automation(&self, id: &Uuid) -> Result<AutomationWithSteps, RegistryError> {
        self.automations
            .get_automation_with_steps(id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("automation {id}")))
    }

    pub async fn create_automation(
        &self,
        request: CreateAutomationRequest,
    ) -> Result<AutomationWithSteps, RegistryError> {
        let name = validate_name(&request.name)?;
        let now = Utc::now();
        let automation = Automation {
            id: Uuid::now_v7(),
            name,
            description: request.description,
            is_active: request.is_active,
            trigger_type: request.trigger_type,
            trigger_config: request.trigger_config,
            created_at: now,
            updated_at: now,
        };
        let steps = self.build_steps(automation.id, &request.steps).await?;
        let definition = AutomationWithSteps { automation, steps };

        self.automations.create_automation(&definition).await?;
        tracing::info!(
            automation_id = %definition.automation.id,
            name = %definition.automation.name,
            steps = definition.steps.len(),
            "automation created"
        );
        Ok(definition)
    }

    /// Apply a partial update. A present `steps` list replaces all steps.
    pub async fn update_automation(
        &self,
        id: &Uuid,
        request: UpdateAutomationRequest,
    ) -> Result<AutomationWithSteps, RegistryError> {
        let mut definition = self.get_automation(id).await?;
        let automation = &mut definition.automation;

        if let Some(name) = request.name {
            automation.name = validate_name(&name)?;
        }
        if let Some(description) = request.description {
            automation.description = Some(description).filter(|d| !d.is_empty());
        }
        if let Some(is_active) = request.is_active {
            automation.is_active = is_active;
        }
        if let Some(trigger_type) = request.trigger_type {
            automation.trigger_type = trigger_type;
        }
        if let Some(trigger_config) = request.trigger_config {
            automation.trigger_config = trigger_config;
        }
        automation.updated_at = Utc::now();

        if let Some(steps) = request.steps {
            definition.steps = self.build_steps(*id, &steps).await?;
        }

        self.automations
            .update_automation(&definition)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => RegistryError::NotFound(format!("automation {id}")),
                other => other.into(),
            })?;
        Ok(definition)
    }

    /// Delete an automation with its steps. Past executions are kept.
    pub async fn delete_automation(&self, id: &Uuid) -> Result<(), RegistryError> {
        if !self.automations.delete_automation(id).await? {
            return Err(RegistryError::NotFound(format!("automation {id}")));
        }
        tracing::info!(automation_id = %id, "automation deleted");
        Ok(())
    }

    /// Validate step inputs and turn them into steps sorted by order.
    async fn build_steps(
        &self,
        automation_id: Uuid,
        inputs: &[StepInput],
    ) -> Result<Vec<AutomationStep>, RegistryError> {
        let mut seen = HashSet::new();
        let mut steps = Vec::with_capacity(inputs.len());

        for input in inputs {
            if !seen.insert(input.step_order) {
                return Err(RegistryError::Validation(format!(
                    "duplicate step_order {}",
                    input.step_order
                )));
            }

            if self.webhooks.get_webhook(&input.webhook_id).await?.is_none() {
                return Err(RegistryError::Validation(format!(
                    "step {} references unknown webhook {}",
                    input.step_order, input.webhook_id
                )));
            }

            let condition_config = input
                .condition_config
                .clone()
                .filter(|c| !c.expression.trim().is_empty());
            if input.is_conditional && condition_config.is_none() {
                return Err(RegistryError::Validation(format!(
                    "conditional step {} needs a condition expression",
                    input.step_order
                )));
            }
            if let Some(cfg) = &condition_config {
                ConditionEvaluator::new()
                    .check_syntax(&cfg.expression)
                    .map_err(|e| {
                        RegistryError::Validation(format!("step {}: {e}", input.step_order))
                    })?;
            }

            steps.push(AutomationStep {
                id: Uuid::now_v7(),
                automation_id,
                webhook_id: input.webhook_id,
                step_order: input.step_order,
                is_conditional: input.is_conditional,
                condition_config,
                delay_seconds: input.delay_seconds,
                retry_on_failure: input.retry_on_failure,
                continue_on_failure: input.continue_on_failure,
            });
        }

        steps.sort_by_key(|s| s.step_order);
        Ok(steps)
    }
}

fn validate_name(name: &str) -> Result<String, RegistryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RegistryError::Validation("name cannot be empty".to_string()));
    }
    Ok(name.to_string())
}
