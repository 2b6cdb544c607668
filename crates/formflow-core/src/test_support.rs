//! In-memory repositories and a scripted transport for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use formflow_types::automation::{
    ActiveStep, Automation, AutomationStep, AutomationWithSteps, TriggerType,
};
use formflow_types::error::RepositoryError;
use formflow_types::event::{EventFilter, SystemEvent};
use formflow_types::execution::{
    AutomationExecution, AutomationStepExecution, ExecutionStatus, StepExecutionStatus,
    StepOutcome,
};
use formflow_types::webhook::{HttpMethod, PayloadType, Webhook, WebhookHeaders};

use crate::automation::engine::ExecutionEngine;
use crate::automation::invoker::WebhookInvoker;
use crate::automation::transport::{
    InvocationError, WebhookRequest, WebhookResponse, WebhookTransport,
};
use crate::event::logger::EventLogger;
use crate::repository::automation::AutomationRepository;
use crate::repository::event::EventRepository;
use crate::repository::execution::ExecutionRepository;
use crate::repository::webhook::WebhookRepository;

pub type TestEngine =
    ExecutionEngine<MemoryStore, MemoryStore, MemoryStore, MemoryStore, ScriptedTransport>;

pub fn engine_with(
    transport: ScriptedTransport,
) -> (TestEngine, Arc<MemoryStore>, Arc<ScriptedTransport>) {
    engine_with_store(MemoryStore::default(), transport)
}

pub fn engine_with_store(
    store: MemoryStore,
    transport: ScriptedTransport,
) -> (TestEngine, Arc<MemoryStore>, Arc<ScriptedTransport>) {
    let store = Arc::new(store);
    let transport = Arc::new(transport);
    let events = EventLogger::new(Arc::clone(&store));
    let invoker = WebhookInvoker::new(Arc::clone(&transport), events.clone());
    let engine = ExecutionEngine::new(
        Arc::clone(&store),
        Arc::clone(&store),
        Arc::clone(&store),
        events,
        invoker,
    );
    (engine, store, transport)
}

pub fn sample_webhook(url: &str) -> Webhook {
    let now = Utc::now();
    Webhook {
        id: Uuid::now_v7(),
        name: format!("hook {url}"),
        url: url.to_string(),
        method: HttpMethod::Post,
        is_active: true,
        retry_enabled: false,
        retry_count: 0,
        retry_delay_seconds: 0,
        timeout_seconds: 5,
        headers: WebhookHeaders::new(),
        payload_type: PayloadType::Json,
        payload_template: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_step(automation_id: Uuid, webhook_id: Uuid, step_order: u32) -> AutomationStep {
    AutomationStep {
        id: Uuid::now_v7(),
        automation_id,
        webhook_id,
        step_order,
        is_conditional: false,
        condition_config: None,
        delay_seconds: 0,
        retry_on_failure: true,
        continue_on_failure: false,
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct State {
    webhooks: Vec<Webhook>,
    automations: Vec<Automation>,
    steps: Vec<AutomationStep>,
    executions: Vec<AutomationExecution>,
    step_executions: Vec<AutomationStepExecution>,
    events: Vec<SystemEvent>,
}

/// Implements every repository trait over plain vectors.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_events: bool,
}

impl MemoryStore {
    pub fn failing_events() -> Self {
        Self {
            fail_events: true,
            ..Default::default()
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Create an automation with one step per `(url, continue_on_failure)`,
    /// reusing webhooks by URL. Step orders are 1-based.
    pub fn seed_automation(&self, name: &str, is_active: bool, steps: &[(&str, bool)]) -> Uuid {
        let now = Utc::now();
        let automation_id = Uuid::now_v7();
        let mut state = self.lock();
        state.automations.push(Automation {
            id: automation_id,
            name: name.to_string(),
            description: None,
            is_active,
            trigger_type: TriggerType::Manual,
            trigger_config: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        });
        for (i, (url, continue_on_failure)) in steps.iter().enumerate() {
            let webhook_id = match state.webhooks.iter().find(|w| w.url == *url) {
                Some(w) => w.id,
                None => {
                    let w = sample_webhook(url);
                    let id = w.id;
                    state.webhooks.push(w);
                    id
                }
            };
            let mut step = sample_step(automation_id, webhook_id, i as u32 + 1);
            step.continue_on_failure = *continue_on_failure;
            state.steps.push(step);
        }
        automation_id
    }

    pub fn update_step(&self, automation_id: Uuid, step_order: u32, f: impl FnOnce(&mut AutomationStep)) {
        let mut state = self.lock();
        let step = state
            .steps
            .iter_mut()
            .find(|s| s.automation_id == automation_id && s.step_order == step_order)
            .unwrap();
        f(step);
    }

    pub fn update_webhook(&self, url: &str, f: impl FnOnce(&mut Webhook)) {
        let mut state = self.lock();
        let webhook = state.webhooks.iter_mut().find(|w| w.url == url).unwrap();
        f(webhook);
    }

    pub fn webhook_id(&self, url: &str) -> Uuid {
        self.lock().webhooks.iter().find(|w| w.url == url).unwrap().id
    }

    pub fn step_executions(&self, execution_id: Uuid) -> Vec<AutomationStepExecution> {
        self.lock()
            .step_executions
            .iter()
            .filter(|s| s.execution_id == execution_id)
            .cloned()
            .collect()
    }

    pub fn execution(&self, id: Uuid) -> Option<AutomationExecution> {
        self.lock().executions.iter().find(|e| e.id == id).cloned()
    }

    pub fn latest_execution(&self) -> Option<AutomationExecution> {
        self.lock().executions.last().cloned()
    }

    pub fn execution_count(&self) -> usize {
        self.lock().executions.len()
    }

    pub fn events(&self) -> Vec<SystemEvent> {
        self.lock().events.clone()
    }

    fn steps_of(state: &State, automation_id: &Uuid) -> Vec<AutomationStep> {
        let mut steps: Vec<_> = state
            .steps
            .iter()
            .filter(|s| &s.automation_id == automation_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.step_order);
        steps
    }
}

impl WebhookRepository for MemoryStore {
    async fn create_webhook(&self, webhook: &Webhook) -> Result<(), RepositoryError> {
        self.lock().webhooks.push(webhook.clone());
        Ok(())
    }

    async fn get_webhook(&self, id: &Uuid) -> Result<Option<Webhook>, RepositoryError> {
        Ok(self.lock().webhooks.iter().find(|w| &w.id == id).cloned())
    }

    async fn list_webhooks(&self, active_only: bool) -> Result<Vec<Webhook>, RepositoryError> {
        let mut hooks: Vec<_> = self
            .lock()
            .webhooks
            .iter()
            .filter(|w| !active_only || w.is_active)
            .cloned()
            .collect();
        hooks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(hooks)
    }

    async fn update_webhook(&self, webhook: &Webhook) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        let slot = state
            .webhooks
            .iter_mut()
            .find(|w| w.id == webhook.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = webhook.clone();
        Ok(())
    }

    async fn delete_webhook(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let mut state = self.lock();
        if state.steps.iter().any(|s| &s.webhook_id == id) {
            return Err(RepositoryError::Conflict(
                "webhook is referenced by automation steps".to_string(),
            ));
        }
        let before = state.webhooks.len();
        state.webhooks.retain(|w| &w.id != id);
        Ok(state.webhooks.len() != before)
    }
}

impl AutomationRepository for MemoryStore {
    async fn create_automation(&self, automation: &AutomationWithSteps) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        state.automations.push(automation.automation.clone());
        state.steps.extend(automation.steps.iter().cloned());
        Ok(())
    }

    async fn get_automation(&self, id: &Uuid) -> Result<Option<Automation>, RepositoryError> {
        Ok(self.lock().automations.iter().find(|a| &a.id == id).cloned())
    }

    async fn get_automation_with_steps(
        &self,
        id: &Uuid,
    ) -> Result<Option<AutomationWithSteps>, RepositoryError> {
        let state = self.lock();
        Ok(state
            .automations
            .iter()
            .find(|a| &a.id == id)
            .map(|a| AutomationWithSteps {
                automation: a.clone(),
                steps: Self::steps_of(&state, id),
            }))
    }

    async fn list_automations(&self) -> Result<Vec<AutomationWithSteps>, RepositoryError> {
        let state = self.lock();
        Ok(state
            .automations
            .iter()
            .map(|a| AutomationWithSteps {
                automation: a.clone(),
                steps: Self::steps_of(&state, &a.id),
            })
            .collect())
    }

    async fn update_automation(&self, automation: &AutomationWithSteps) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        let id = automation.automation.id;
        let slot = state
            .automations
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = automation.automation.clone();
        state.steps.retain(|s| s.automation_id != id);
        state.steps.extend(automation.steps.iter().cloned());
        Ok(())
    }

    async fn delete_automation(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let mut state = self.lock();
        let before = state.automations.len();
        state.automations.retain(|a| &a.id != id);
        state.steps.retain(|s| &s.automation_id != id);
        Ok(state.automations.len() != before)
    }

    async fn list_active_steps(&self, automation_id: &Uuid) -> Result<Vec<ActiveStep>, RepositoryError> {
        let state = self.lock();
        Ok(Self::steps_of(&state, automation_id)
            .into_iter()
            .filter_map(|step| {
                let webhook = state
                    .webhooks
                    .iter()
                    .find(|w| w.id == step.webhook_id && w.is_active)?
                    .clone();
                Some(ActiveStep { step, webhook })
            })
            .collect())
    }
}

impl ExecutionRepository for MemoryStore {
    async fn create_execution(&self, execution: &AutomationExecution) -> Result<(), RepositoryError> {
        self.lock().executions.push(execution.clone());
        Ok(())
    }

    async fn finish_execution(
        &self,
        id: &Uuid,
        status: ExecutionStatus,
        error_message: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        let row = state
            .executions
            .iter_mut()
            .find(|e| &e.id == id && e.status == ExecutionStatus::Running)
            .ok_or(RepositoryError::NotFound)?;
        row.status = status;
        row.error_message = error_message.map(str::to_string);
        row.completed_at = Some(completed_at);
        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<AutomationExecution>, RepositoryError> {
        Ok(self.execution(*id))
    }

    async fn list_executions(
        &self,
        automation_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<AutomationExecution>, RepositoryError> {
        Ok(self
            .lock()
            .executions
            .iter()
            .rev()
            .filter(|e| &e.automation_id == automation_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn create_step_execution(&self, step: &AutomationStepExecution) -> Result<(), RepositoryError> {
        self.lock().step_executions.push(step.clone());
        Ok(())
    }

    async fn finish_step_execution(
        &self,
        id: &Uuid,
        outcome: &StepOutcome,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        let row = state
            .step_executions
            .iter_mut()
            .find(|s| &s.id == id && s.status == StepExecutionStatus::Running)
            .ok_or(RepositoryError::NotFound)?;
        row.status = outcome.status;
        row.webhook_response_status = outcome.response_status;
        row.webhook_response_body = outcome.response_body.clone();
        row.error_message = outcome.error_message.clone();
        row.attempts = outcome.attempts;
        row.completed_at = Some(completed_at);
        Ok(())
    }

    async fn list_step_executions(
        &self,
        execution_id: &Uuid,
    ) -> Result<Vec<AutomationStepExecution>, RepositoryError> {
        Ok(self.step_executions(*execution_id))
    }

    async fn list_step_executions_for_automation(
        &self,
        automation_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<AutomationStepExecution>, RepositoryError> {
        let state = self.lock();
        let runs: Vec<Uuid> = state
            .executions
            .iter()
            .filter(|e| &e.automation_id == automation_id)
            .map(|e| e.id)
            .collect();
        Ok(state
            .step_executions
            .iter()
            .rev()
            .filter(|s| runs.contains(&s.execution_id))
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

impl EventRepository for MemoryStore {
    async fn insert_event(&self, event: &SystemEvent) -> Result<(), RepositoryError> {
        if self.fail_events {
            return Err(RepositoryError::Query("event table unavailable".to_string()));
        }
        self.lock().events.push(event.clone());
        Ok(())
    }

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<SystemEvent>, RepositoryError> {
        Ok(self
            .lock()
            .events
            .iter()
            .rev()
            .filter(|e| {
                filter
                    .event_type
                    .as_ref()
                    .is_none_or(|t| &e.event_type == t)
            })
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// ScriptedTransport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Scripted {
    Respond(u16, String),
    Fail(String),
}

/// Answers requests from per-URL scripts, falling back to a shared script.
///
/// Each script is consumed front to back; its last entry repeats forever.
/// With no applicable script the answer is `200` with an empty body.
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    fallback: Mutex<VecDeque<Scripted>>,
    latency: Duration,
    sent: Mutex<Vec<WebhookRequest>>,
}

impl ScriptedTransport {
    fn from_script(script: VecDeque<Scripted>) -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            fallback: Mutex::new(script),
            latency: Duration::ZERO,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn statuses(statuses: &[u16]) -> Self {
        Self::from_script(
            statuses
                .iter()
                .map(|s| Scripted::Respond(*s, String::new()))
                .collect(),
        )
    }

    pub fn bodies(responses: &[(u16, String)]) -> Self {
        Self::from_script(
            responses
                .iter()
                .map(|(s, b)| Scripted::Respond(*s, b.clone()))
                .collect(),
        )
    }

    pub fn transport_error(message: &str) -> Self {
        Self::from_script(VecDeque::from([Scripted::Fail(message.to_string())]))
    }

    pub fn route(self, url: &str, statuses: &[u16]) -> Self {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            statuses
                .iter()
                .map(|s| Scripted::Respond(*s, String::new()))
                .collect(),
        );
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<WebhookRequest> {
        self.sent.lock().unwrap().clone()
    }

    fn next(&self, url: &str) -> Scripted {
        fn take(script: &mut VecDeque<Scripted>) -> Option<Scripted> {
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        }

        let mut routes = self.routes.lock().unwrap();
        if let Some(script) = routes.get_mut(url) {
            if let Some(next) = take(script) {
                return next;
            }
        }
        drop(routes);
        take(&mut self.fallback.lock().unwrap()).unwrap_or(Scripted::Respond(200, String::new()))
    }
}

impl WebhookTransport for ScriptedTransport {
    async fn send(&self, request: WebhookRequest) -> Result<WebhookResponse, InvocationError> {
        let next = self.next(&request.url);
        self.sent.lock().unwrap().push(request);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match next {
            Scripted::Respond(status, body) => Ok(WebhookResponse { status, body }),
            Scripted::Fail(message) => Err(InvocationError::Transport(message)),
        }
    }
}
