//! Execution engine: runs an automation's steps in order.
//!
//! # Execution flow
//!
//! 1. Load the automation; missing or inactive is a configuration error and
//!    nothing is written.
//! 2. Load the steps whose webhook is active, ordered by `step_order`; none is
//!    a configuration error.
//! 3. Create the `AutomationExecution` row (running).
//! 4. For each step, strictly one after another: create the step row, evaluate
//!    the condition (skip on false), wait the step delay, render the payload,
//!    invoke the webhook, persist the outcome. A failure stops the run unless
//!    the step has `continue_on_failure`.
//! 5. Finalize the run: completed only if every attempted step succeeded and
//!    none was cut short; failed otherwise.
//!
//! Each run owns a `CancellationToken`, checked between steps and during the
//! delay and retry backoff sleeps. In-flight HTTP calls are never aborted.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use formflow_types::automation::{ActiveStep, Automation};
use formflow_types::event::{NewSystemEvent, event_category, event_name, event_type};
use formflow_types::execution::{
    ExecutionResult, ExecutionStatus, InvocationResult, StepExecutionStatus, StepOutcome,
    TriggerOrigin,
};

use crate::event::logger::EventLogger;
use crate::repository::automation::AutomationRepository;
use crate::repository::event::EventRepository;
use crate::repository::execution::ExecutionRepository;
use crate::repository::webhook::WebhookRepository;

use super::checkpoint::{CheckpointError, CheckpointManager};
use super::condition::{ConditionContext, ConditionError, ConditionEvaluator, PriorStepOutcome};
use super::invoker::{InvocationContext, WebhookInvoker, sleep_or_cancel};
use super::retry::RetryPolicy;
use super::template::{self, TemplateError};
use super::transport::WebhookTransport;

pub const AUTOMATION_NOT_FOUND: &str = "automation not found or inactive";
pub const NO_ACTIVE_STEPS: &str = "no active steps";
pub const WEBHOOK_NOT_FOUND: &str = "webhook not found";
pub const CANCELLED: &str = "cancelled";

// ---------------------------------------------------------------------------
// Errors and reports
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The run could not start. No execution row exists.
    #[error("{0}")]
    Configuration(String),

    /// An execution or step row could not be written.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Condition, template, or other failure while processing a step.
    #[error("unexpected error: {0}")]
    Unexpected(String),

    #[error("{CANCELLED}")]
    Cancelled,

    /// The run started and was finalized as failed, then ended on `source`.
    /// `report` is what the run recorded before it stopped.
    #[error("{source}")]
    Aborted {
        report: Box<ExecutionReport>,
        source: Box<EngineError>,
    },
}

impl From<CheckpointError> for EngineError {
    fn from(e: CheckpointError) -> Self {
        EngineError::Persistence(e.to_string())
    }
}

impl From<ConditionError> for EngineError {
    fn from(e: ConditionError) -> Self {
        EngineError::Unexpected(e.to_string())
    }
}

impl From<TemplateError> for EngineError {
    fn from(e: TemplateError) -> Self {
        EngineError::Unexpected(e.to_string())
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub execution_id: Uuid,
    pub automation_id: Uuid,
    pub status: ExecutionStatus,
    pub completed_steps: u32,
    pub total_steps: u32,
    pub error_message: Option<String>,
    pub duration_ms: u64,
}

impl ExecutionReport {
    pub fn into_result(self) -> ExecutionResult {
        ExecutionResult {
            success: self.status == ExecutionStatus::Completed,
            execution_id: Some(self.execution_id),
            completed_steps: self.completed_steps,
            total_steps: self.total_steps,
            error_message: self.error_message,
            execution_time_ms: self.duration_ms,
        }
    }
}

/// A finished run plus the error that ended it, if any.
struct RunOutcome {
    report: ExecutionReport,
    fault: Option<EngineError>,
}

/// What the loop needs to know about a processed step.
struct StepRun {
    status: StepExecutionStatus,
    status_code: Option<u16>,
    error_message: Option<String>,
}

// ---------------------------------------------------------------------------
// ExecutionEngine
// ---------------------------------------------------------------------------

struct EngineInner<W, A, X, E, T>
where
    W: WebhookRepository,
    A: AutomationRepository,
    X: ExecutionRepository,
    E: EventRepository,
    T: WebhookTransport,
{
    webhooks: Arc<W>,
    automations: Arc<A>,
    checkpoint: CheckpointManager<X>,
    invoker: WebhookInvoker<T, E>,
    events: EventLogger<E>,
    /// Cancellation tokens keyed by execution id, present while a run is live.
    cancellation_tokens: DashMap<Uuid, CancellationToken>,
}

/// Orchestrates automation runs. Cheap to clone; clones share state.
pub struct ExecutionEngine<W, A, X, E, T>
where
    W: WebhookRepository,
    A: AutomationRepository,
    X: ExecutionRepository,
    E: EventRepository,
    T: WebhookTransport,
{
    inner: Arc<EngineInner<W, A, X, E, T>>,
}

impl<W, A, X, E, T> Clone for ExecutionEngine<W, A, X, E, T>
where
    W: WebhookRepository,
    A: AutomationRepository,
    X: ExecutionRepository,
    E: EventRepository,
    T: WebhookTransport,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W, A, X, E, T> ExecutionEngine<W, A, X, E, T>
where
    W: WebhookRepository + 'static,
    A: AutomationRepository + 'static,
    X: ExecutionRepository + 'static,
    E: EventRepository + 'static,
    T: WebhookTransport + 'static,
{
    pub fn new(
        webhooks: Arc<W>,
        automations: Arc<A>,
        executions: Arc<X>,
        events: EventLogger<E>,
        invoker: WebhookInvoker<T, E>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                webhooks,
                automations,
                checkpoint: CheckpointManager::new(executions),
                invoker,
                events,
                cancellation_tokens: DashMap::new(),
            }),
        }
    }

    /// Read access to execution records.
    pub fn executions(&self) -> &X {
        self.inner.checkpoint.repo()
    }

    /// Number of runs currently in flight.
    pub fn active_runs(&self) -> usize {
        self.inner.cancellation_tokens.len()
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Run an automation to completion.
    ///
    /// Returns the run report, or the error that ended the run. When an
    /// execution row was created, it is finalized before the error is
    /// returned and the error is `Aborted`, carrying the report.
    pub async fn trigger(
        &self,
        automation_id: Uuid,
        trigger_data: Value,
        origin: TriggerOrigin,
    ) -> Result<ExecutionReport, EngineError> {
        let outcome = self
            .run(Uuid::now_v7(), automation_id, trigger_data, origin)
            .await?;
        match outcome.fault {
            Some(fault) => Err(EngineError::Aborted {
                report: Box::new(outcome.report),
                source: Box::new(fault),
            }),
            None => Ok(outcome.report),
        }
    }

    /// Run an automation to completion and return a structured result.
    /// Never fails; every error is reflected in the result.
    pub async fn execute(
        &self,
        automation_id: Uuid,
        trigger_data: Value,
        origin: TriggerOrigin,
    ) -> ExecutionResult {
        self.execute_with_id(Uuid::now_v7(), automation_id, trigger_data, origin)
            .await
    }

    /// Start a run on its own task and return immediately.
    ///
    /// The execution id is reserved up front so the caller can poll or cancel
    /// it. If the run is rejected before it starts, no row is written under
    /// that id and the handle resolves to the rejection.
    pub fn spawn(
        &self,
        automation_id: Uuid,
        trigger_data: Value,
        origin: TriggerOrigin,
    ) -> (Uuid, JoinHandle<ExecutionResult>) {
        let execution_id = Uuid::now_v7();
        self.inner
            .cancellation_tokens
            .insert(execution_id, CancellationToken::new());

        let engine = self.clone();
        let handle = tokio::spawn(async move {
            engine
                .execute_with_id(execution_id, automation_id, trigger_data, origin)
                .await
        });

        (execution_id, handle)
    }

    /// Request cancellation of a live run. Returns `false` if no run with
    /// that id is in flight.
    pub fn cancel(&self, execution_id: Uuid) -> bool {
        match self.inner.cancellation_tokens.get(&execution_id) {
            Some(token) => {
                token.cancel();
                tracing::info!(execution_id = %execution_id, "cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Invoke a single webhook once with `payload`, outside any automation.
    ///
    /// Writes no execution rows and changes no definitions. Audit events are
    /// still emitted.
    pub async fn test_webhook(
        &self,
        webhook_id: Uuid,
        payload: Value,
        origin: TriggerOrigin,
    ) -> InvocationResult {
        let webhook = match self.inner.webhooks.get_webhook(&webhook_id).await {
            Ok(Some(w)) => w,
            Ok(None) => return InvocationResult::not_sent(WEBHOOK_NOT_FOUND),
            Err(e) => {
                tracing::error!(webhook_id = %webhook_id, error = %e, "failed to load webhook");
                return InvocationResult::not_sent(format!("failed to load webhook: {e}"));
            }
        };

        let payload = match &webhook.payload_template {
            Some(t) => match template::render(t, &payload) {
                Ok(rendered) => rendered,
                Err(e) => return InvocationResult::not_sent(e.to_string()),
            },
            None => payload,
        };

        tracing::info!(webhook_id = %webhook_id, url = webhook.url.as_str(), "testing webhook");

        let ctx = InvocationContext {
            user_id: user_id_of(&payload),
            origin,
            ..Default::default()
        };
        self.inner
            .invoker
            .invoke(&webhook, &payload, RetryPolicy::SINGLE, &ctx)
            .await
    }

    // -----------------------------------------------------------------------
    // Run loop
    // -----------------------------------------------------------------------

    async fn execute_with_id(
        &self,
        execution_id: Uuid,
        automation_id: Uuid,
        trigger_data: Value,
        origin: TriggerOrigin,
    ) -> ExecutionResult {
        let started = Instant::now();
        match self
            .run(execution_id, automation_id, trigger_data, origin)
            .await
        {
            Ok(outcome) => outcome.report.into_result(),
            Err(e) => ExecutionResult::rejected(e.to_string(), started.elapsed().as_millis() as u64),
        }
    }

    /// Drive one run. `Err` means no execution row was created.
    async fn run(
        &self,
        execution_id: Uuid,
        automation_id: Uuid,
        trigger_data: Value,
        origin: TriggerOrigin,
    ) -> Result<RunOutcome, EngineError> {
        let started = Instant::now();
        let token = self
            .inner
            .cancellation_tokens
            .entry(execution_id)
            .or_default()
            .clone();

        let prepared = self.prepare(automation_id).await;
        let (automation, steps) = match prepared {
            Ok(p) => p,
            Err(e) => {
                self.inner.cancellation_tokens.remove(&execution_id);
                tracing::info!(automation_id = %automation_id, reason = %e, "automation not started");
                return Err(e);
            }
        };

        if let Err(e) = self
            .inner
            .checkpoint
            .start_execution(execution_id, automation_id, &trigger_data)
            .await
        {
            self.inner.cancellation_tokens.remove(&execution_id);
            tracing::error!(automation_id = %automation_id, error = %e, "failed to create execution");
            return Err(e.into());
        }

        let total_steps = steps.len() as u32;
        let user_id = user_id_of(&trigger_data);

        tracing::info!(
            execution_id = %execution_id,
            automation_id = %automation_id,
            automation = automation.name.as_str(),
            total_steps,
            "starting automation execution"
        );

        self.emit_run_event(
            event_name::AUTOMATION_STARTED,
            format!("Automation '{}' started", automation.name),
            json!({
                "automation_id": automation_id.to_string(),
                "automation_name": automation.name,
                "execution_id": execution_id.to_string(),
                "trigger_type": automation.trigger_type.as_str(),
                "totalSteps": total_steps,
                "user_id": user_id,
            }),
            &origin,
        )
        .await;

        let mut cond_ctx = ConditionContext::new(execution_id, automation_id, trigger_data.clone());
        let mut completed_steps: u32 = 0;
        let mut first_failure: Option<String> = None;
        let mut blocking_failure: Option<String> = None;
        let mut fault: Option<EngineError> = None;

        for active in &steps {
            if token.is_cancelled() {
                fault = Some(EngineError::Cancelled);
                break;
            }

            let step = &active.step;
            let ctx = InvocationContext {
                origin: origin.clone(),
                execution_id: Some(execution_id),
                step_order: Some(step.step_order),
                user_id: user_id.clone(),
                cancel: token.clone(),
            };

            let step_run = match self
                .run_step(execution_id, active, &trigger_data, &cond_ctx, &ctx)
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    fault = Some(e);
                    break;
                }
            };

            cond_ctx.record(
                step.step_order,
                PriorStepOutcome {
                    status: step_run.status,
                    status_code: step_run.status_code,
                },
            );

            match step_run.status {
                StepExecutionStatus::Completed => completed_steps += 1,
                StepExecutionStatus::Failed => {
                    let message = format!(
                        "step {} ({}) failed: {}",
                        step.step_order,
                        active.webhook.name,
                        step_run.error_message.as_deref().unwrap_or("unknown error")
                    );
                    first_failure.get_or_insert_with(|| message.clone());

                    if token.is_cancelled() {
                        fault = Some(EngineError::Cancelled);
                        break;
                    }
                    if !step.continue_on_failure {
                        tracing::info!(
                            execution_id = %execution_id,
                            step_order = step.step_order,
                            "step failed, stopping execution"
                        );
                        blocking_failure = Some(message);
                        break;
                    }
                }
                StepExecutionStatus::Skipped | StepExecutionStatus::Running => {}
            }
        }

        let (status, error_message) = match (&fault, blocking_failure.or(first_failure)) {
            (Some(f), _) => (ExecutionStatus::Failed, Some(f.to_string())),
            (None, Some(msg)) => (ExecutionStatus::Failed, Some(msg)),
            (None, None) => (ExecutionStatus::Completed, None),
        };

        if let Err(e) = self
            .inner
            .checkpoint
            .finish_execution(execution_id, status, error_message.as_deref())
            .await
        {
            tracing::error!(execution_id = %execution_id, error = %e, "failed to finalize execution");
            fault.get_or_insert(e.into());
        }

        if let Some(f) = &fault {
            tracing::error!(execution_id = %execution_id, error = %f, "automation execution aborted");
        }

        self.inner.cancellation_tokens.remove(&execution_id);

        let duration_ms = started.elapsed().as_millis() as u64;
        let (name, description) = match status {
            ExecutionStatus::Completed => (
                event_name::AUTOMATION_COMPLETED,
                format!("Automation '{}' completed", automation.name),
            ),
            _ => (
                event_name::AUTOMATION_FAILED,
                format!("Automation '{}' failed", automation.name),
            ),
        };
        self.emit_run_event(
            name,
            description,
            json!({
                "automation_id": automation_id.to_string(),
                "execution_id": execution_id.to_string(),
                "completedSteps": completed_steps,
                "totalSteps": total_steps,
                "durationMs": duration_ms,
                "error": error_message,
                "user_id": user_id,
            }),
            &origin,
        )
        .await;

        tracing::info!(
            execution_id = %execution_id,
            status = %status,
            completed_steps,
            total_steps,
            duration_ms,
            "automation execution finished"
        );

        Ok(RunOutcome {
            report: ExecutionReport {
                execution_id,
                automation_id,
                status,
                completed_steps,
                total_steps,
                error_message,
                duration_ms,
            },
            fault,
        })
    }

    /// Load the automation and its runnable steps.
    async fn prepare(&self, automation_id: Uuid) -> Result<(Automation, Vec<ActiveStep>), EngineError> {
        let automation = self
            .inner
            .automations
            .get_automation(&automation_id)
            .await
            .map_err(|e| EngineError::Persistence(e.to_string()))?;

        let automation = match automation {
            Some(a) if a.is_active => a,
            _ => return Err(EngineError::Configuration(AUTOMATION_NOT_FOUND.to_string())),
        };

        let steps = self
            .inner
            .automations
            .list_active_steps(&automation_id)
            .await
            .map_err(|e| EngineError::Persistence(e.to_string()))?;

        if steps.is_empty() {
            return Err(EngineError::Configuration(NO_ACTIVE_STEPS.to_string()));
        }

        Ok((automation, steps))
    }

    /// Process one step: row, condition, delay, invoke, outcome.
    ///
    /// On `Err`, the step row (if created) has already been marked failed.
    async fn run_step(
        &self,
        execution_id: Uuid,
        active: &ActiveStep,
        trigger_data: &Value,
        cond_ctx: &ConditionContext,
        ctx: &InvocationContext,
    ) -> Result<StepRun, EngineError> {
        let step = &active.step;
        let webhook = &active.webhook;
        let checkpoint = &self.inner.checkpoint;

        let row_id = checkpoint.step_start(execution_id, step).await?;

        if step.is_conditional {
            let should_run = match step.condition_config.as_ref() {
                Some(cfg) if !cfg.expression.trim().is_empty() => {
                    evaluate_condition(&cfg.expression, cond_ctx)
                }
                _ => Ok(true),
            };

            match should_run {
                Ok(true) => {}
                Ok(false) => {
                    checkpoint.step_skipped(row_id).await?;
                    tracing::debug!(
                        execution_id = %execution_id,
                        step_order = step.step_order,
                        "condition false, step skipped"
                    );
                    self.emit_run_event(
                        event_name::STEP_SKIPPED,
                        format!("Step {} skipped", step.step_order),
                        json!({
                            "execution_id": execution_id.to_string(),
                            "step_id": step.id.to_string(),
                            "step_order": step.step_order,
                            "webhook_id": webhook.id.to_string(),
                            "user_id": ctx.user_id,
                        }),
                        &ctx.origin,
                    )
                    .await;
                    return Ok(StepRun {
                        status: StepExecutionStatus::Skipped,
                        status_code: None,
                        error_message: None,
                    });
                }
                Err(e) => return Err(self.fail_step(row_id, e.into()).await),
            }
        }

        if step.delay_seconds > 0 {
            let delay = std::time::Duration::from_secs(u64::from(step.delay_seconds));
            if !sleep_or_cancel(delay, &ctx.cancel).await {
                return Err(self.fail_step(row_id, EngineError::Cancelled).await);
            }
        }

        let payload = match &webhook.payload_template {
            Some(t) => match template::render(t, trigger_data) {
                Ok(p) => p,
                Err(e) => return Err(self.fail_step(row_id, e.into()).await),
            },
            None => trigger_data.clone(),
        };

        let result = self
            .inner
            .invoker
            .invoke(
                webhook,
                &payload,
                RetryPolicy::for_step(webhook, step.retry_on_failure),
                ctx,
            )
            .await;

        let outcome = StepOutcome::from_invocation(&result);
        checkpoint.step_finished(row_id, &outcome).await?;

        Ok(StepRun {
            status: outcome.status,
            status_code: outcome.response_status,
            error_message: outcome.error_message,
        })
    }

    /// Mark the step failed with `error`'s text and hand the error back.
    async fn fail_step(&self, row_id: Uuid, error: EngineError) -> EngineError {
        let message = match &error {
            EngineError::Unexpected(inner) => inner.clone(),
            other => other.to_string(),
        };
        if let Err(e) = self
            .inner
            .checkpoint
            .step_finished(row_id, &StepOutcome::failed(message, 0))
            .await
        {
            tracing::error!(step_execution_id = %row_id, error = %e, "failed to record step failure");
        }
        error
    }

    async fn emit_run_event(&self, name: &str, description: String, metadata: Value, origin: &TriggerOrigin) {
        self.inner
            .events
            .log_event(
                NewSystemEvent::new(event_type::AUTOMATION, event_category::INTEGRATION, name)
                    .with_description(description)
                    .with_metadata(metadata)
                    .with_origin(origin),
            )
            .await;
    }
}

/// Evaluate a step condition. The evaluator is built per call and never held
/// across an await.
fn evaluate_condition(expression: &str, ctx: &ConditionContext) -> Result<bool, ConditionError> {
    ConditionEvaluator::new().evaluate(expression, ctx)
}

/// `user_id` (or `userId`) from trigger data, for event filtering.
fn user_id_of(trigger_data: &Value) -> Option<String> {
    let raw = trigger_data
        .get("user_id")
        .or_else(|| trigger_data.get("userId"))?;
    match raw {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemoryStore, ScriptedTransport, TestEngine, engine_with};
    use formflow_types::automation::ConditionConfig;
    use std::time::Duration;

    fn setup(transport: ScriptedTransport) -> (TestEngine, Arc<MemoryStore>, Arc<ScriptedTransport>) {
        engine_with(transport)
    }

    #[tokio::test]
    async fn test_all_steps_succeed() {
        let (engine, store, transport) = setup(ScriptedTransport::statuses(&[200]));
        let automation = store.seed_automation("Welcome", true, &[("https://a.test", false), ("https://b.test", false), ("https://c.test", false)]);

        let report = engine
            .trigger(automation, json!({"email": "a@b.c"}), TriggerOrigin::default())
            .await
            .unwrap();

        assert_eq!(report.status, ExecutionStatus::Completed);
        assert_eq!(report.completed_steps, 3);
        assert_eq!(report.total_steps, 3);
        assert!(report.error_message.is_none());
        assert_eq!(transport.calls(), 3);
        assert_eq!(store.step_executions(report.execution_id).len(), 3);
        assert_eq!(engine.active_runs(), 0);
    }

    #[tokio::test]
    async fn test_failure_stops_run() {
        let transport = ScriptedTransport::statuses(&[200]).route("https://a.test", &[500]);
        let (engine, store, _) = setup(transport);
        let automation = store.seed_automation("Welcome", true, &[("https://a.test", false), ("https://b.test", false)]);

        let report = engine
            .trigger(automation, json!({}), TriggerOrigin::default())
            .await
            .unwrap();

        assert_eq!(report.status, ExecutionStatus::Failed);
        assert_eq!(report.completed_steps, 0);
        let rows = store.step_executions(report.execution_id);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, StepExecutionStatus::Failed);
        assert_eq!(rows[0].webhook_response_status, Some(500));
        assert!(report.error_message.unwrap().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn test_continue_on_failure_still_fails_run() {
        let transport = ScriptedTransport::statuses(&[200]).route("https://a.test", &[500]);
        let (engine, store, _) = setup(transport);
        let automation = store.seed_automation("Welcome", true, &[("https://a.test", true), ("https://b.test", false)]);

        let report = engine
            .trigger(automation, json!({}), TriggerOrigin::default())
            .await
            .unwrap();

        assert_eq!(report.status, ExecutionStatus::Failed);
        assert_eq!(report.completed_steps, 1);
        let statuses: Vec<_> = store
            .step_executions(report.execution_id)
            .into_iter()
            .map(|r| r.status)
            .collect();
        assert_eq!(statuses, vec![StepExecutionStatus::Failed, StepExecutionStatus::Completed]);
    }

    #[tokio::test]
    async fn test_inactive_automation_writes_nothing() {
        let (engine, store, transport) = setup(ScriptedTransport::statuses(&[200]));
        let automation = store.seed_automation("Welcome", false, &[("https://a.test", false)]);

        let err = engine
            .trigger(automation, json!({}), TriggerOrigin::default())
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Configuration(ref m) if m == AUTOMATION_NOT_FOUND));
        assert_eq!(store.execution_count(), 0);
        assert_eq!(transport.calls(), 0);

        let result = engine.execute(automation, json!({}), TriggerOrigin::default()).await;
        assert!(!result.success);
        assert!(result.execution_id.is_none());
        assert_eq!(result.error_message.as_deref(), Some(AUTOMATION_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_no_active_steps() {
        let (engine, store, _) = setup(ScriptedTransport::statuses(&[200]));
        let automation = store.seed_automation("Empty", true, &[]);

        let result = engine.execute(automation, json!({}), TriggerOrigin::default()).await;
        assert_eq!(result.error_message.as_deref(), Some(NO_ACTIVE_STEPS));
        assert_eq!(store.execution_count(), 0);
    }

    #[tokio::test]
    async fn test_conditional_step_skipped() {
        let (engine, store, transport) = setup(ScriptedTransport::statuses(&[200]));
        let automation = store.seed_automation("Cond", true, &[("https://a.test", false), ("https://b.test", false)]);
        store.update_step(automation, 2, |s| {
            s.is_conditional = true;
            s.condition_config = Some(ConditionConfig::new("trigger.plan == 'pro'"));
        });

        let report = engine
            .trigger(automation, json!({"plan": "free"}), TriggerOrigin::default())
            .await
            .unwrap();

        assert_eq!(report.status, ExecutionStatus::Completed);
        assert_eq!(report.completed_steps, 1);
        assert_eq!(transport.calls(), 1);
        let rows = store.step_executions(report.execution_id);
        assert_eq!(rows[1].status, StepExecutionStatus::Skipped);
        assert!(store.events().iter().any(|e| e.event_name == "step_skipped"));
    }

    #[tokio::test]
    async fn test_condition_sees_prior_step() {
        let transport = ScriptedTransport::statuses(&[200]).route("https://a.test", &[500]);
        let (engine, store, transport) = setup(transport);
        let automation = store.seed_automation("Fallback", true, &[("https://a.test", true), ("https://b.test", false)]);
        store.update_step(automation, 2, |s| {
            s.is_conditional = true;
            s.condition_config = Some(ConditionConfig::new("steps['1'].success == false"));
        });

        let report = engine
            .trigger(automation, json!({}), TriggerOrigin::default())
            .await
            .unwrap();

        assert_eq!(transport.calls(), 2);
        assert_eq!(report.completed_steps, 1);
    }

    #[tokio::test]
    async fn test_condition_error_fails_step_and_run() {
        let (engine, store, transport) = setup(ScriptedTransport::statuses(&[200]));
        let automation = store.seed_automation("Broken", true, &[("https://a.test", false)]);
        store.update_step(automation, 1, |s| {
            s.is_conditional = true;
            s.condition_config = Some(ConditionConfig::new("trigger.plan =="));
        });

        let err = engine
            .trigger(automation, json!({}), TriggerOrigin::default())
            .await
            .unwrap_err();
        let EngineError::Aborted { report, source } = err else {
            panic!("expected an aborted run, got {err:?}");
        };
        assert!(matches!(*source, EngineError::Unexpected(_)));
        assert_eq!(report.status, ExecutionStatus::Failed);
        assert_eq!(report.completed_steps, 0);
        assert_eq!(report.total_steps, 1);
        assert!(report.error_message.as_deref().unwrap().contains("condition"));
        assert_eq!(transport.calls(), 0);

        let execution = store.latest_execution().unwrap();
        assert_eq!(execution.id, report.execution_id);
        assert_eq!(execution.status, ExecutionStatus::Failed);
        let rows = store.step_executions(execution.id);
        assert_eq!(rows[0].status, StepExecutionStatus::Failed);
        assert!(rows[0].error_message.as_deref().unwrap().contains("condition"));
    }

    #[tokio::test]
    async fn test_payload_template_rendered_from_trigger() {
        let (engine, store, transport) = setup(ScriptedTransport::statuses(&[200]));
        let automation = store.seed_automation("Tpl", true, &[("https://a.test", false)]);
        store.update_webhook("https://a.test", |w| {
            w.payload_template = Some(formflow_types::webhook::PayloadTemplate::new(
                json!({"to": "{{ trigger.email }}", "n": "{{ trigger.count }}"}),
            ));
        });

        engine
            .trigger(automation, json!({"email": "ada@example.com", "count": 2}), TriggerOrigin::default())
            .await
            .unwrap();

        let sent = transport.requests();
        let body: Value = serde_json::from_str(sent[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"to": "ada@example.com", "n": 2}));
    }

    #[tokio::test]
    async fn test_step_retry_off_overrides_webhook_policy() {
        let (engine, store, transport) = setup(ScriptedTransport::statuses(&[503, 503, 200]));
        let automation = store.seed_automation("NoRetry", true, &[("https://a.test", false)]);
        store.update_webhook("https://a.test", |w| {
            w.retry_enabled = true;
            w.retry_count = 2;
        });
        store.update_step(automation, 1, |s| s.retry_on_failure = false);

        let report = engine
            .trigger(automation, json!({}), TriggerOrigin::default())
            .await
            .unwrap();
        assert_eq!(report.status, ExecutionStatus::Failed);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_delay() {
        let (engine, store, transport) = setup(ScriptedTransport::statuses(&[200]));
        let automation = store.seed_automation("Slow", true, &[("https://a.test", false), ("https://b.test", false)]);
        store.update_step(automation, 2, |s| s.delay_seconds = 600);

        let (execution_id, handle) = engine.spawn(automation, json!({}), TriggerOrigin::default());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(engine.cancel(execution_id));

        let result = handle.await.unwrap();
        assert!(!result.success);
        assert_eq!(result.execution_id, Some(execution_id));
        assert_eq!(result.error_message.as_deref(), Some(CANCELLED));
        assert_eq!(transport.calls(), 1);

        let rows = store.step_executions(execution_id);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].status, StepExecutionStatus::Failed);
        assert_eq!(rows[1].error_message.as_deref(), Some(CANCELLED));
        assert_eq!(store.execution(execution_id).unwrap().status, ExecutionStatus::Failed);
        assert!(!engine.cancel(execution_id));
    }

    #[tokio::test]
    async fn test_cancel_unknown_execution() {
        let (engine, _, _) = setup(ScriptedTransport::statuses(&[200]));
        assert!(!engine.cancel(Uuid::now_v7()));
    }

    #[tokio::test]
    async fn test_spawn_rejected_run_writes_no_row() {
        let (engine, store, _) = setup(ScriptedTransport::statuses(&[200]));
        let (execution_id, handle) = engine.spawn(Uuid::now_v7(), json!({}), TriggerOrigin::default());
        let result = handle.await.unwrap();
        assert!(result.execution_id.is_none());
        assert!(store.execution(execution_id).is_none());
        assert_eq!(engine.active_runs(), 0);
    }

    #[tokio::test]
    async fn test_webhook_call_writes_no_rows() {
        let (engine, store, transport) = setup(ScriptedTransport::statuses(&[201]));
        store.seed_automation("Any", true, &[("https://a.test", false)]);
        let webhook_id = store.webhook_id("https://a.test");

        let result = engine
            .test_webhook(webhook_id, json!({"ping": true}), TriggerOrigin::default())
            .await;

        assert!(result.success);
        assert_eq!(result.status_code, Some(201));
        assert_eq!(transport.calls(), 1);
        assert_eq!(store.execution_count(), 0);

        let missing = engine
            .test_webhook(Uuid::now_v7(), json!({}), TriggerOrigin::default())
            .await;
        assert!(!missing.success);
        assert_eq!(missing.error_message.as_deref(), Some(WEBHOOK_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_run_events_carry_counts_and_origin() {
        let (engine, store, _) = setup(ScriptedTransport::statuses(&[200]));
        let automation = store.seed_automation("Welcome", true, &[("https://a.test", false)]);
        let origin = TriggerOrigin {
            session_id: Some("sess-9".to_string()),
            user_agent: Some("ua".to_string()),
            ip_address: None,
        };

        engine
            .trigger(automation, json!({"user_id": "u1"}), origin)
            .await
            .unwrap();

        let events = store.events();
        let names: Vec<&str> = events.iter().map(|e| e.event_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "automation_started",
                "webhook_triggered",
                "webhook_succeeded",
                "automation_completed"
            ]
        );
        let done = events.last().unwrap();
        assert_eq!(done.metadata["completedSteps"], 1);
        assert_eq!(done.metadata["totalSteps"], 1);
        assert!(done.metadata["durationMs"].is_u64());
        assert!(events.iter().all(|e| e.session_id.as_deref() == Some("sess-9")));
        assert!(events.iter().all(|e| e.metadata["user_id"] == "u1"));
    }

    #[tokio::test]
    async fn test_event_store_failure_does_not_block_run() {
        let (engine, store, _) = crate::test_support::engine_with_store(
            MemoryStore::failing_events(),
            ScriptedTransport::statuses(&[200]),
        );
        let automation = store.seed_automation("Welcome", true, &[("https://a.test", false)]);

        let report = engine
            .trigger(automation, json!({}), TriggerOrigin::default())
            .await
            .unwrap();
        assert_eq!(report.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_independent() {
        let (engine, store, transport) = setup(ScriptedTransport::statuses(&[200]));
        let automation = store.seed_automation("Many", true, &[("https://a.test", false), ("https://b.test", false)]);

        let handles: Vec<_> = (0..8)
            .map(|i| engine.spawn(automation, json!({"i": i}), TriggerOrigin::default()).1)
            .collect();
        for handle in handles {
            let result = handle.await.unwrap();
            assert!(result.success);
            assert_eq!(store.step_executions(result.execution_id.unwrap()).len(), 2);
        }
        assert_eq!(transport.calls(), 16);
        assert_eq!(store.execution_count(), 8);
    }

    #[test]
    fn test_user_id_extraction() {
        assert_eq!(user_id_of(&json!({"user_id": "a"})).as_deref(), Some("a"));
        assert_eq!(user_id_of(&json!({"userId": 42})).as_deref(), Some("42"));
        assert!(user_id_of(&json!({"user": {}})).is_none());
        assert!(user_id_of(&json!("x")).is_none());
    }
}
