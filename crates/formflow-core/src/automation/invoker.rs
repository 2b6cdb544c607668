//! Webhook invoker: one logical call against a webhook target.
//!
//! Builds the request from the webhook definition, sends it through a
//! [`WebhookTransport`], classifies the outcome, and applies the effective
//! retry policy. Each attempt is audited individually; only the final
//! attempt's outcome is returned, together with the attempt count.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use formflow_types::event::{NewSystemEvent, event_category, event_name, event_type};
use formflow_types::execution::{InvocationResult, TriggerOrigin};
use formflow_types::webhook::Webhook;

use crate::event::logger::EventLogger;
use crate::repository::event::EventRepository;

use super::retry::RetryPolicy;
use super::template::{TemplateError, encode_body};
use super::transport::{InvocationError, WebhookRequest, WebhookTransport};

/// Default cap on persisted response bodies.
pub const DEFAULT_MAX_RESPONSE_BODY_BYTES: usize = 64 * 1024;

const TRUNCATION_MARKER: &str = "...[truncated]";

/// Where an invocation comes from. Copied onto every audit event.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    pub origin: TriggerOrigin,
    pub execution_id: Option<Uuid>,
    pub step_order: Option<u32>,
    /// Copied into event metadata so the event log can be filtered by user.
    pub user_id: Option<String>,
    /// Interrupts backoff sleeps. Never aborts an in-flight request.
    pub cancel: CancellationToken,
}

/// Performs webhook calls with retry and per-attempt auditing.
pub struct WebhookInvoker<T: WebhookTransport, E: EventRepository> {
    transport: Arc<T>,
    events: EventLogger<E>,
    max_response_body_bytes: usize,
}

impl<T: WebhookTransport, E: EventRepository> WebhookInvoker<T, E> {
    pub fn new(transport: Arc<T>, events: EventLogger<E>) -> Self {
        Self {
            transport,
            events,
            max_response_body_bytes: DEFAULT_MAX_RESPONSE_BODY_BYTES,
        }
    }

    pub fn with_max_response_body_bytes(mut self, max: usize) -> Self {
        self.max_response_body_bytes = max;
        self
    }

    /// Build the outbound request for `webhook` carrying `payload`.
    ///
    /// Headers are the defaults overridden by the webhook's own headers.
    /// The body is only set for methods that carry one.
    pub fn build_request(webhook: &Webhook, payload: &Value) -> Result<WebhookRequest, TemplateError> {
        let body = if webhook.method.carries_body() {
            Some(encode_body(payload, webhook.payload_type)?)
        } else {
            None
        };

        Ok(WebhookRequest {
            method: webhook.method,
            url: webhook.url.clone(),
            headers: webhook.headers.merged_with_defaults(),
            body,
            timeout: Duration::from_secs(u64::from(webhook.timeout_seconds.max(1))),
            max_body_bytes: DEFAULT_MAX_RESPONSE_BODY_BYTES,
        })
    }

    /// Invoke `webhook` with an already-rendered `payload`.
    ///
    /// Issues at most `policy.max_attempts` HTTP calls. Returns the final
    /// attempt's outcome. If `ctx.cancel` fires during a backoff sleep, the
    /// last outcome is returned without further attempts.
    pub async fn invoke(
        &self,
        webhook: &Webhook,
        payload: &Value,
        policy: RetryPolicy,
        ctx: &InvocationContext,
    ) -> InvocationResult {
        let request = match Self::build_request(webhook, payload) {
            Ok(r) => WebhookRequest {
                max_body_bytes: self.max_response_body_bytes,
                ..r
            },
            Err(e) => return InvocationResult::not_sent(e.to_string()),
        };

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let mut result = self.attempt(webhook, &request, attempt, ctx).await;
            result.attempts = attempt;

            if result.success || !policy.should_retry(attempt) {
                return result;
            }

            tracing::debug!(
                webhook_id = %webhook.id,
                attempt,
                max_attempts = policy.max_attempts,
                delay_ms = policy.delay.as_millis() as u64,
                "retrying webhook"
            );

            if !sleep_or_cancel(policy.delay, &ctx.cancel).await {
                tracing::info!(webhook_id = %webhook.id, attempt, "retry aborted by cancellation");
                return result;
            }
        }
    }

    /// One HTTP call, bracketed by audit events.
    async fn attempt(
        &self,
        webhook: &Webhook,
        request: &WebhookRequest,
        attempt: u32,
        ctx: &InvocationContext,
    ) -> InvocationResult {
        self.emit(
            webhook,
            ctx,
            event_name::WEBHOOK_TRIGGERED,
            format!("Webhook '{}' triggered", webhook.name),
            json!({ "attempt": attempt }),
        )
        .await;

        let started = Instant::now();
        let sent = tokio::time::timeout(request.timeout, self.transport.send(request.clone())).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let response = match sent {
            Ok(r) => r,
            Err(_) => Err(InvocationError::Timeout(request.timeout)),
        };

        let result = match response {
            Ok(resp) => {
                let success = resp.is_success();
                InvocationResult {
                    success,
                    status_code: Some(resp.status),
                    error_message: if success {
                        None
                    } else {
                        Some(format!("HTTP {}", resp.status))
                    },
                    response_body: Some(truncate_body(resp.body, self.max_response_body_bytes)),
                    response_time_ms: elapsed_ms,
                    attempts: attempt,
                }
            }
            Err(e) => InvocationResult {
                success: false,
                status_code: None,
                response_body: None,
                error_message: Some(e.to_string()),
                response_time_ms: elapsed_ms,
                attempts: attempt,
            },
        };

        let meta = json!({
            "attempt": attempt,
            "status_code": result.status_code,
            "response_time_ms": result.response_time_ms,
            "error": result.error_message,
        });
        if result.success {
            self.emit(
                webhook,
                ctx,
                event_name::WEBHOOK_SUCCEEDED,
                format!("Webhook '{}' succeeded", webhook.name),
                meta,
            )
            .await;
        } else {
            tracing::warn!(
                webhook_id = %webhook.id,
                attempt,
                status_code = result.status_code,
                error = result.error_message.as_deref(),
                "webhook attempt failed"
            );
            self.emit(
                webhook,
                ctx,
                event_name::WEBHOOK_FAILED,
                format!("Webhook '{}' failed", webhook.name),
                meta,
            )
            .await;
        }

        result
    }

    async fn emit(
        &self,
        webhook: &Webhook,
        ctx: &InvocationContext,
        name: &str,
        description: String,
        extra: Value,
    ) {
        let mut metadata = json!({
            "webhook_id": webhook.id.to_string(),
            "webhook_name": webhook.name,
            "url": webhook.url,
            "method": webhook.method.as_str(),
            "execution_id": ctx.execution_id.map(|id| id.to_string()),
            "step_order": ctx.step_order,
            "user_id": ctx.user_id,
        });
        if let (Some(target), Value::Object(extra)) = (metadata.as_object_mut(), extra) {
            target.extend(extra);
        }

        self.events
            .log_event(
                NewSystemEvent::new(event_type::WEBHOOK, event_category::INTEGRATION, name)
                    .with_description(description)
                    .with_metadata(metadata)
                    .with_origin(&ctx.origin),
            )
            .await;
    }
}

/// Sleep for `duration` unless `token` fires first.
///
/// Returns `false` if cancelled (including when already cancelled).
pub async fn sleep_or_cancel(duration: Duration, token: &CancellationToken) -> bool {
    if token.is_cancelled() {
        return false;
    }
    if duration.is_zero() {
        return true;
    }
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Cut `body` to at most `max` bytes on a char boundary.
fn truncate_body(mut body: String, max: usize) -> String {
    if body.len() <= max {
        return body;
    }
    let mut cut = max;
    while cut > 0 && !body.is_char_boundary(cut) {
        cut -= 1;
    }
    body.truncate(cut);
    body.push_str(TRUNCATION_MARKER);
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemoryStore, ScriptedTransport, sample_webhook};
    use formflow_types::webhook::{HttpMethod, PayloadTemplate, PayloadType, WebhookHeaders};

    fn invoker(
        transport: ScriptedTransport,
    ) -> (
        WebhookInvoker<ScriptedTransport, MemoryStore>,
        Arc<ScriptedTransport>,
        Arc<MemoryStore>,
    ) {
        let transport = Arc::new(transport);
        let events = Arc::new(MemoryStore::default());
        let invoker = WebhookInvoker::new(
            Arc::clone(&transport),
            EventLogger::new(Arc::clone(&events)),
        );
        (invoker, transport, events)
    }

    #[test]
    fn test_build_request_headers_and_body() {
        let mut hook = sample_webhook("https://crm.example.com/hook");
        hook.headers = WebhookHeaders::from([("Content-Type", "application/vnd.crm+json")]);
        let req = WebhookInvoker::<ScriptedTransport, MemoryStore>::build_request(
            &hook,
            &json!({"email": "a@b.c"}),
        )
        .unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(
            req.headers.get("content-type").map(String::as_str),
            Some("application/vnd.crm+json")
        );
        assert_eq!(req.body.as_deref(), Some("{\"email\":\"a@b.c\"}"));
        assert_eq!(req.timeout, Duration::from_secs(hook.timeout_seconds as u64));
    }

    #[test]
    fn test_build_request_omits_body_for_get_and_delete() {
        for method in [HttpMethod::Get, HttpMethod::Delete] {
            let mut hook = sample_webhook("https://crm.example.com/hook");
            hook.method = method;
            let req = WebhookInvoker::<ScriptedTransport, MemoryStore>::build_request(
                &hook,
                &json!({"x": 1}),
            )
            .unwrap();
            assert!(req.body.is_none());
        }
    }

    #[test]
    fn test_build_request_text_payload() {
        let mut hook = sample_webhook("https://crm.example.com/hook");
        hook.payload_type = PayloadType::Text;
        hook.payload_template = Some(PayloadTemplate::new(json!("hi")));
        let req = WebhookInvoker::<ScriptedTransport, MemoryStore>::build_request(
            &hook,
            &json!("hi there"),
        )
        .unwrap();
        assert_eq!(req.body.as_deref(), Some("hi there"));
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let (invoker, transport, events) = invoker(ScriptedTransport::statuses(&[200]));
        let hook = sample_webhook("https://crm.example.com/hook");

        let result = invoker
            .invoke(&hook, &json!({}), RetryPolicy::for_webhook(&hook), &InvocationContext::default())
            .await;

        assert!(result.success);
        assert_eq!(result.status_code, Some(200));
        assert_eq!(result.attempts, 1);
        assert_eq!(transport.calls(), 1);
        let names: Vec<String> = events.events().into_iter().map(|e| e.event_name).collect();
        assert_eq!(names, vec!["webhook_triggered", "webhook_succeeded"]);
    }

    #[tokio::test]
    async fn test_non_2xx_is_failure_without_retry() {
        let (invoker, transport, _) = invoker(ScriptedTransport::statuses(&[500, 200]));
        let hook = sample_webhook("https://crm.example.com/hook");

        let result = invoker
            .invoke(&hook, &json!({}), RetryPolicy::for_webhook(&hook), &InvocationContext::default())
            .await;

        assert!(!result.success);
        assert_eq!(result.status_code, Some(500));
        assert_eq!(result.error_message.as_deref(), Some("HTTP 500"));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let (invoker, transport, events) = invoker(ScriptedTransport::statuses(&[503, 503, 200]));
        let mut hook = sample_webhook("https://crm.example.com/hook");
        hook.retry_enabled = true;
        hook.retry_count = 2;

        let result = invoker
            .invoke(&hook, &json!({}), RetryPolicy::for_webhook(&hook), &InvocationContext::default())
            .await;

        assert!(result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(transport.calls(), 3);
        let failed = events
            .events()
            .iter()
            .filter(|e| e.event_name == "webhook_failed")
            .count();
        assert_eq!(failed, 2);
    }

    #[tokio::test]
    async fn test_retry_never_exceeds_count_plus_one() {
        let (invoker, transport, _) = invoker(ScriptedTransport::statuses(&[500; 10]));
        let mut hook = sample_webhook("https://crm.example.com/hook");
        hook.retry_enabled = true;
        hook.retry_count = 3;

        let result = invoker
            .invoke(&hook, &json!({}), RetryPolicy::for_webhook(&hook), &InvocationContext::default())
            .await;

        assert!(!result.success);
        assert_eq!(result.attempts, 4);
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test]
    async fn test_transport_error_has_no_status() {
        let (invoker, _, _) = invoker(ScriptedTransport::transport_error("connection refused"));
        let hook = sample_webhook("https://crm.example.com/hook");

        let result = invoker
            .invoke(&hook, &json!({}), RetryPolicy::SINGLE, &InvocationContext::default())
            .await;

        assert!(!result.success);
        assert!(result.status_code.is_none());
        assert!(result.error_message.unwrap().contains("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_target_times_out() {
        let (invoker, _, _) = invoker(
            ScriptedTransport::statuses(&[200]).with_latency(Duration::from_secs(30)),
        );
        let mut hook = sample_webhook("https://crm.example.com/hook");
        hook.timeout_seconds = 2;

        let result = invoker
            .invoke(&hook, &json!({}), RetryPolicy::SINGLE, &InvocationContext::default())
            .await;

        assert!(!result.success);
        assert!(result.status_code.is_none());
        assert!(result.error_message.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_cancel_stops_backoff() {
        let (invoker, transport, _) = invoker(ScriptedTransport::statuses(&[500, 500, 500]));
        let mut hook = sample_webhook("https://crm.example.com/hook");
        hook.retry_enabled = true;
        hook.retry_count = 2;
        hook.retry_delay_seconds = 60;

        let ctx = InvocationContext::default();
        ctx.cancel.cancel();

        let result = invoker
            .invoke(&hook, &json!({}), RetryPolicy::for_webhook(&hook), &ctx)
            .await;

        assert!(!result.success);
        assert_eq!(result.attempts, 1);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_response_body_truncated() {
        let (invoker, transport, _) = invoker(ScriptedTransport::bodies(&[(200, "x".repeat(100))]));
        let invoker = invoker.with_max_response_body_bytes(10);
        let hook = sample_webhook("https://crm.example.com/hook");

        let result = invoker
            .invoke(&hook, &json!({}), RetryPolicy::SINGLE, &InvocationContext::default())
            .await;

        let body = result.response_body.unwrap();
        assert!(body.starts_with("xxxxxxxxxx"));
        assert!(body.ends_with(TRUNCATION_MARKER));
        // The transport is told how much of the body is worth reading.
        assert_eq!(transport.requests()[0].max_body_bytes, 10);
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let out = truncate_body("ééé".to_string(), 3);
        assert_eq!(out, format!("é{TRUNCATION_MARKER}"));
        assert_eq!(truncate_body("short".to_string(), 10), "short");
    }

    #[tokio::test]
    async fn test_events_carry_origin_and_execution() {
        let (invoker, _, events) = invoker(ScriptedTransport::statuses(&[200]));
        let hook = sample_webhook("https://crm.example.com/hook");
        let execution_id = Uuid::now_v7();
        let ctx = InvocationContext {
            origin: TriggerOrigin {
                session_id: Some("sess".to_string()),
                user_agent: None,
                ip_address: Some("10.0.0.1".to_string()),
            },
            execution_id: Some(execution_id),
            step_order: Some(1),
            user_id: Some("u-7".to_string()),
            cancel: CancellationToken::new(),
        };

        invoker.invoke(&hook, &json!({}), RetryPolicy::SINGLE, &ctx).await;

        for event in events.events() {
            assert_eq!(event.session_id.as_deref(), Some("sess"));
            assert_eq!(event.ip_address.as_deref(), Some("10.0.0.1"));
            assert_eq!(event.metadata["execution_id"], execution_id.to_string());
            assert_eq!(event.metadata["step_order"], 1);
            assert_eq!(event.metadata["user_id"], "u-7");
        }
    }
}
