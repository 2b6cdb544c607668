//! Retry policy for webhook invocations.
//!
//! The webhook owns the policy (`retry_enabled`, `retry_count`,
//! `retry_delay_seconds`); a step can only switch it off through
//! `retry_on_failure = false`. Ad-hoc test calls always make a single attempt
//! (`RetryPolicy::SINGLE`).

use std::time::Duration;

use formflow_types::webhook::Webhook;

/// Effective retry policy for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total HTTP calls allowed, including the first.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Exactly one attempt, no backoff.
    pub const SINGLE: RetryPolicy = RetryPolicy {
        max_attempts: 1,
        delay: Duration::ZERO,
    };

    /// The webhook's own policy.
    pub fn for_webhook(webhook: &Webhook) -> Self {
        Self {
            max_attempts: webhook.max_attempts(),
            delay: Duration::from_secs(u64::from(webhook.retry_delay_seconds)),
        }
    }

    /// The webhook's policy as seen from a step.
    pub fn for_step(webhook: &Webhook, retry_on_failure: bool) -> Self {
        if retry_on_failure {
            Self::for_webhook(webhook)
        } else {
            Self::SINGLE
        }
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based).
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
