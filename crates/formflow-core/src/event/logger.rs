//! Best-effort audit event logger.
//!
//! Every trigger, webhook attempt and run transition is appended to the
//! system event log. A failed write is reported through `tracing` and
//! otherwise ignored; it never fails or delays the run that emitted it.

use std::sync::Arc;

use formflow_types::event::{EventFilter, NewSystemEvent, SystemEvent};
use formflow_types::error::RepositoryError;

use crate::repository::event::EventRepository;

/// Append-only audit sink shared by the engine and the invoker.
pub struct EventLogger<E: EventRepository> {
    repo: Arc<E>,
}

impl<E: EventRepository> Clone for EventLogger<E> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
        }
    }
}

impl<E: EventRepository> EventLogger<E> {
    pub fn new(repo: Arc<E>) -> Self {
        Self { repo }
    }

    /// Persist an event. Never fails.
    pub async fn log_event(&self, event: NewSystemEvent) {
        let event = event.into_event();

        tracing::debug!(
            event_type = event.event_type.as_str(),
            event_name = event.event_name.as_str(),
            session_id = event.session_id.as_deref(),
            "system event"
        );

        if let Err(e) = self.repo.insert_event(&event).await {
            tracing::warn!(
                event_name = event.event_name.as_str(),
                error = %e,
                "failed to persist system event"
            );
        }
    }

    /// Query the event log, newest first.
    pub async fn list_events(
        &self,
        filter: &EventFilter,
    ) -> Result<Vec<SystemEvent>, RepositoryError> {
        self.repo.list_events(filter).await
    }
}
