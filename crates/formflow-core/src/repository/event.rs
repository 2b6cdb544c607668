//! System event repository trait.

use formflow_types::error::RepositoryError;
use formflow_types::event::{EventFilter, SystemEvent};

/// Append-only storage for audit events.
pub trait EventRepository: Send + Sync {
    fn insert_event(
        &self,
        event: &SystemEvent,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Query events matching `filter`, newest first.
    fn list_events(
        &self,
        filter: &EventFilter,
    ) -> impl std::future::Future<Output = Result<Vec<SystemEvent>, RepositoryError>> + Send;
}
