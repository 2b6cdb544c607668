use thiserror::Error;

/// Errors from repository operations (used by trait definitions in formflow-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors raised by the webhook registry and automation definition store.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    StorageError(String),
}

impl From<RepositoryError> for RegistryError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Conflict(msg) => RegistryError::Conflict(msg),
            RepositoryError::NotFound => RegistryError::NotFound("entity".to_string()),
            other => RegistryError::StorageError(other.to_string()),
        }
    }
}
