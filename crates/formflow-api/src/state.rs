//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both CLI and REST API.
//! Services and the engine are generic over repository/transport traits, but
//! AppState pins them to the concrete infra implementations.

use std::path::PathBuf;
use std::sync::Arc;

use formflow_core::automation::engine::ExecutionEngine;
use formflow_core::automation::invoker::WebhookInvoker;
use formflow_core::event::logger::EventLogger;
use formflow_core::service::automation::AutomationService;
use formflow_core::service::webhook::WebhookService;
use formflow_infra::config::{load_config, resolve_data_dir, resolve_database_url};
use formflow_infra::http::transport::ReqwestTransport;
use formflow_infra::sqlite::automation::SqliteAutomationRepository;
use formflow_infra::sqlite::event::SqliteEventRepository;
use formflow_infra::sqlite::execution::SqliteExecutionRepository;
use formflow_infra::sqlite::pool::DatabasePool;
use formflow_infra::sqlite::webhook::SqliteWebhookRepository;
use formflow_types::config::FormflowConfig;

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteWebhookService = WebhookService<SqliteWebhookRepository>;

pub type ConcreteAutomationService =
    AutomationService<SqliteAutomationRepository, SqliteWebhookRepository>;

pub type ConcreteEngine = ExecutionEngine<
    SqliteWebhookRepository,
    SqliteAutomationRepository,
    SqliteExecutionRepository,
    SqliteEventRepository,
    ReqwestTransport,
>;

/// Shared application state holding all services.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub webhook_service: Arc<ConcreteWebhookService>,
    pub automation_service: Arc<ConcreteAutomationService>,
    pub engine: ConcreteEngine,
    pub events: EventLogger<SqliteEventRepository>,
    pub config: Arc<FormflowConfig>,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Initialize the application state: load config, connect to DB, wire services.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();

        // Ensure data directory exists
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_config(&data_dir).await;
        let db_url = resolve_database_url(&config, &data_dir);
        let db_pool = DatabasePool::new(&db_url).await?;

        Self::from_parts(db_pool, config, data_dir)
    }

    /// Wire services on top of an open pool.
    pub fn from_parts(
        db_pool: DatabasePool,
        config: FormflowConfig,
        data_dir: PathBuf,
    ) -> anyhow::Result<Self> {
        let webhook_repo = Arc::new(SqliteWebhookRepository::new(db_pool.clone()));
        let automation_repo = Arc::new(SqliteAutomationRepository::new(db_pool.clone()));
        let execution_repo = Arc::new(SqliteExecutionRepository::new(db_pool.clone()));
        let event_repo = Arc::new(SqliteEventRepository::new(db_pool.clone()));

        let events = EventLogger::new(event_repo);

        // One HTTP client shared by every run
        let transport = Arc::new(ReqwestTransport::new(&config.engine.user_agent)?);
        let invoker = WebhookInvoker::new(transport, events.clone())
            .with_max_response_body_bytes(config.engine.max_response_body_bytes);

        let engine = ExecutionEngine::new(
            Arc::clone(&webhook_repo),
            Arc::clone(&automation_repo),
            execution_repo,
            events.clone(),
            invoker,
        );

        Ok(Self {
            webhook_service: Arc::new(WebhookService::new(Arc::clone(&webhook_repo))),
            automation_service: Arc::new(AutomationService::new(automation_repo, webhook_repo)),
            engine,
            events,
            config: Arc::new(config),
            data_dir,
            db_pool,
        })
    }
}
