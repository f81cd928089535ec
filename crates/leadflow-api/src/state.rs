//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both CLI and REST API.
//! Services are generic over the repository and queue traits; AppState pins
//! them to the SQLite implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use leadflow_core::engine::FlowRunner;
use leadflow_core::scheduler::{ResumeWorker, WorkerSettings};
use leadflow_core::service::contact::ContactService;
use leadflow_core::service::flow::FlowService;
use leadflow_core::validation::NodeCatalog;
use leadflow_infra::config::{database_url, load_config, resolve_data_dir};
use leadflow_infra::sqlite::{
    DatabasePool, SqliteContactRepository, SqliteExecutionRepository, SqliteFlowRepository,
    SqliteTaskQueue,
};
use leadflow_infra::transport::create_executor;
use leadflow_types::config::AppConfig;

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteRunner = FlowRunner<SqliteFlowRepository, SqliteExecutionRepository, SqliteTaskQueue>;

pub type ConcreteFlowService = FlowService<SqliteFlowRepository>;

pub type ConcreteContactService = ContactService<
    SqliteContactRepository,
    SqliteFlowRepository,
    SqliteExecutionRepository,
    SqliteTaskQueue,
>;

pub type ConcreteWorker =
    ResumeWorker<SqliteFlowRepository, SqliteExecutionRepository, SqliteTaskQueue>;

/// Shared application state holding all services.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub flow_service: Arc<ConcreteFlowService>,
    pub contact_service: Arc<ConcreteContactService>,
    pub runner: Arc<ConcreteRunner>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Initialize the application state from the resolved data directory.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;

        let config = load_config(&data_dir).await;
        Self::from_config(config, &data_dir).await
    }

    /// Connect to the database and wire services for an explicit configuration.
    pub async fn from_config(config: AppConfig, data_dir: &Path) -> anyhow::Result<Self> {
        let db_url = database_url(&config, data_dir);
        let db_pool = DatabasePool::new(&db_url)
            .await
            .with_context(|| format!("opening database {db_url}"))?;

        let executor = create_executor(&config).context("configuring transports")?;
        let runner = FlowRunner::new(
            SqliteFlowRepository::new(db_pool.clone()),
            SqliteExecutionRepository::new(db_pool.clone()),
            SqliteTaskQueue::new(db_pool.clone()),
            executor,
        );
        let runner = Arc::new(runner);

        let flow_service = FlowService::new(
            SqliteFlowRepository::new(db_pool.clone()),
            NodeCatalog::builtin(),
        );
        let contact_service =
            ContactService::new(SqliteContactRepository::new(db_pool.clone()), runner.clone());

        Ok(Self {
            flow_service: Arc::new(flow_service),
            contact_service: Arc::new(contact_service),
            runner,
            config: Arc::new(config),
        })
    }

    /// A resumption worker over this state's runner, tuned by `[worker]`.
    pub fn worker(&self) -> ConcreteWorker {
        ResumeWorker::new(
            self.runner.clone(),
            WorkerSettings::from_config(&self.config.worker),
        )
    }

    /// Fresh state on a temporary database, for handler tests.
    #[cfg(test)]
    pub async fn for_tests() -> Self {
        let dir = tempfile::tempdir().unwrap().keep();
        Self::from_config(AppConfig::default(), &dir).await.unwrap()
    }
}
