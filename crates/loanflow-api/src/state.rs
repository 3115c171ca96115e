//! Application state wiring the engine, repositories, and configuration.
//!
//! AppState holds the concrete instances used by both CLI and REST API.
//! The runtime is generic over repository traits; AppState pins it to the
//! SQLite implementations.

use std::sync::Arc;

use anyhow::Context;
use loanflow_core::loan::{LoanSteps, RuleBasedScorer, register_loan_workflows};
use loanflow_core::workflow::{RuntimeOptions, WorkflowRegistry, WorkflowRuntime};
use loanflow_infra::config::{ensure_data_dir, load_global_config, resolve_data_dir};
use loanflow_infra::sqlite::loan::SqliteLoanRepository;
use loanflow_infra::sqlite::message::SqliteMessageRepository;
use loanflow_infra::sqlite::pool::{DatabasePool, database_url};
use loanflow_infra::sqlite::workflow::SqliteWorkflowRepository;
use loanflow_types::config::GlobalConfig;

/// Shared application state.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub runtime: WorkflowRuntime,
    pub loans: SqliteLoanRepository,
    pub config: Arc<GlobalConfig>,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Initialize the application state: resolve config, connect to DB, register workflows.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        ensure_data_dir(&data_dir)
            .await
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let config = load_global_config(&data_dir).await;
        tracing::debug!(data_dir = %data_dir.display(), "configuration loaded");
        let db_url = database_url(&data_dir);
        let db_pool = DatabasePool::new(&db_url)
            .await
            .with_context(|| format!("failed to open database {db_url}"))?;

        Self::from_parts(config, db_pool)
    }

    /// Wire the runtime over an already opened pool.
    pub fn from_parts(config: GlobalConfig, db_pool: DatabasePool) -> anyhow::Result<Self> {
        let loans = SqliteLoanRepository::new(db_pool.clone());
        let steps = Arc::new(LoanSteps::new(
            loans.clone(),
            Arc::new(RuleBasedScorer),
            config.loan.clone(),
        ));

        let mut registry = WorkflowRegistry::new();
        register_loan_workflows(&mut registry, steps)?;

        let runtime = WorkflowRuntime::new(
            registry,
            SqliteWorkflowRepository::new(db_pool.clone()),
            SqliteMessageRepository::new(db_pool.clone()),
            RuntimeOptions::from(&config.engine),
        );

        Ok(Self {
            runtime,
            loans,
            config: Arc::new(config),
            db_pool,
        })
    }
}
