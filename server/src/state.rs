// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Dependency wiring for the HTTP host.
//!
//! Mirrors the teacher daemon's startup sequence: connect, migrate, pick a
//! repository family for the configured driver, build the application
//! services on top of them, and hand both the shared [`AppState`] and the
//! not-yet-started [`OrchestrationEngine`] back to `main` so the engine can
//! be spawned alongside the HTTP listener rather than inside it.

use std::path::PathBuf;
use std::sync::Arc;

use orchestrator_core::application::engine::{EngineConfig, OrchestrationEngine};
use orchestrator_core::application::executor::WorkflowExecutor;
use orchestrator_core::application::graph_service::GraphService;
use orchestrator_core::application::registry::ProviderRegistry;
use orchestrator_core::application::resolver::Resolver;
use orchestrator_core::application::resource_service::ResourceService;
use orchestrator_core::application::spec_service::SpecService;
use orchestrator_core::application::step_runner::StepRunnerRegistry;
use orchestrator_core::infrastructure::db::DbPool;
use orchestrator_core::infrastructure::provider_loader::{core_version, load_all, ProviderSource};
use orchestrator_core::infrastructure::pubsub::{PubsubLogPublisher, SharedPubsub};
use orchestrator_core::infrastructure::repositories::{
    PgGraphRepository, PgResourceDependencyRepository, PgResourceRepository, PgSpecRepository, PgStepExecutionRepository, PgWorkflowExecutionRepository,
    SqliteGraphRepository, SqliteResourceDependencyRepository, SqliteResourceRepository, SqliteSpecRepository, SqliteStepExecutionRepository,
    SqliteWorkflowExecutionRepository,
};
use orchestrator_core::infrastructure::step_runners::register_builtin_runners;
use orchestrator_core::infrastructure::wake::{new_wake_signal, WakeSignal};
use orchestrator_core::infrastructure::workflow_parser::FileWorkflowLoader;

use crate::config::{Config, DbDriver};

/// Everything an HTTP handler needs, shared behind `Arc<AppState>` the way
/// the teacher's `presentation::api::AppState` is.
pub struct AppState {
    pub specs: Arc<SpecService>,
    pub resources: Arc<ResourceService>,
    pub graph: Arc<GraphService>,
    pub executor: Arc<WorkflowExecutor>,
    pub registry: ProviderRegistry,
    pub resolver: Resolver,
    pub pubsub: SharedPubsub,
    pub wake: WakeSignal,
    pub providers_dir: PathBuf,
}

impl AppState {
    /// Re-scans `providers_dir` the same way startup did, for the manual
    /// reload endpoint (spec.md §4.3 "Reload").
    pub fn provider_sources(&self) -> Vec<ProviderSource> {
        scan_providers_dir(&self.providers_dir)
    }
}

/// Builds the shared state and the (not yet running) engine in one pass.
/// `main` spawns `engine.run(shutdown)` separately so the HTTP listener and
/// the poll loop share a lifetime without the router owning the engine.
pub async fn build(config: &Config) -> anyhow::Result<(Arc<AppState>, OrchestrationEngine)> {
    let pool = DbPool::connect(config.db_driver.as_str(), &config.database_url()).await?;
    pool.migrate().await?;

    let (spec_repo, resource_repo, dependency_repo, workflow_repo, step_repo, graph_repo): (
        Arc<dyn orchestrator_core::domain::repository::SpecRepository>,
        Arc<dyn orchestrator_core::domain::repository::ResourceRepository>,
        Arc<dyn orchestrator_core::domain::repository::ResourceDependencyRepository>,
        Arc<dyn orchestrator_core::domain::repository::WorkflowExecutionRepository>,
        Arc<dyn orchestrator_core::domain::repository::StepExecutionRepository>,
        Arc<dyn orchestrator_core::domain::repository::GraphRepository>,
    ) = match config.db_driver {
        DbDriver::Postgres => {
            let pg = pool.as_postgres().expect("DbPool::connect returned a Sqlite pool for a Postgres driver").clone();
            (
                Arc::new(PgSpecRepository::new(pg.clone())),
                Arc::new(PgResourceRepository::new(pg.clone())),
                Arc::new(PgResourceDependencyRepository::new(pg.clone())),
                Arc::new(PgWorkflowExecutionRepository::new(pg.clone())),
                Arc::new(PgStepExecutionRepository::new(pg.clone())),
                Arc::new(PgGraphRepository::new(pg)),
            )
        }
        DbDriver::Sqlite => {
            let sq = pool.as_sqlite().expect("DbPool::connect returned a Postgres pool for a Sqlite driver").clone();
            (
                Arc::new(SqliteSpecRepository::new(sq.clone())),
                Arc::new(SqliteResourceRepository::new(sq.clone())),
                Arc::new(SqliteResourceDependencyRepository::new(sq.clone())),
                Arc::new(SqliteWorkflowExecutionRepository::new(sq.clone())),
                Arc::new(SqliteStepExecutionRepository::new(sq.clone())),
                Arc::new(SqliteGraphRepository::new(sq)),
            )
        }
    };

    let sources = scan_providers_dir(&config.providers_dir);
    let manifests = load_all(&sources, &config.providers_dir).await;
    let registry = ProviderRegistry::new(manifests, core_version())?;

    let mut runners = StepRunnerRegistry::new();
    register_builtin_runners(&mut runners);
    let registered_step_types = runners.registered_types();
    let workflow_loader = Arc::new(FileWorkflowLoader::new(registered_step_types));

    let pubsub: SharedPubsub = Arc::new(PubsubLogPublisher::new());
    let wake = new_wake_signal();

    let graph = Arc::new(GraphService::new(graph_repo, workflow_repo.clone(), resource_repo.clone(), dependency_repo.clone()));
    let specs = Arc::new(SpecService::new(spec_repo, resource_repo.clone(), graph.clone()));
    let resources = Arc::new(ResourceService::new(resource_repo.clone(), dependency_repo));
    let executor = Arc::new(WorkflowExecutor::new(runners, workflow_repo, step_repo, pubsub.clone()));
    let resolver = Resolver::new(registry.clone());

    let engine_config = EngineConfig { poll_interval: config.poll_interval, batch_size: config.batch_size as i64 };
    let engine = OrchestrationEngine::new(resource_repo, resolver.clone(), executor.clone(), workflow_loader, graph.clone(), engine_config, wake.clone());

    let state = Arc::new(AppState { specs, resources, graph, executor, registry, resolver, pubsub, wake, providers_dir: config.providers_dir.clone() });

    Ok((state, engine))
}

/// Every immediate subdirectory of `providers_dir` is treated as one
/// filesystem-backed provider (spec.md §4.3). Git-backed sources are not
/// yet environment-configurable; this mirrors the teacher's own daemon,
/// which also only wires filesystem sources from its config.
fn scan_providers_dir(providers_dir: &std::path::Path) -> Vec<ProviderSource> {
    let mut sources = Vec::new();
    let Ok(entries) = std::fs::read_dir(providers_dir) else {
        tracing::warn!(dir = %providers_dir.display(), "providers directory not readable, starting with an empty registry");
        return sources;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            sources.push(ProviderSource::Filesystem { path });
        }
    }
    sources
}
