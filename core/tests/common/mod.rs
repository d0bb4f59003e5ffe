// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Shared test wiring: an in-memory SQLite pool, migrated, with every
//! repository behind its trait object so integration tests exercise the
//! same `Arc<dyn Trait>` seams the server binary does.

use std::sync::Arc;

use orchestrator_core::domain::repository::{
    GraphRepository, ResourceDependencyRepository, ResourceRepository, SpecRepository, StepExecutionRepository, WorkflowExecutionRepository,
};
use orchestrator_core::infrastructure::db::DbPool;
use orchestrator_core::infrastructure::repositories::{
    SqliteGraphRepository, SqliteResourceDependencyRepository, SqliteResourceRepository, SqliteSpecRepository, SqliteStepExecutionRepository,
    SqliteWorkflowExecutionRepository,
};

pub struct TestRepos {
    pub specs: Arc<dyn SpecRepository>,
    pub resources: Arc<dyn ResourceRepository>,
    pub dependencies: Arc<dyn ResourceDependencyRepository>,
    pub executions: Arc<dyn WorkflowExecutionRepository>,
    pub steps: Arc<dyn StepExecutionRepository>,
    pub graph: Arc<dyn GraphRepository>,
}

/// Connects a fresh `:memory:` SQLite database and applies migrations, the
/// same path `server::state::build` takes for `DB_DRIVER=sqlite`.
pub async fn setup() -> TestRepos {
    let pool = DbPool::connect("sqlite", "sqlite::memory:").await.expect("connect in-memory sqlite");
    pool.migrate().await.expect("apply migrations");
    let sq = pool.as_sqlite().expect("sqlite pool").clone();

    TestRepos {
        specs: Arc::new(SqliteSpecRepository::new(sq.clone())),
        resources: Arc::new(SqliteResourceRepository::new(sq.clone())),
        dependencies: Arc::new(SqliteResourceDependencyRepository::new(sq.clone())),
        executions: Arc::new(SqliteWorkflowExecutionRepository::new(sq.clone())),
        steps: Arc::new(SqliteStepExecutionRepository::new(sq.clone())),
        graph: Arc::new(SqliteGraphRepository::new(sq)),
    }
}
