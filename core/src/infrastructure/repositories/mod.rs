// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Repository Implementations
//!
//! Infrastructure-layer implementations of the repository traits defined in
//! `domain::repository`. Each aggregate gets one file holding both a
//! PostgreSQL and a SQLite implementation side by side, since the two share
//! the same schema shape and differ only in bind-parameter syntax and JSON
//! encoding (spec.md §4.1).
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve domain aggregates
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)

pub mod graph_repository;
pub mod resource_dependency_repository;
pub mod resource_repository;
pub mod spec_repository;
pub mod step_execution_repository;
pub mod workflow_execution_repository;

pub use graph_repository::{PgGraphRepository, SqliteGraphRepository};
pub use resource_dependency_repository::{PgResourceDependencyRepository, SqliteResourceDependencyRepository};
pub use resource_repository::{PgResourceRepository, SqliteResourceRepository};
pub use spec_repository::{PgSpecRepository, SqliteSpecRepository};
pub use step_execution_repository::{PgStepExecutionRepository, SqliteStepExecutionRepository};
pub use workflow_execution_repository::{PgWorkflowExecutionRepository, SqliteWorkflowExecutionRepository};
