// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0

// Repository Pattern - Storage Backend Abstraction
//
// One trait per aggregate root. Concrete implementations live in
// `infrastructure::repositories::{postgres,sqlite}_*` and share these
// interfaces so the application layer never depends on a specific backend.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::dependency::{NewResourceDependency, ResourceDependency, ResourceDependencyId};
use crate::domain::execution::{
    ExecutionStatus, NewStepExecution, NewWorkflowExecution, StepExecution, StepExecutionId, StepStatus, WorkflowExecution, WorkflowExecutionId,
};
use crate::domain::graph::{GraphAnnotation, GraphEdge, GraphNode, NodeKey};
use crate::domain::resource::{HealthCheckRecord, NewHealthCheckRecord, NewResource, Resource, ResourceId, ResourceState, StateTransitionRecord};
use crate::domain::spec::{NewSpec, Spec, SpecId};
use crate::error::ErrorCode;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("not found")]
    NotFound,
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("illegal state transition {from:?} -> {to:?}")]
    InvalidTransition { from: ResourceState, to: ResourceState },
}

impl crate::error::HasErrorCode for RepositoryError {
    fn code(&self) -> ErrorCode {
        match self {
            RepositoryError::NotFound => ErrorCode::ResourceNotFound,
            RepositoryError::Conflict(_) | RepositoryError::Database(_) => ErrorCode::Internal,
            RepositoryError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
        }
    }
}
crate::impl_core_error_from!(RepositoryError);

/// Repository interface for the Spec aggregate.
#[async_trait]
pub trait SpecRepository: Send + Sync {
    /// Insert, or replace in place if `name` already exists (spec.md §3).
    async fn upsert(&self, spec: NewSpec) -> Result<Spec, RepositoryError>;
    async fn find_by_id(&self, id: SpecId) -> Result<Option<Spec>, RepositoryError>;
    async fn find_by_name(&self, name: &str) -> Result<Option<Spec>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<Spec>, RepositoryError>;
    /// Deletes the spec and cascades to its resources and executions.
    async fn delete(&self, id: SpecId) -> Result<(), RepositoryError>;
}

/// Repository interface for the Resource aggregate.
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    async fn insert(&self, resource: NewResource) -> Result<Resource, RepositoryError>;
    async fn find_by_id(&self, id: ResourceId) -> Result<Option<Resource>, RepositoryError>;
    async fn find_by_app_and_name(&self, app_name: &str, resource_name: &str) -> Result<Option<Resource>, RepositoryError>;
    async fn list_by_app(&self, app_name: &str) -> Result<Vec<Resource>, RepositoryError>;
    async fn list_by_spec(&self, spec_id: SpecId) -> Result<Vec<Resource>, RepositoryError>;

    /// Claim up to `batch_size` resources in `requested` state with no
    /// owning execution, ordered by `created_at ASC` (spec.md §4.7). On the
    /// production backend this MUST use `SELECT ... FOR UPDATE SKIP LOCKED`.
    async fn claim_pending(&self, batch_size: i64) -> Result<Vec<Resource>, RepositoryError>;

    /// Applies a validated state transition, writes the audit row, and
    /// updates `provider`/`workflow_execution_id`/`error_message` as given,
    /// all in one transaction (spec.md §4.1). Re-validates
    /// `current.state.can_transition_to(to)` against the row locked inside
    /// this same transaction, returning `InvalidTransition` on failure —
    /// the caller's own pre-check is a fast-path, not the source of truth,
    /// since two concurrent callers can both pass it against the same
    /// stale snapshot. `provider`, when `Some`, is written to the resource
    /// row; when `None` the existing value (if any) is left untouched.
    async fn transition_state(
        &self,
        id: ResourceId,
        to: ResourceState,
        reason: Option<String>,
        actor: &str,
        provider: Option<&str>,
        workflow_execution_id: Option<WorkflowExecutionId>,
        error_message: Option<String>,
    ) -> Result<(Resource, StateTransitionRecord), RepositoryError>;

    async fn list_transitions(&self, id: ResourceId) -> Result<Vec<StateTransitionRecord>, RepositoryError>;
    async fn delete(&self, id: ResourceId) -> Result<(), RepositoryError>;

    /// Appends a health check row and updates `health`/`last_health_check_at`
    /// on the owning resource in one transaction (spec.md §3).
    async fn record_health_check(&self, check: NewHealthCheckRecord) -> Result<HealthCheckRecord, RepositoryError>;
    async fn list_health_checks(&self, id: ResourceId, limit: i64) -> Result<Vec<HealthCheckRecord>, RepositoryError>;
}

/// Repository interface for author-declared resource dependencies.
#[async_trait]
pub trait ResourceDependencyRepository: Send + Sync {
    async fn insert(&self, dep: NewResourceDependency) -> Result<ResourceDependency, RepositoryError>;
    async fn list_for_resource(&self, resource_id: ResourceId) -> Result<Vec<ResourceDependency>, RepositoryError>;
    async fn delete(&self, id: ResourceDependencyId) -> Result<(), RepositoryError>;
}

/// Repository interface for the WorkflowExecution aggregate.
#[async_trait]
pub trait WorkflowExecutionRepository: Send + Sync {
    /// Creates the execution row and its initial `pending` step rows in one
    /// transaction (spec.md §4.1).
    async fn create_with_steps(&self, execution: NewWorkflowExecution, steps: Vec<NewStepExecution>) -> Result<(WorkflowExecution, Vec<StepExecution>), RepositoryError>;

    async fn find_by_id(&self, id: WorkflowExecutionId) -> Result<Option<WorkflowExecution>, RepositoryError>;
    async fn list_by_app(&self, app_name: &str, limit: i64) -> Result<Vec<WorkflowExecution>, RepositoryError>;
    async fn set_status(&self, id: WorkflowExecutionId, status: ExecutionStatus, error_message: Option<String>) -> Result<WorkflowExecution, RepositoryError>;
}

/// Repository interface for the StepExecution aggregate.
#[async_trait]
pub trait StepExecutionRepository: Send + Sync {
    async fn insert(&self, step: NewStepExecution) -> Result<StepExecution, RepositoryError>;
    async fn list_for_execution(&self, execution_id: WorkflowExecutionId) -> Result<Vec<StepExecution>, RepositoryError>;
    async fn set_status(&self, id: StepExecutionId, status: StepStatus, error_message: Option<String>) -> Result<StepExecution, RepositoryError>;
    /// Appends a log chunk to `output_logs`, returning the full updated text.
    async fn append_log(&self, id: StepExecutionId, chunk: &str) -> Result<String, RepositoryError>;
    async fn merge_duration(&self, id: StepExecutionId, duration_ms: i64) -> Result<StepExecution, RepositoryError>;
}

/// Repository interface for the dependency graph projection (spec.md §4.8).
#[async_trait]
pub trait GraphRepository: Send + Sync {
    async fn upsert_node(&self, key: NodeKey, metadata: serde_json::Value) -> Result<GraphNode, RepositoryError>;
    async fn upsert_edge(&self, source: NodeKey, target: NodeKey, kind: crate::domain::graph::EdgeKind, metadata: serde_json::Value) -> Result<GraphEdge, RepositoryError>;
    async fn update_execution_timing(
        &self,
        key: &NodeKey,
        started_at: Option<chrono::DateTime<chrono::Utc>>,
        completed_at: Option<chrono::DateTime<chrono::Utc>>,
        duration_ms: Option<i64>,
    ) -> Result<GraphNode, RepositoryError>;
    async fn graph_for_app(&self, app_name: &str) -> Result<(Vec<GraphNode>, Vec<GraphEdge>), RepositoryError>;

    async fn add_annotation(&self, app_name: &str, node_id: &str, author: &str, text: &str) -> Result<GraphAnnotation, RepositoryError>;
    async fn list_annotations(&self, app_name: &str, node_id: &str) -> Result<Vec<GraphAnnotation>, RepositoryError>;
    async fn delete_annotation(&self, id: i64) -> Result<(), RepositoryError>;
}
