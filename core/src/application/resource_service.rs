// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Resource state-transition use case.
//!
//! Validates a proposed transition against the state machine before asking
//! the repository to apply it; the repository performs the transition,
//! audit row, and any resource-owned graph update in one transaction
//! (spec.md §4.1). Illegal transitions never reach the repository.

use std::sync::Arc;

use crate::domain::execution::WorkflowExecutionId;
use crate::domain::repository::{ResourceDependencyRepository, ResourceRepository, RepositoryError};
use crate::domain::resource::{HealthCheckRecord, NewHealthCheckRecord, NewResource, Resource, ResourceError, ResourceId, ResourceState, StateTransitionRecord};
use crate::error::CoreError;

pub struct ResourceService {
    resources: Arc<dyn ResourceRepository>,
    dependencies: Arc<dyn ResourceDependencyRepository>,
}

impl ResourceService {
    pub fn new(resources: Arc<dyn ResourceRepository>, dependencies: Arc<dyn ResourceDependencyRepository>) -> Self {
        Self { resources, dependencies }
    }

    pub async fn get(&self, id: ResourceId) -> Result<Resource, CoreError> {
        self.resources.find_by_id(id).await.map_err(CoreError::from)?.ok_or(ResourceError::NotFound(id)).map_err(CoreError::from)
    }

    pub async fn declare(&self, new_resource: NewResource) -> Result<Resource, CoreError> {
        self.resources.insert(new_resource).await.map_err(CoreError::from)
    }

    /// Validates then applies a transition, rejecting illegal ones with
    /// `INVALID_TRANSITION` before ever reaching the store (spec.md §4.2, P1).
    /// The repository re-validates under lock regardless, since this
    /// pre-check reads an earlier, unlocked snapshot.
    #[allow(clippy::too_many_arguments)]
    pub async fn transition(
        &self,
        id: ResourceId,
        to: ResourceState,
        reason: Option<String>,
        actor: &str,
        provider: Option<&str>,
        workflow_execution_id: Option<WorkflowExecutionId>,
        error_message: Option<String>,
    ) -> Result<(Resource, StateTransitionRecord), CoreError> {
        let current = self.get(id).await?;
        current.validate_transition(to).map_err(CoreError::from)?;
        self.resources.transition_state(id, to, reason, actor, provider, workflow_execution_id, error_message).await.map_err(CoreError::from)
    }

    pub async fn retry(&self, id: ResourceId, actor: &str) -> Result<(Resource, StateTransitionRecord), CoreError> {
        self.transition(id, ResourceState::Provisioning, Some("manual retry".to_string()), actor, None, None, None).await
    }

    pub async fn history(&self, id: ResourceId) -> Result<Vec<StateTransitionRecord>, RepositoryError> {
        self.resources.list_transitions(id).await
    }

    pub async fn list_dependencies(&self, id: ResourceId) -> Result<Vec<crate::domain::dependency::ResourceDependency>, RepositoryError> {
        self.dependencies.list_for_resource(id).await
    }

    /// Records a health probe result and updates the resource's `health`
    /// field (spec.md §3). Never validated against the resource state
    /// machine — health is an orthogonal, continuously-sampled signal.
    pub async fn record_health_check(&self, check: NewHealthCheckRecord) -> Result<HealthCheckRecord, CoreError> {
        self.resources.record_health_check(check).await.map_err(CoreError::from)
    }

    pub async fn health_history(&self, id: ResourceId, limit: i64) -> Result<Vec<HealthCheckRecord>, RepositoryError> {
        self.resources.list_health_checks(id, limit).await
    }
}
