// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Resource Domain Model
//!
//! A [`Resource`] is one declared resource instance within a
//! [`Spec`](crate::domain::spec::Spec), identified by `(application, name)`.
//! Its lifecycle is a strict finite state machine (spec.md §4.2); illegal
//! transitions are rejected rather than silently clamped.
//!
//! # Invariants
//!
//! - State transitions must walk the graph in [`ResourceState::can_transition_to`].
//! - The orchestration claim is `state == Requested && workflow_execution_id.is_none()`.
//! - `reference_url`/`external_state`/`last_sync` are set only when `type_class == Delegated`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::execution::WorkflowExecutionId;
use crate::domain::spec::SpecId;
use crate::error::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub i64);

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state machine (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Requested,
    Provisioning,
    Active,
    Scaling,
    Updating,
    Degraded,
    Terminating,
    Terminated,
    Failed,
}

impl ResourceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceState::Requested => "requested",
            ResourceState::Provisioning => "provisioning",
            ResourceState::Active => "active",
            ResourceState::Scaling => "scaling",
            ResourceState::Updating => "updating",
            ResourceState::Degraded => "degraded",
            ResourceState::Terminating => "terminating",
            ResourceState::Terminated => "terminated",
            ResourceState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "requested" => ResourceState::Requested,
            "provisioning" => ResourceState::Provisioning,
            "active" => ResourceState::Active,
            "scaling" => ResourceState::Scaling,
            "updating" => ResourceState::Updating,
            "degraded" => ResourceState::Degraded,
            "terminating" => ResourceState::Terminating,
            "terminated" => ResourceState::Terminated,
            "failed" => ResourceState::Failed,
            _ => return None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ResourceState::Terminated)
    }

    /// Allowed transitions (spec.md §4.2). All others reject with
    /// `INVALID_TRANSITION`.
    pub fn can_transition_to(&self, to: ResourceState) -> bool {
        use ResourceState::*;
        matches!(
            (self, to),
            (Requested, Provisioning)
                | (Requested, Failed)
                | (Provisioning, Active)
                | (Provisioning, Failed)
                | (Active, Scaling)
                | (Active, Updating)
                | (Active, Degraded)
                | (Active, Terminating)
                | (Active, Failed)
                | (Scaling, Active)
                | (Scaling, Failed)
                | (Updating, Active)
                | (Updating, Failed)
                | (Degraded, Active)
                | (Degraded, Terminating)
                | (Degraded, Failed)
                | (Terminating, Terminated)
                | (Terminating, Failed)
                | (Failed, Provisioning)
                | (Failed, Terminating)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl Default for HealthStatus {
    fn default() -> Self {
        HealthStatus::Unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceTypeClass {
    Native,
    Delegated,
    External,
}

impl Default for ResourceTypeClass {
    fn default() -> Self {
        ResourceTypeClass::Native
    }
}

/// Independent external-system state machine (delegated resources only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ExternalState {
    WaitingExternal,
    BuildingExternal,
    Healthy,
    Error,
    Unknown,
}

impl ExternalState {
    pub fn can_transition_to(&self, to: ExternalState) -> bool {
        use ExternalState::*;
        if to == Unknown {
            return true;
        }
        matches!((self, to), (WaitingExternal, BuildingExternal) | (BuildingExternal, Healthy) | (BuildingExternal, Error))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredOperation {
    Create,
    Read,
    Update,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub spec_id: SpecId,
    pub app_name: String,
    pub resource_name: String,
    pub resource_type: String,
    pub state: ResourceState,
    pub health: HealthStatus,
    pub properties: serde_json::Value,
    pub provider: Option<String>,
    pub provider_metadata: Option<serde_json::Value>,
    pub type_class: ResourceTypeClass,
    pub external_state: Option<ExternalState>,
    pub reference_url: Option<String>,
    pub last_sync: Option<DateTime<Utc>>,
    pub desired_operation: Option<DesiredOperation>,
    pub workflow_override: Option<String>,
    pub workflow_tags: Vec<String>,
    pub workflow_execution_id: Option<WorkflowExecutionId>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_health_check_at: Option<DateTime<Utc>>,
}

impl Resource {
    /// The orchestration engine's claim predicate (spec.md §3, §4.7).
    pub fn is_claimable(&self) -> bool {
        self.state == ResourceState::Requested && self.workflow_execution_id.is_none()
    }

    /// Validate (but do not apply) a proposed state transition.
    pub fn validate_transition(&self, to: ResourceState) -> Result<(), ResourceError> {
        if !self.state.can_transition_to(to) {
            return Err(ResourceError::InvalidTransition { from: self.state, to });
        }
        Ok(())
    }

    pub fn validate_external_transition(&self, to: ExternalState) -> Result<(), ResourceError> {
        if self.type_class != ResourceTypeClass::Delegated {
            return Err(ResourceError::NotDelegated);
        }
        let current = self.external_state.unwrap_or(ExternalState::Unknown);
        if !current.can_transition_to(to) {
            return Err(ResourceError::InvalidExternalTransition { from: current, to });
        }
        Ok(())
    }
}

/// Not-yet-persisted form of a resource, as declared in a spec.
#[derive(Debug, Clone)]
pub struct NewResource {
    pub spec_id: SpecId,
    pub app_name: String,
    pub resource_name: String,
    pub resource_type: String,
    pub properties: serde_json::Value,
    pub type_class: ResourceTypeClass,
    pub reference_url: Option<String>,
    pub workflow_override: Option<String>,
    pub workflow_tags: Vec<String>,
}

/// Append-only audit row created in the same transaction as a state change
/// (spec.md §3 "State transition record", §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransitionRecord {
    pub id: i64,
    pub resource_id: ResourceId,
    pub from_state: Option<ResourceState>,
    pub to_state: ResourceState,
    pub reason: Option<String>,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

/// Append-only health check row (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckRecord {
    pub id: i64,
    pub resource_id: ResourceId,
    pub check_type: String,
    pub status: HealthStatus,
    pub latency_ms: Option<i64>,
    pub error: Option<String>,
    pub metrics: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// Not-yet-persisted form of a health check result.
#[derive(Debug, Clone)]
pub struct NewHealthCheckRecord {
    pub resource_id: ResourceId,
    pub check_type: String,
    pub status: HealthStatus,
    pub latency_ms: Option<i64>,
    pub error: Option<String>,
    pub metrics: Option<serde_json::Value>,
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("illegal state transition {from:?} -> {to:?}")]
    InvalidTransition { from: ResourceState, to: ResourceState },
    #[error("illegal external state transition {from:?} -> {to:?}")]
    InvalidExternalTransition { from: ExternalState, to: ExternalState },
    #[error("resource is not of type_class=delegated")]
    NotDelegated,
    #[error("resource not found: {0}")]
    NotFound(ResourceId),
}

impl crate::error::HasErrorCode for ResourceError {
    fn code(&self) -> ErrorCode {
        match self {
            ResourceError::InvalidTransition { .. } | ResourceError::InvalidExternalTransition { .. } | ResourceError::NotDelegated => {
                ErrorCode::InvalidTransition
            }
            ResourceError::NotFound(_) => ErrorCode::ResourceNotFound,
        }
    }
}
crate::impl_core_error_from!(ResourceError);

/// Helper table used by tests and by [`ResourceState::can_transition_to`]
/// callers that want the full adjacency list (e.g. documentation generation).
pub fn all_states() -> &'static [ResourceState] {
    use ResourceState::*;
    &[Requested, Provisioning, Active, Scaling, Updating, Degraded, Terminating, Terminated, Failed]
}

pub type ResourceMetadata = HashMap<String, serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;

    fn resource_in(state: ResourceState) -> Resource {
        Resource {
            id: ResourceId(1),
            spec_id: SpecId(1),
            app_name: "api-1".into(),
            resource_name: "db".into(),
            resource_type: "postgres".into(),
            state,
            health: HealthStatus::Unknown,
            properties: serde_json::Value::Null,
            provider: None,
            provider_metadata: None,
            type_class: ResourceTypeClass::Native,
            external_state: None,
            reference_url: None,
            last_sync: None,
            desired_operation: None,
            workflow_override: None,
            workflow_tags: vec![],
            workflow_execution_id: None,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_health_check_at: None,
        }
    }

    // P1: every transition in the allowed graph succeeds, all others reject.
    #[test]
    fn requested_to_provisioning_is_legal() {
        let r = resource_in(ResourceState::Requested);
        assert!(r.validate_transition(ResourceState::Provisioning).is_ok());
    }

    #[test]
    fn requested_to_active_is_illegal() {
        let r = resource_in(ResourceState::Requested);
        assert!(matches!(r.validate_transition(ResourceState::Active), Err(ResourceError::InvalidTransition { .. })));
    }

    #[test]
    fn terminated_is_terminal_with_no_outgoing_transitions() {
        for &to in all_states() {
            let r = resource_in(ResourceState::Terminated);
            assert!(r.validate_transition(to).is_err(), "terminated -> {to:?} should be illegal");
        }
    }

    #[test]
    fn failed_can_retry_to_provisioning_or_terminate() {
        let r = resource_in(ResourceState::Failed);
        assert!(r.validate_transition(ResourceState::Provisioning).is_ok());
        assert!(r.validate_transition(ResourceState::Terminating).is_ok());
        assert!(r.validate_transition(ResourceState::Active).is_err());
    }

    #[test]
    fn claim_predicate_requires_requested_and_no_execution() {
        let mut r = resource_in(ResourceState::Requested);
        assert!(r.is_claimable());
        r.workflow_execution_id = Some(WorkflowExecutionId(7));
        assert!(!r.is_claimable());
    }

    #[test]
    fn external_state_machine_rejects_skipping_building() {
        let mut r = resource_in(ResourceState::Requested);
        r.type_class = ResourceTypeClass::Delegated;
        r.external_state = Some(ExternalState::WaitingExternal);
        assert!(r.validate_external_transition(ExternalState::Healthy).is_err());
        assert!(r.validate_external_transition(ExternalState::BuildingExternal).is_ok());
    }

    #[test]
    fn external_state_requires_delegated_type_class() {
        let r = resource_in(ResourceState::Requested);
        assert!(matches!(r.validate_external_transition(ExternalState::BuildingExternal), Err(ResourceError::NotDelegated)));
    }

    #[test]
    fn external_state_can_always_fall_back_to_unknown() {
        let mut r = resource_in(ResourceState::Requested);
        r.type_class = ResourceTypeClass::Delegated;
        r.external_state = Some(ExternalState::BuildingExternal);
        assert!(r.validate_external_transition(ExternalState::Unknown).is_ok());
    }
}
