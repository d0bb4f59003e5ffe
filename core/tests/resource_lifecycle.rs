// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! P1: resource state transitions are rejected or applied strictly per the
//! finite state machine, and every applied transition leaves an audit row.

mod common;

use std::collections::HashMap;

use orchestrator_core::application::resource_service::ResourceService;
use orchestrator_core::domain::resource::{NewResource, ResourceState, ResourceTypeClass};
use orchestrator_core::domain::spec::{NewSpec, ScoreDocument, SpecMetadata, SCORE_API_VERSION};

async fn seed_resource(repos: &common::TestRepos) -> orchestrator_core::domain::resource::Resource {
    let document = ScoreDocument { api_version: SCORE_API_VERSION.to_string(), metadata: SpecMetadata { name: "api-1".to_string(), product: None }, containers: HashMap::new(), resources: HashMap::new() };
    let spec = repos.specs.upsert(NewSpec { name: "api-1".to_string(), document, team: None, submitted_by: "alice".to_string() }).await.expect("upsert spec");

    repos
        .resources
        .insert(NewResource {
            spec_id: spec.id,
            app_name: "api-1".to_string(),
            resource_name: "db".to_string(),
            resource_type: "postgres".to_string(),
            properties: serde_json::json!({"version": "15"}),
            type_class: ResourceTypeClass::Native,
            reference_url: None,
            workflow_override: None,
            workflow_tags: vec![],
        })
        .await
        .expect("insert resource")
}

#[tokio::test]
async fn legal_transition_is_applied_and_recorded() {
    let repos = common::setup().await;
    let resource = seed_resource(&repos).await;
    let service = ResourceService::new(repos.resources, repos.dependencies);

    let (updated, record) = service.transition(resource.id, ResourceState::Provisioning, Some("claimed".to_string()), "orchestration-engine", None, None, None).await.expect("legal transition");
    assert_eq!(updated.state, ResourceState::Provisioning);
    assert_eq!(record.to_state, ResourceState::Provisioning);
    assert_eq!(record.from_state, Some(ResourceState::Requested));

    let history = service.history(resource.id).await.expect("history");
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn illegal_transition_is_rejected_before_reaching_the_store() {
    let repos = common::setup().await;
    let resource = seed_resource(&repos).await;
    let service = ResourceService::new(repos.resources, repos.dependencies);

    let err = service.transition(resource.id, ResourceState::Active, None, "orchestration-engine", None, None, None).await.unwrap_err();
    assert_eq!(err.code, orchestrator_core::error::ErrorCode::InvalidTransition);

    // No audit row should have been written for a rejected transition.
    assert!(service.history(resource.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn retry_transitions_a_failed_resource_back_to_provisioning() {
    let repos = common::setup().await;
    let resource = seed_resource(&repos).await;
    let service = ResourceService::new(repos.resources, repos.dependencies);

    service.transition(resource.id, ResourceState::Provisioning, None, "orchestration-engine", None, None, None).await.unwrap();
    service.transition(resource.id, ResourceState::Failed, Some("boom".to_string()), "orchestration-engine", None, None, Some("boom".to_string())).await.unwrap();

    let (retried, record) = service.retry(resource.id, "alice").await.expect("retry");
    assert_eq!(retried.state, ResourceState::Provisioning);
    assert_eq!(record.reason.as_deref(), Some("manual retry"));
    assert_eq!(record.actor, "alice");
}

#[tokio::test]
async fn repository_rejects_an_illegal_transition_even_when_called_directly() {
    // The service layer pre-validates against an earlier snapshot; the
    // repository must not trust that and re-check under its own lock
    // (otherwise two racing callers could each pass the service's
    // pre-check and both commit incompatible updates).
    let repos = common::setup().await;
    let resource = seed_resource(&repos).await;

    let err = repos.resources.transition_state(resource.id, ResourceState::Active, None, "orchestration-engine", None, None, None).await.unwrap_err();
    assert!(matches!(err, orchestrator_core::domain::repository::RepositoryError::InvalidTransition { .. }));
}

#[tokio::test]
async fn transitioning_out_of_requested_records_the_provider() {
    let repos = common::setup().await;
    let resource = seed_resource(&repos).await;
    assert_eq!(resource.provider, None);

    let (updated, _) = repos
        .resources
        .transition_state(resource.id, ResourceState::Provisioning, Some("claimed".to_string()), "orchestration-engine", Some("database-team"), None, None)
        .await
        .expect("legal transition");
    assert_eq!(updated.provider.as_deref(), Some("database-team"));

    // A later transition that doesn't pass a provider leaves it intact.
    let (updated, _) = repos.resources.transition_state(resource.id, ResourceState::Active, None, "orchestration-engine", None, None, None).await.expect("legal transition");
    assert_eq!(updated.provider.as_deref(), Some("database-team"));
}

#[tokio::test]
async fn health_checks_are_recorded_and_listed_most_recent_last() {
    let repos = common::setup().await;
    let resource = seed_resource(&repos).await;
    let service = ResourceService::new(repos.resources, repos.dependencies);

    for status in [orchestrator_core::domain::resource::HealthStatus::Unknown, orchestrator_core::domain::resource::HealthStatus::Healthy] {
        service
            .record_health_check(orchestrator_core::domain::resource::NewHealthCheckRecord {
                resource_id: resource.id,
                check_type: "liveness".to_string(),
                status,
                latency_ms: Some(12),
                error: None,
                metrics: None,
            })
            .await
            .expect("record health check");
    }

    let history = service.health_history(resource.id, 10).await.expect("health history");
    assert_eq!(history.len(), 2);
}
