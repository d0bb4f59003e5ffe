// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! P8/P9: the dependency graph is a projection of spec/resource/workflow
//! events — it can be rebuilt from the source-of-truth tables, and the
//! critical path query returns the longest weighted chain from a root.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use orchestrator_core::application::graph_service::GraphService;
use orchestrator_core::domain::execution::{ExecutionStatus, NewStepExecution, NewWorkflowExecution};
use orchestrator_core::domain::graph::{EdgeKind, NodeType};
use orchestrator_core::domain::resource::{NewResource, Resource, ResourceState, ResourceTypeClass};
use orchestrator_core::domain::spec::{NewSpec, ScoreDocument, SpecMetadata, SCORE_API_VERSION};

async fn seed_spec_and_resource(repos: &common::TestRepos, app: &str, resource_name: &str) -> Resource {
    let document = ScoreDocument { api_version: SCORE_API_VERSION.to_string(), metadata: SpecMetadata { name: app.to_string(), product: None }, containers: HashMap::new(), resources: HashMap::new() };
    let spec = repos.specs.upsert(NewSpec { name: app.to_string(), document, team: None, submitted_by: "alice".to_string() }).await.expect("upsert spec");

    repos
        .resources
        .insert(NewResource {
            spec_id: spec.id,
            app_name: app.to_string(),
            resource_name: resource_name.to_string(),
            resource_type: "postgres".to_string(),
            properties: serde_json::Value::Null,
            type_class: ResourceTypeClass::Native,
            reference_url: None,
            workflow_override: None,
            workflow_tags: vec![],
        })
        .await
        .expect("insert resource")
}

fn graph_service(repos: &common::TestRepos) -> GraphService {
    GraphService::new(repos.graph.clone(), repos.executions.clone(), repos.resources.clone(), repos.dependencies.clone())
}

#[tokio::test]
async fn recording_a_claim_adds_a_provider_node_and_requires_edge() {
    let repos = common::setup().await;
    let service = graph_service(&repos);
    let resource = seed_spec_and_resource(&repos, "api-1", "db").await;

    service.record_spec("api-1", &["db".to_string()]).await;
    service.record_claim(&resource, "postgres-operator").await;

    let view = service.graph_for_app("api-1").await.expect("graph for app");
    assert!(view.nodes.iter().any(|n| n.key.node_type == NodeType::Provider && n.key.node_id == "provider:postgres-operator"));
    assert!(view
        .edges
        .iter()
        .any(|e| e.kind == EdgeKind::Requires && e.source.node_id == "resource:api-1:db" && e.target.node_id == "provider:postgres-operator"));
}

#[tokio::test]
async fn rebuild_for_app_reconstructs_the_projection_from_the_source_of_truth() {
    let repos = common::setup().await;
    let service = graph_service(&repos);
    let resource = seed_spec_and_resource(&repos, "api-1", "db").await;

    // Drive the resource straight through the repository, bypassing the
    // graph entirely, as if the projection had never been written.
    let (_, _) = repos
        .resources
        .transition_state(resource.id, ResourceState::Provisioning, None, "orchestration-engine", Some("postgres-operator"), None, None)
        .await
        .expect("transition to provisioning");

    let (execution, _) = repos.executions.create_with_steps(NewWorkflowExecution::fresh("api-1", "provision-postgres", 1), vec![]).await.expect("create execution");
    repos.resources.transition_state(resource.id, ResourceState::Active, None, "orchestration-engine", None, Some(execution.id), None).await.expect("transition to active");

    let view = service.rebuild_for_app("api-1").await.expect("rebuild for app");
    assert!(view.nodes.iter().any(|n| n.key.node_id == "spec:api-1"));
    assert!(view.nodes.iter().any(|n| n.key.node_id == "resource:api-1:db"));
    assert!(view.nodes.iter().any(|n| n.key.node_id == "provider:postgres-operator"));
    assert!(view
        .edges
        .iter()
        .any(|e| e.kind == EdgeKind::Requires && e.source.node_id == "resource:api-1:db" && e.target.node_id == "provider:postgres-operator"));
    assert!(view.nodes.iter().any(|n| n.key.node_id == format!("workflow:{}", execution.id)));
    assert!(view.edges.iter().any(|e| e.kind == EdgeKind::Executes && e.target.node_id == format!("workflow:{}", execution.id)));
}

#[tokio::test]
async fn critical_path_follows_the_longest_recorded_workflow_duration() {
    let repos = common::setup().await;
    let service = graph_service(&repos);

    service.record_spec("api-1", &["db".to_string(), "cache".to_string()]).await;

    // "db" gets a slow workflow, "cache" a fast one; the critical path must
    // follow the slow branch even though both hang off the same spec.
    let (slow, _) = repos
        .executions
        .create_with_steps(
            NewWorkflowExecution::fresh("api-1", "provision-postgres", 1),
            vec![NewStepExecution { execution_id: orchestrator_core::domain::execution::WorkflowExecutionId(0), step_number: 1, step_name: "apply".into(), step_type: "terraform".into(), config: serde_json::Value::Null }],
        )
        .await
        .unwrap();
    let (fast, _) = repos.executions.create_with_steps(NewWorkflowExecution::fresh("api-1", "provision-redis", 1), vec![]).await.unwrap();

    service.record_workflow_node(slow.id).await;
    service.record_workflow_node(fast.id).await;
    repos.graph.upsert_edge(orchestrator_core::domain::graph::NodeKey::resource("api-1", "db"), orchestrator_core::domain::graph::NodeKey::workflow(slow.id.0), EdgeKind::Executes, serde_json::Value::Null).await.unwrap();
    repos.graph.upsert_edge(orchestrator_core::domain::graph::NodeKey::resource("api-1", "cache"), orchestrator_core::domain::graph::NodeKey::workflow(fast.id.0), EdgeKind::Executes, serde_json::Value::Null).await.unwrap();

    let slow_completed = repos.executions.set_status(slow.id, ExecutionStatus::Completed, None).await.unwrap();
    let fast_completed = repos.executions.set_status(fast.id, ExecutionStatus::Completed, None).await.unwrap();

    // Force a real timing gap: update with an explicit, larger duration by
    // recording the execution as it stands (already completed, so
    // `completed_at - started_at` alone may be near zero in a fast test
    // run) and then directly widen the slow node's duration.
    service.record_execution_timing(&slow_completed).await;
    service.record_execution_timing(&fast_completed).await;
    repos.graph.update_execution_timing(&orchestrator_core::domain::graph::NodeKey::workflow(slow.id.0), slow_completed.started_at.into(), slow_completed.completed_at, Some(500)).await.unwrap();
    repos.graph.update_execution_timing(&orchestrator_core::domain::graph::NodeKey::workflow(fast.id.0), fast_completed.started_at.into(), fast_completed.completed_at, Some(5)).await.unwrap();

    let result = service.critical_path("api-1").await.expect("critical path");
    assert_eq!(result.path.last().unwrap(), &format!("workflow:{}", slow.id));
    assert!(result.total_weight_ms >= 500);
}

#[tokio::test]
async fn annotations_are_listed_and_only_the_author_or_an_admin_may_delete() {
    let repos = common::setup().await;
    let service = graph_service(&repos);
    service.record_spec("api-1", &["db".to_string()]).await;

    let annotation = service.add_annotation("api-1", "resource:api-1:db", "alice", "this one flaps under load").await.expect("add annotation");

    let listed = service.list_annotations("api-1", "resource:api-1:db").await.expect("list annotations");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].text, "this one flaps under load");

    let denied = service.delete_annotation(&annotation, "bob", false).await;
    assert!(denied.is_err());

    service.delete_annotation(&annotation, "alice", false).await.expect("author may delete");
    assert!(service.list_annotations("api-1", "resource:api-1:db").await.unwrap().is_empty());
}
