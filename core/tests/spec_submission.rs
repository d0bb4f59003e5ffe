// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! P2: submitting a Score spec declares its resources exactly once, and
//! resubmitting the same spec name replaces the spec row without
//! duplicating already-declared resources.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use orchestrator_core::application::graph_service::GraphService;
use orchestrator_core::application::spec_service::SpecService;
use orchestrator_core::domain::spec::{ContainerDecl, ResourceDecl, ScoreDocument, SpecMetadata, SCORE_API_VERSION};
use orchestrator_core::infrastructure::spec_parser::parse_score_yaml;

fn score_document(name: &str) -> ScoreDocument {
    let mut containers = HashMap::new();
    containers.insert("web".to_string(), ContainerDecl { image: "nginx:1.25".to_string(), env: HashMap::new(), extra: HashMap::new() });

    let mut resources = HashMap::new();
    resources.insert(
        "db".to_string(),
        ResourceDecl { resource_type: "postgres".to_string(), properties: serde_json::json!({"version": "15"}), metadata: HashMap::new(), provider: None },
    );

    ScoreDocument { api_version: SCORE_API_VERSION.to_string(), metadata: SpecMetadata { name: name.to_string(), product: None }, containers, resources }
}

#[tokio::test]
async fn submitting_a_spec_declares_its_resources() {
    let repos = common::setup().await;
    let graph = Arc::new(GraphService::new(repos.graph, repos.executions, repos.resources.clone(), repos.dependencies));
    let specs = SpecService::new(repos.specs, repos.resources.clone(), graph.clone());

    let new_spec = orchestrator_core::domain::spec::NewSpec { name: "api-1".to_string(), document: score_document("api-1"), team: None, submitted_by: "alice".to_string() };
    let spec = specs.submit(new_spec).await.expect("submit spec");
    assert_eq!(spec.name, "api-1");

    let declared = repos.resources.list_by_app("api-1").await.expect("list resources");
    assert_eq!(declared.len(), 1);
    assert_eq!(declared[0].resource_name, "db");
    assert_eq!(declared[0].resource_type, "postgres");

    let view = graph.graph_for_app("api-1").await.expect("graph for app");
    assert!(view.nodes.iter().any(|n| n.key.node_id == "spec:api-1"));
    assert!(view.nodes.iter().any(|n| n.key.node_id == "resource:api-1:db"));
}

#[tokio::test]
async fn resubmitting_the_same_spec_does_not_duplicate_resources() {
    let repos = common::setup().await;
    let graph = Arc::new(GraphService::new(repos.graph, repos.executions, repos.resources.clone(), repos.dependencies));
    let specs = SpecService::new(repos.specs, repos.resources.clone(), graph);

    for _ in 0..2 {
        let new_spec = orchestrator_core::domain::spec::NewSpec { name: "api-1".to_string(), document: score_document("api-1"), team: None, submitted_by: "alice".to_string() };
        specs.submit(new_spec).await.expect("submit spec");
    }

    let declared = repos.resources.list_by_app("api-1").await.expect("list resources");
    assert_eq!(declared.len(), 1, "resubmission must not insert a second 'db' resource row");
}

#[tokio::test]
async fn delegated_resource_without_provider_is_rejected_before_any_write() {
    let repos = common::setup().await;
    let graph = Arc::new(GraphService::new(repos.graph, repos.executions, repos.resources.clone(), repos.dependencies));
    let specs = SpecService::new(repos.specs, repos.resources.clone(), graph);

    let mut document = score_document("api-2");
    document.resources.insert("queue".to_string(), ResourceDecl { resource_type: "delegated".to_string(), properties: serde_json::Value::Null, metadata: HashMap::new(), provider: None });
    let new_spec = orchestrator_core::domain::spec::NewSpec { name: "api-2".to_string(), document, team: None, submitted_by: "alice".to_string() };

    assert!(specs.submit(new_spec).await.is_err());
    assert!(repos.resources.list_by_app("api-2").await.unwrap().is_empty());
}

#[tokio::test]
async fn parsed_yaml_round_trips_into_a_submittable_spec() {
    let repos = common::setup().await;
    let graph = Arc::new(GraphService::new(repos.graph, repos.executions, repos.resources.clone(), repos.dependencies));
    let specs = SpecService::new(repos.specs, repos.resources.clone(), graph);

    let raw = r#"
apiVersion: score.dev/v1b1
metadata:
  name: api-3
containers:
  web:
    image: nginx:1.25
resources:
  cache:
    type: redis
    properties:
      size_gb: 1
"#;
    let new_spec = parse_score_yaml(raw, "bob", Some("platform".to_string())).expect("parse score yaml");
    let spec = specs.submit(new_spec).await.expect("submit parsed spec");
    assert_eq!(spec.team.as_deref(), Some("platform"));

    let declared = repos.resources.list_by_app("api-3").await.expect("list resources");
    assert_eq!(declared.len(), 1);
    assert_eq!(declared[0].resource_type, "redis");
}
