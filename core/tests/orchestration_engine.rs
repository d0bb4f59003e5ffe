// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! P7: the orchestration engine claims a requested resource, resolves it
//! to a provider workflow, runs that workflow, and leaves the resource
//! in `active` or `failed` depending on the outcome.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use orchestrator_core::application::engine::{EngineConfig, OrchestrationEngine, WorkflowLoader};
use orchestrator_core::application::executor::{NullLogPublisher, WorkflowExecutor};
use orchestrator_core::application::graph_service::GraphService;
use orchestrator_core::application::registry::ProviderRegistry;
use orchestrator_core::application::resolver::Resolver;
use orchestrator_core::application::step_runner::StepRunnerRegistry;
use orchestrator_core::domain::provider::{Capabilities, CompatibilityWindow, ProviderManifest, ProviderMetadata, ProviderWorkflowRef, WorkflowCategory};
use orchestrator_core::domain::resource::{NewResource, ResourceState, ResourceTypeClass};
use orchestrator_core::domain::spec::{NewSpec, ScoreDocument, SpecMetadata, SCORE_API_VERSION};
use orchestrator_core::domain::workflow::{OnErrorMode, OnErrorPolicy, StepDef, WorkflowDocument, WorkflowMetadata, WORKFLOW_API_VERSION};
use orchestrator_core::infrastructure::step_runners::register_builtin_runners;
use tokio_util::sync::CancellationToken;

fn manifest(name: &str, resource_types: Vec<&str>, workflow_name: &str) -> ProviderManifest {
    ProviderManifest {
        api_version: "v1".into(),
        kind: "Provider".into(),
        metadata: ProviderMetadata { name: name.into(), version: "1.0.0".into(), category: None, description: None },
        compatibility: CompatibilityWindow::default(),
        capabilities: Capabilities { resource_types: resource_types.into_iter().map(String::from).collect() },
        workflows: vec![ProviderWorkflowRef { name: workflow_name.into(), file: format!("workflows/{workflow_name}.yaml"), version: None, description: None, category: WorkflowCategory::Provisioner, tags: vec![] }],
        source_root: None,
    }
}

/// Hands back a fixed in-memory document regardless of the reference,
/// so the engine test never touches the filesystem.
struct FixedWorkflowLoader {
    document: WorkflowDocument,
}

#[async_trait::async_trait]
impl WorkflowLoader for FixedWorkflowLoader {
    async fn load(&self, _provider_source_root: &str, _workflow_ref: &ProviderWorkflowRef) -> Result<WorkflowDocument, orchestrator_core::error::CoreError> {
        Ok(self.document.clone())
    }
}

fn passing_document() -> WorkflowDocument {
    WorkflowDocument {
        api_version: WORKFLOW_API_VERSION.to_string(),
        kind: "Workflow".to_string(),
        metadata: WorkflowMetadata { name: "provision-postgres".into(), description: None },
        parameters: vec![],
        steps: vec![StepDef {
            name: "check-name".to_string(),
            step_type: "validation".to_string(),
            config: serde_json::json!({"input": {"name": "db"}, "rules": [{"field": "name", "required": true}]}),
            env: HashMap::new(),
            when: None,
            if_expr: None,
            unless: None,
            outputs: vec![],
            on_error: OnErrorPolicy { mode: OnErrorMode::Fail, rollback_steps: vec![] },
        }],
    }
}

fn failing_document() -> WorkflowDocument {
    WorkflowDocument {
        api_version: WORKFLOW_API_VERSION.to_string(),
        kind: "Workflow".to_string(),
        metadata: WorkflowMetadata { name: "provision-postgres".into(), description: None },
        parameters: vec![],
        steps: vec![StepDef {
            name: "check-region".to_string(),
            step_type: "validation".to_string(),
            config: serde_json::json!({"input": {}, "rules": [{"field": "region", "required": true}]}),
            env: HashMap::new(),
            when: None,
            if_expr: None,
            unless: None,
            outputs: vec![],
            on_error: OnErrorPolicy { mode: OnErrorMode::Fail, rollback_steps: vec![] },
        }],
    }
}

async fn seed_requested_resource(repos: &common::TestRepos, app: &str) -> orchestrator_core::domain::resource::Resource {
    let document = ScoreDocument { api_version: SCORE_API_VERSION.to_string(), metadata: SpecMetadata { name: app.to_string(), product: None }, containers: HashMap::new(), resources: HashMap::new() };
    let spec = repos.specs.upsert(NewSpec { name: app.to_string(), document, team: None, submitted_by: "alice".to_string() }).await.expect("upsert spec");

    repos
        .resources
        .insert(NewResource {
            spec_id: spec.id,
            app_name: app.to_string(),
            resource_name: "db".to_string(),
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

fn engine_with_document(repos: &common::TestRepos, document: WorkflowDocument) -> OrchestrationEngine {
    let registry = ProviderRegistry::new(vec![manifest("database-team", vec!["postgres"], "provision-postgres")], semver::Version::new(1, 0, 0)).expect("build registry");
    let resolver = Resolver::new(registry);

    let mut runners = StepRunnerRegistry::new();
    register_builtin_runners(&mut runners);
    let executor = Arc::new(WorkflowExecutor::new(runners, repos.executions.clone(), repos.steps.clone(), Arc::new(NullLogPublisher)));

    let graph = Arc::new(GraphService::new(repos.graph.clone(), repos.executions.clone(), repos.resources.clone(), repos.dependencies.clone()));
    let loader: Arc<dyn WorkflowLoader> = Arc::new(FixedWorkflowLoader { document });

    OrchestrationEngine::new(repos.resources.clone(), resolver, executor, loader, graph, EngineConfig { poll_interval: Duration::from_secs(3600), batch_size: 10 }, Arc::new(tokio::sync::Notify::new()))
}

/// Polls until the resource leaves `provisioning`, since the engine spawns
/// the workflow execution off the tick's critical path.
async fn wait_for_terminal_state(repos: &common::TestRepos, id: orchestrator_core::domain::resource::ResourceId) -> orchestrator_core::domain::resource::Resource {
    for _ in 0..200 {
        let resource = repos.resources.find_by_id(id).await.unwrap().expect("resource exists");
        if resource.state != ResourceState::Provisioning && resource.state != ResourceState::Requested {
            return resource;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("resource never left provisioning within the test deadline");
}

#[tokio::test]
async fn a_claimed_resource_is_provisioned_to_active_on_a_successful_workflow() {
    let repos = common::setup().await;
    let resource = seed_requested_resource(&repos, "api-1").await;
    let engine = engine_with_document(&repos, passing_document());

    let claimed = engine.tick(CancellationToken::new()).await.expect("tick");
    assert_eq!(claimed, 0); // tick's return value is a placeholder; state is the real signal.

    let settled = wait_for_terminal_state(&repos, resource.id).await;
    assert_eq!(settled.state, ResourceState::Active);
    assert!(settled.workflow_execution_id.is_some());
    assert_eq!(settled.provider.as_deref(), Some("database-team"));
}

#[tokio::test]
async fn a_claimed_resource_is_marked_failed_when_its_workflow_fails() {
    let repos = common::setup().await;
    let resource = seed_requested_resource(&repos, "api-1").await;
    let engine = engine_with_document(&repos, failing_document());

    engine.tick(CancellationToken::new()).await.expect("tick");

    let settled = wait_for_terminal_state(&repos, resource.id).await;
    assert_eq!(settled.state, ResourceState::Failed);
}

#[tokio::test]
async fn an_unresolvable_resource_type_is_marked_failed_without_touching_the_workflow_loader() {
    let repos = common::setup().await;
    let resource = seed_requested_resource(&repos, "api-1").await;

    // "redis" has no claiming provider in this registry.
    let registry = ProviderRegistry::new(vec![manifest("database-team", vec!["mysql"], "provision-mysql")], semver::Version::new(1, 0, 0)).expect("build registry");
    let resolver = Resolver::new(registry);
    let mut runners = StepRunnerRegistry::new();
    register_builtin_runners(&mut runners);
    let executor = Arc::new(WorkflowExecutor::new(runners, repos.executions.clone(), repos.steps.clone(), Arc::new(NullLogPublisher)));
    let graph = Arc::new(GraphService::new(repos.graph.clone(), repos.executions.clone(), repos.resources.clone(), repos.dependencies.clone()));
    let loader: Arc<dyn WorkflowLoader> = Arc::new(FixedWorkflowLoader { document: passing_document() });
    let engine = OrchestrationEngine::new(repos.resources.clone(), resolver, executor, loader, graph, EngineConfig { poll_interval: Duration::from_secs(3600), batch_size: 10 }, Arc::new(tokio::sync::Notify::new()));

    engine.tick(CancellationToken::new()).await.expect("tick");

    let settled = repos.resources.find_by_id(resource.id).await.unwrap().expect("resource exists");
    assert_eq!(settled.state, ResourceState::Failed);
    assert!(settled.workflow_execution_id.is_none());
    assert!(settled.provider.is_none());
}
