// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! P4/P5/P6: the executor drives a workflow document step by step,
//! respects `on_error` policy on failure, and resumes a retried execution
//! from its first failed step rather than re-running everything.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use orchestrator_core::application::executor::{NullLogPublisher, WorkflowExecutor};
use orchestrator_core::application::step_runner::StepRunnerRegistry;
use orchestrator_core::domain::execution::{ExecutionStatus, StepStatus};
use orchestrator_core::domain::workflow::{OnErrorMode, OnErrorPolicy, StepDef, WorkflowDocument, WorkflowMetadata, WORKFLOW_API_VERSION};
use orchestrator_core::infrastructure::step_runners::register_builtin_runners;
use tokio_util::sync::CancellationToken;

fn validation_step(name: &str, rules: serde_json::Value, on_error: OnErrorMode) -> StepDef {
    StepDef {
        name: name.to_string(),
        step_type: "validation".to_string(),
        config: serde_json::json!({"input": {"name": "db"}, "rules": rules}),
        env: HashMap::new(),
        when: None,
        if_expr: None,
        unless: None,
        outputs: vec![],
        on_error: OnErrorPolicy { mode: on_error, rollback_steps: vec![] },
    }
}

fn registry() -> StepRunnerRegistry {
    let mut registry = StepRunnerRegistry::new();
    register_builtin_runners(&mut registry);
    registry
}

fn executor(repos: &common::TestRepos) -> WorkflowExecutor {
    WorkflowExecutor::new(registry(), repos.executions.clone(), repos.steps.clone(), Arc::new(NullLogPublisher))
}

#[tokio::test]
async fn every_step_completes_when_all_rules_pass() {
    let repos = common::setup().await;
    let executor = executor(&repos);

    let doc = WorkflowDocument {
        api_version: WORKFLOW_API_VERSION.to_string(),
        kind: "Workflow".to_string(),
        metadata: WorkflowMetadata { name: "provision-postgres".into(), description: None },
        parameters: vec![],
        steps: vec![
            validation_step("check-name", serde_json::json!([{"field": "name", "required": true}]), OnErrorMode::Fail),
            validation_step("check-pattern", serde_json::json!([{"field": "name", "pattern": "^[a-z]+$"}]), OnErrorMode::Fail),
        ],
    };

    let exec_id = executor.start("api-1", &doc, HashMap::new(), HashMap::new(), CancellationToken::new()).await.expect("start workflow");

    let execution = repos.executions.find_by_id(exec_id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(execution.completed_at.is_some());

    let steps = repos.steps.list_for_execution(exec_id).await.unwrap();
    assert_eq!(steps.len(), 2);
    assert!(steps.iter().all(|s| s.status == StepStatus::Completed));
}

#[tokio::test]
async fn on_error_fail_stops_the_workflow_and_marks_it_failed() {
    let repos = common::setup().await;
    let executor = executor(&repos);

    let doc = WorkflowDocument {
        api_version: WORKFLOW_API_VERSION.to_string(),
        kind: "Workflow".to_string(),
        metadata: WorkflowMetadata { name: "provision-postgres".into(), description: None },
        parameters: vec![],
        steps: vec![
            validation_step("check-region", serde_json::json!([{"field": "region", "required": true}]), OnErrorMode::Fail),
            validation_step("check-name", serde_json::json!([{"field": "name", "required": true}]), OnErrorMode::Fail),
        ],
    };

    let exec_id = executor.start("api-1", &doc, HashMap::new(), HashMap::new(), CancellationToken::new()).await.expect("start workflow");

    let execution = repos.executions.find_by_id(exec_id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);

    let steps = repos.steps.list_for_execution(exec_id).await.unwrap();
    let first = steps.iter().find(|s| s.step_name == "check-region").unwrap();
    let second = steps.iter().find(|s| s.step_name == "check-name").unwrap();
    assert_eq!(first.status, StepStatus::Failed);
    // Never reached: the run loop breaks on the first on_error::Fail step.
    assert_eq!(second.status, StepStatus::Pending);
}

#[tokio::test]
async fn on_error_continue_runs_every_step_despite_a_failure() {
    let repos = common::setup().await;
    let executor = executor(&repos);

    let doc = WorkflowDocument {
        api_version: WORKFLOW_API_VERSION.to_string(),
        kind: "Workflow".to_string(),
        metadata: WorkflowMetadata { name: "best-effort-checks".into(), description: None },
        parameters: vec![],
        steps: vec![
            validation_step("check-region", serde_json::json!([{"field": "region", "required": true}]), OnErrorMode::Continue),
            validation_step("check-name", serde_json::json!([{"field": "name", "required": true}]), OnErrorMode::Fail),
        ],
    };

    let exec_id = executor.start("api-1", &doc, HashMap::new(), HashMap::new(), CancellationToken::new()).await.expect("start workflow");

    let execution = repos.executions.find_by_id(exec_id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);

    let steps = repos.steps.list_for_execution(exec_id).await.unwrap();
    assert_eq!(steps.iter().find(|s| s.step_name == "check-region").unwrap().status, StepStatus::Failed);
    assert_eq!(steps.iter().find(|s| s.step_name == "check-name").unwrap().status, StepStatus::Completed);
}

#[tokio::test]
async fn retry_resumes_from_the_first_failed_step_and_skips_earlier_ones() {
    let repos = common::setup().await;
    let executor = executor(&repos);

    let doc = WorkflowDocument {
        api_version: WORKFLOW_API_VERSION.to_string(),
        kind: "Workflow".to_string(),
        metadata: WorkflowMetadata { name: "provision-postgres".into(), description: None },
        parameters: vec![],
        steps: vec![
            validation_step("check-name", serde_json::json!([{"field": "name", "required": true}]), OnErrorMode::Fail),
            validation_step("check-region", serde_json::json!([{"field": "region", "required": true}]), OnErrorMode::Fail),
        ],
    };

    let parent_id = executor.start("api-1", &doc, HashMap::new(), HashMap::new(), CancellationToken::new()).await.expect("start workflow");
    let parent_execution = repos.executions.find_by_id(parent_id).await.unwrap().unwrap();
    assert_eq!(parent_execution.status, ExecutionStatus::Failed);

    let retry_id = executor.retry(parent_id, None, CancellationToken::new()).await.expect("retry workflow");
    assert_ne!(retry_id, parent_id);

    let retry_execution = repos.executions.find_by_id(retry_id).await.unwrap().unwrap();
    assert_eq!(retry_execution.parent_execution_id, Some(parent_id));
    assert_eq!(retry_execution.retry_count, 1);
    // Still fails: the retry reruns the same unsatisfiable rule.
    assert_eq!(retry_execution.status, ExecutionStatus::Failed);

    let retry_steps = repos.steps.list_for_execution(retry_id).await.unwrap();
    let resumed_step = retry_steps.iter().find(|s| s.step_name == "check-region").unwrap();
    assert_eq!(resumed_step.status, StepStatus::Failed);

    // check-name is before the resume point (the lowest-numbered failed
    // step in the parent) and must be recorded as skipped, not re-run.
    let first_step = retry_steps.iter().find(|s| s.step_name == "check-name").unwrap();
    assert_eq!(first_step.status, StepStatus::Skipped);
}

#[tokio::test]
async fn retry_with_explicit_resume_from_step_overrides_the_default() {
    let repos = common::setup().await;
    let executor = executor(&repos);

    let doc = WorkflowDocument {
        api_version: WORKFLOW_API_VERSION.to_string(),
        kind: "Workflow".to_string(),
        metadata: WorkflowMetadata { name: "provision-postgres".into(), description: None },
        parameters: vec![],
        steps: vec![
            validation_step("check-name", serde_json::json!([{"field": "name", "required": true}]), OnErrorMode::Fail),
            validation_step("check-region", serde_json::json!([{"field": "region", "required": true}]), OnErrorMode::Fail),
        ],
    };

    let parent_id = executor.start("api-1", &doc, HashMap::new(), HashMap::new(), CancellationToken::new()).await.expect("start workflow");
    let retry_id = executor.retry(parent_id, Some(2), CancellationToken::new()).await.expect("retry from step 2");

    let retry_execution = repos.executions.find_by_id(retry_id).await.unwrap().unwrap();
    assert_eq!(retry_execution.resume_from_step, Some(2));

    let retry_steps = repos.steps.list_for_execution(retry_id).await.unwrap();
    assert_eq!(retry_steps.iter().find(|s| s.step_name == "check-name").unwrap().status, StepStatus::Skipped);
}

#[tokio::test]
async fn missing_required_parameter_fails_before_any_step_runs() {
    let repos = common::setup().await;
    let executor = executor(&repos);

    let doc = WorkflowDocument {
        api_version: WORKFLOW_API_VERSION.to_string(),
        kind: "Workflow".to_string(),
        metadata: WorkflowMetadata { name: "provision-postgres".into(), description: None },
        parameters: vec![orchestrator_core::domain::workflow::ParameterDef {
            name: "version".into(),
            param_type: orchestrator_core::domain::workflow::ParameterType::String,
            required: true,
            default: None,
            pattern: None,
            allowed_values: vec![],
            min: None,
            max: None,
        }],
        steps: vec![validation_step("check-name", serde_json::json!([{"field": "name", "required": true}]), OnErrorMode::Fail)],
    };

    let err = executor.start("api-1", &doc, HashMap::new(), HashMap::new(), CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, orchestrator_core::application::executor::ExecutorError::Workflow(_)));

    // Nothing should have been persisted: validation happens before create_with_steps.
    assert!(repos.executions.list_by_app("api-1", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn http_step_succeeds_against_a_mocked_endpoint_and_exposes_outputs() {
    let repos = common::setup().await;
    let executor = executor(&repos);

    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("GET", "/healthz").with_status(200).with_body("ok").create_async().await;

    let doc = WorkflowDocument {
        api_version: WORKFLOW_API_VERSION.to_string(),
        kind: "Workflow".to_string(),
        metadata: WorkflowMetadata { name: "check-endpoint".into(), description: None },
        parameters: vec![],
        steps: vec![StepDef {
            name: "ping".to_string(),
            step_type: "http".to_string(),
            config: serde_json::json!({"url": format!("{}/healthz", server.url())}),
            env: HashMap::new(),
            when: None,
            if_expr: None,
            unless: None,
            outputs: vec!["status".to_string(), "body".to_string()],
            on_error: OnErrorPolicy::default(),
        }],
    };

    let exec_id = executor.start("api-1", &doc, HashMap::new(), HashMap::new(), CancellationToken::new()).await.expect("start workflow");
    let execution = repos.executions.find_by_id(exec_id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    mock.assert_async().await;
}

#[tokio::test]
async fn http_step_failure_marks_the_workflow_failed() {
    let repos = common::setup().await;
    let executor = executor(&repos);

    let mut server = mockito::Server::new_async().await;
    server.mock("GET", "/healthz").with_status(500).create_async().await;

    let doc = WorkflowDocument {
        api_version: WORKFLOW_API_VERSION.to_string(),
        kind: "Workflow".to_string(),
        metadata: WorkflowMetadata { name: "check-endpoint".into(), description: None },
        parameters: vec![],
        steps: vec![StepDef {
            name: "ping".to_string(),
            step_type: "http".to_string(),
            config: serde_json::json!({"url": format!("{}/healthz", server.url())}),
            env: HashMap::new(),
            when: None,
            if_expr: None,
            unless: None,
            outputs: vec![],
            on_error: OnErrorPolicy::default(),
        }],
    };

    let exec_id = executor.start("api-1", &doc, HashMap::new(), HashMap::new(), CancellationToken::new()).await.expect("start workflow");
    let execution = repos.executions.find_by_id(exec_id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
}
