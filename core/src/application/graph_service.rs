// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Dependency Graph Service
//!
//! Maintains the graph projection as a side effect of orchestration events
//! (spec.md §4.8) and answers graph/critical-path/metrics/history queries.
//! Never rejects a state transition because of a graph write failure — log
//! and repair (spec.md §9 "Graph is a projection").

use std::sync::Arc;
use tracing::{error, info};

use crate::domain::execution::{ExecutionStatus, WorkflowExecution, WorkflowExecutionId};
use crate::domain::graph::{CriticalPathResult, EdgeKind, GraphAnnotation, GraphError, GraphView, NodeKey};
use crate::domain::repository::{GraphRepository, RepositoryError, ResourceDependencyRepository, ResourceRepository, WorkflowExecutionRepository};
use crate::domain::resource::Resource;

pub struct MetricsSummary {
    pub total: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub avg_duration_ms: f64,
    pub median_duration_ms: f64,
    pub min_duration_ms: i64,
    pub max_duration_ms: i64,
}

pub struct GraphService {
    graph: Arc<dyn GraphRepository>,
    executions: Arc<dyn WorkflowExecutionRepository>,
    resources: Arc<dyn ResourceRepository>,
    dependencies: Arc<dyn ResourceDependencyRepository>,
}

impl GraphService {
    pub fn new(
        graph: Arc<dyn GraphRepository>,
        executions: Arc<dyn WorkflowExecutionRepository>,
        resources: Arc<dyn ResourceRepository>,
        dependencies: Arc<dyn ResourceDependencyRepository>,
    ) -> Self {
        Self { graph, executions, resources, dependencies }
    }

    /// Recomputes the graph projection for `app_name` from the resources and
    /// dependency tables, which remain the source of truth (spec.md §9 "Graph
    /// is a projection"). Used to repair drift after a write failure left the
    /// projection stale, or after a direct database edit.
    pub async fn rebuild_for_app(&self, app_name: &str) -> Result<GraphView, RepositoryError> {
        let resources = self.resources.list_by_app(app_name).await?;
        let resource_names: Vec<String> = resources.iter().map(|r| r.resource_name.clone()).collect();
        self.record_spec(app_name, &resource_names).await;

        for resource in &resources {
            if let Some(provider_name) = &resource.provider {
                self.record_claim(resource, provider_name).await;
            }
            if let Some(execution_id) = resource.workflow_execution_id {
                self.record_workflow_node(execution_id).await;
                let resource_key = NodeKey::resource(app_name, &resource.resource_name);
                let workflow_key = NodeKey::workflow(execution_id.0);
                if let Err(e) = self.graph.upsert_edge(resource_key, workflow_key, EdgeKind::Executes, serde_json::Value::Null).await {
                    error!(resource = %resource.id, error = %e, "failed to upsert executes edge during rebuild");
                }
                if let Ok(Some(execution)) = self.executions.find_by_id(execution_id).await {
                    self.record_execution_timing(&execution).await;
                }
            }

            let deps = self.dependencies.list_for_resource(resource.id).await.unwrap_or_default();
            for dep in deps {
                if let Some(depends_on) = resources.iter().find(|r| r.id == dep.depends_on_id) {
                    let from = NodeKey::resource(app_name, &resource.resource_name);
                    let to = NodeKey::resource(app_name, &depends_on.resource_name);
                    if let Err(e) = self.graph.upsert_edge(from, to, EdgeKind::Requires, serde_json::Value::Null).await {
                        error!(resource = %resource.id, error = %e, "failed to upsert dependency edge during rebuild");
                    }
                }
            }
        }

        info!(app = %app_name, resources = resources.len(), "graph projection rebuilt");
        self.graph_for_app(app_name).await
    }

    /// Spec submission: upsert the spec node and one `contains` edge per
    /// declared resource (spec.md §4.8).
    pub async fn record_spec(&self, app_name: &str, resource_names: &[String]) {
        let spec_key = NodeKey::spec(app_name);
        if let Err(e) = self.graph.upsert_node(spec_key.clone(), serde_json::Value::Null).await {
            error!(app = %app_name, error = %e, "failed to upsert spec node, graph may be stale");
            return;
        }
        for resource_name in resource_names {
            let resource_key = NodeKey::resource(app_name, resource_name);
            if let Err(e) = self.graph.upsert_node(resource_key.clone(), serde_json::Value::Null).await {
                error!(app = %app_name, resource = %resource_name, error = %e, "failed to upsert resource node");
                continue;
            }
            if let Err(e) = self.graph.upsert_edge(spec_key.clone(), resource_key, EdgeKind::Contains, serde_json::Value::Null).await {
                error!(app = %app_name, resource = %resource_name, error = %e, "failed to upsert contains edge");
            }
        }
    }

    /// Resource claim: provider + workflow nodes and the `requires`/`executes`
    /// edges (spec.md §4.8, P8).
    pub async fn record_claim(&self, resource: &Resource, provider_name: &str) {
        let resource_key = NodeKey::resource(&resource.app_name, &resource.resource_name);
        let provider_key = NodeKey::provider(provider_name);
        if let Err(e) = self.graph.upsert_node(provider_key.clone(), serde_json::Value::Null).await {
            error!(resource = %resource.id, error = %e, "failed to upsert provider node");
            return;
        }
        if let Err(e) = self.graph.upsert_edge(resource_key, provider_key, EdgeKind::Requires, serde_json::Value::Null).await {
            error!(resource = %resource.id, error = %e, "failed to upsert requires edge");
        }
    }

    pub async fn record_workflow_node(&self, execution_id: WorkflowExecutionId) {
        let workflow_key = NodeKey::workflow(execution_id.0);
        if let Err(e) = self.graph.upsert_node(workflow_key, serde_json::Value::Null).await {
            error!(execution = %execution_id, error = %e, "failed to upsert workflow node");
        }
    }

    /// Workflow timing update on step/workflow completion (spec.md §4.8).
    pub async fn record_execution_timing(&self, execution: &WorkflowExecution) {
        let key = NodeKey::workflow(execution.id.0);
        let duration_ms = execution.completed_at.map(|c| (c - execution.started_at).num_milliseconds());
        if let Err(e) = self.graph.update_execution_timing(&key, Some(execution.started_at), execution.completed_at, duration_ms).await {
            error!(execution = %execution.id, error = %e, "failed to update workflow node timing");
        }
    }

    pub async fn graph_for_app(&self, app_name: &str) -> Result<GraphView, RepositoryError> {
        let (nodes, edges) = self.graph.graph_for_app(app_name).await?;
        Ok(GraphView { nodes, edges })
    }

    pub async fn critical_path(&self, app_name: &str) -> Result<CriticalPathResult, GraphError> {
        let view = self.graph_for_app(app_name).await.map_err(|e| GraphError::EmptyGraph(e.to_string()))?;
        view.critical_path(&NodeKey::spec(app_name).node_id)
    }

    pub async fn metrics(&self, app_name: &str, limit: i64) -> Result<MetricsSummary, RepositoryError> {
        let executions = self.executions.list_by_app(app_name, limit).await?;
        let durations: Vec<i64> = executions
            .iter()
            .filter_map(|e| e.completed_at.map(|c| (c - e.started_at).num_milliseconds()))
            .collect();

        let total = executions.len() as i64;
        let success_count = executions.iter().filter(|e| e.status == ExecutionStatus::Completed).count() as i64;
        let failure_count = executions.iter().filter(|e| e.status == ExecutionStatus::Failed).count() as i64;

        let mut sorted = durations.clone();
        sorted.sort_unstable();
        let median_duration_ms = if sorted.is_empty() { 0.0 } else { sorted[sorted.len() / 2] as f64 };
        let avg_duration_ms = if durations.is_empty() { 0.0 } else { durations.iter().sum::<i64>() as f64 / durations.len() as f64 };

        Ok(MetricsSummary {
            total,
            success_count,
            failure_count,
            avg_duration_ms,
            median_duration_ms,
            min_duration_ms: sorted.first().copied().unwrap_or(0),
            max_duration_ms: sorted.last().copied().unwrap_or(0),
        })
    }

    pub async fn history(&self, app_name: &str, limit: i64) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        self.executions.list_by_app(app_name, limit).await
    }

    pub async fn add_annotation(&self, app_name: &str, node_id: &str, author: &str, text: &str) -> Result<GraphAnnotation, RepositoryError> {
        self.graph.add_annotation(app_name, node_id, author, text).await
    }

    pub async fn list_annotations(&self, app_name: &str, node_id: &str) -> Result<Vec<GraphAnnotation>, RepositoryError> {
        self.graph.list_annotations(app_name, node_id).await
    }

    pub async fn delete_annotation(&self, annotation: &GraphAnnotation, requester: &str, requester_is_admin: bool) -> Result<(), RepositoryError> {
        if !annotation.can_delete(requester, requester_is_admin) {
            return Err(RepositoryError::Conflict("only the author or an admin may delete this annotation".to_string()));
        }
        self.graph.delete_annotation(annotation.id).await
    }
}
