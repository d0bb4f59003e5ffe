// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Orchestration Engine
//!
//! A single background worker per process that drives pending resources
//! through provisioning (spec.md §4.7). Claims are batched; each claimed
//! resource's workflow execution is spawned off the critical path so the
//! poll loop is never blocked on a slow provisioner.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::application::executor::WorkflowExecutor;
use crate::application::graph_service::GraphService;
use crate::application::resolver::Resolver;
use crate::domain::execution::WorkflowExecutionId;
use crate::domain::provider::ProviderWorkflowRef;
use crate::domain::repository::{ResourceRepository, RepositoryError};
use crate::domain::resource::{Resource, ResourceState};
use crate::domain::workflow::WorkflowDocument;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_BATCH_SIZE: i64 = 100;

/// Loads a workflow document by provider + file reference. Implemented by
/// `infrastructure::workflow_parser` against the provider's source root.
#[async_trait::async_trait]
pub trait WorkflowLoader: Send + Sync {
    async fn load(&self, provider_source_root: &str, workflow_ref: &ProviderWorkflowRef) -> Result<WorkflowDocument, crate::error::CoreError>;
}

pub struct EngineConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { poll_interval: DEFAULT_POLL_INTERVAL, batch_size: DEFAULT_BATCH_SIZE }
    }
}

/// The background poller (spec.md §4.7). Construct one per process and
/// call [`OrchestrationEngine::run`] in a long-lived task.
pub struct OrchestrationEngine {
    resources: Arc<dyn ResourceRepository>,
    resolver: Resolver,
    executor: Arc<WorkflowExecutor>,
    workflow_loader: Arc<dyn WorkflowLoader>,
    graph: Arc<GraphService>,
    config: EngineConfig,
    wake: Arc<Notify>,
}

impl OrchestrationEngine {
    pub fn new(
        resources: Arc<dyn ResourceRepository>,
        resolver: Resolver,
        executor: Arc<WorkflowExecutor>,
        workflow_loader: Arc<dyn WorkflowLoader>,
        graph: Arc<GraphService>,
        config: EngineConfig,
        wake: Arc<Notify>,
    ) -> Self {
        Self { resources, resolver, executor, workflow_loader, graph, config, wake }
    }

    /// The main loop (spec.md §4.7, steps 1-6). Runs until `shutdown` is
    /// cancelled. Transient errors are logged; the loop never exits on
    /// them (spec.md §7 "the engine never exits on transient errors").
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(poll_interval = ?self.config.poll_interval, batch_size = self.config.batch_size, "orchestration engine starting");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("orchestration engine shutting down");
                    return;
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = self.wake.notified() => {}
            }

            if let Err(e) = self.tick(shutdown.clone()).await {
                error!(error = %e, "orchestration engine tick failed, continuing");
            }
        }
    }

    /// One poll cycle: claim, transition, and kick off execution for a
    /// batch of pending resources.
    pub async fn tick(&self, shutdown: CancellationToken) -> Result<usize, RepositoryError> {
        let claimed = self.resources.claim_pending(self.config.batch_size).await?;
        for resource in claimed {
            self.provision_one(resource, shutdown.clone()).await;
        }
        Ok(0)
    }

    async fn provision_one(&self, resource: Resource, shutdown: CancellationToken) {
        let resolved = self.resolver.resolve(&resource.resource_type, resource.workflow_override.as_deref(), &resource.workflow_tags);

        let (provider, workflow_ref) = match resolved {
            Ok(pair) => pair,
            Err(e) => {
                warn!(resource = %resource.id, error = %e, "resolution failed, marking resource failed");
                if let Err(transition_err) = self.resources.transition_state(resource.id, ResourceState::Failed, Some(e.to_string()), "orchestration-engine", None, None, Some(e.to_string())).await {
                    error!(resource = %resource.id, error = %transition_err, "failed to record resolution failure");
                }
                return;
            }
        };

        let document = match self.workflow_loader.load(provider.source_root.as_deref().unwrap_or_default(), &workflow_ref).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!(resource = %resource.id, error = %e, "workflow load failed, marking resource failed");
                let _ = self.resources.transition_state(resource.id, ResourceState::Failed, Some(e.to_string()), "orchestration-engine", None, None, Some(e.message.clone())).await;
                return;
            }
        };

        let mut resource_context = std::collections::HashMap::new();
        resource_context.insert("resource_name".to_string(), resource.resource_name.clone());
        resource_context.insert("resource_type".to_string(), resource.resource_type.clone());
        resource_context.insert("app_name".to_string(), resource.app_name.clone());
        flatten_json_into(&resource.properties, "", &mut resource_context);

        let input = match resource.properties.as_object() {
            Some(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            None => std::collections::HashMap::new(),
        };

        let execution_id = WorkflowExecutionId(0);
        let (transitioned, _) = match self
            .resources
            .transition_state(resource.id, ResourceState::Provisioning, None, "orchestration-engine", Some(&provider.metadata.name), Some(execution_id), None)
            .await
        {
            Ok(pair) => pair,
            Err(e) => {
                error!(resource = %resource.id, error = %e, "failed to transition resource to provisioning");
                return;
            }
        };

        self.graph.record_claim(&transitioned, &provider.metadata.name).await;

        let executor = self.executor.clone();
        let resources = self.resources.clone();
        let graph = self.graph.clone();
        let app_name = transitioned.app_name.clone();
        let resource_id = transitioned.id;

        tokio::spawn(async move {
            let result = executor.start(&app_name, &document, resource_context, input, shutdown).await;
            match result {
                Ok(exec_id) => {
                    graph.record_workflow_node(exec_id).await;
                    match resources.transition_state(resource_id, ResourceState::Active, None, "orchestration-engine", None, Some(exec_id), None).await {
                        Ok(_) => info!(resource = %resource_id, execution = %exec_id, "resource provisioned"),
                        Err(e) => error!(resource = %resource_id, error = %e, "failed to transition resource to active"),
                    }
                }
                Err(e) => {
                    warn!(resource = %resource_id, error = %e, "workflow execution failed");
                    let _ = resources.transition_state(resource_id, ResourceState::Failed, Some(e.to_string()), "orchestration-engine", None, None, Some(e.to_string())).await;
                }
            }
        });
    }
}

fn flatten_json_into(value: &serde_json::Value, prefix: &str, out: &mut std::collections::HashMap<String, String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() { k.clone() } else { format!("{prefix}.{k}") };
                flatten_json_into(v, &key, out);
            }
        }
        serde_json::Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        serde_json::Value::Null => {}
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_nested_properties_with_dotted_keys() {
        let mut out = std::collections::HashMap::new();
        flatten_json_into(&serde_json::json!({"version": "15", "storage": {"size_gb": 100}}), "", &mut out);
        assert_eq!(out.get("version").unwrap(), "15");
        assert_eq!(out.get("storage.size_gb").unwrap(), "100");
    }
}
