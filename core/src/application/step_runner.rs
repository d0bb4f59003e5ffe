// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Step Runner Contract
//!
//! Every step type is served by a runner implementing [`StepRunner`]
//! (spec.md §4.6.4). The core ships minimal but real runners for the
//! required built-in types; additional types register here as extensions.
//! Unknown types are rejected at workflow parse time, not dispatch time
//! (see [`crate::domain::workflow::WorkflowDocument::validate`]).

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::interpolation::InterpolationContext;

/// A read-only snapshot of the executor's variable context, handed to a
/// runner alongside its resolved, post-interpolation config.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub step_name: String,
    pub config: serde_json::Value,
    pub env: HashMap<String, String>,
    pub variables: InterpolationContext,
    pub cancellation: CancellationToken,
    pub log_tx: mpsc::UnboundedSender<String>,
}

impl StepContext {
    pub fn log(&self, line: impl Into<String>) {
        let _ = self.log_tx.send(line.into());
    }
}

#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub success: bool,
    pub outputs: HashMap<String, String>,
    pub error_message: Option<String>,
}

impl StepOutcome {
    pub fn ok(outputs: HashMap<String, String>) -> Self {
        Self { success: true, outputs, error_message: None }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, outputs: HashMap::new(), error_message: Some(message.into()) }
    }
}

/// Uniform contract every step type implements (spec.md §4.6.4). The core
/// makes no assumption about side effects beyond idempotency being
/// recommended, not required.
#[async_trait]
pub trait StepRunner: Send + Sync {
    fn step_type(&self) -> &'static str;
    async fn run(&self, ctx: StepContext) -> StepOutcome;
}

/// Registry of runner implementations keyed by step type, looked up by the
/// executor at dispatch time.
#[derive(Clone, Default)]
pub struct StepRunnerRegistry {
    runners: HashMap<String, Arc<dyn StepRunner>>,
}

impl StepRunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, runner: Arc<dyn StepRunner>) {
        self.runners.insert(runner.step_type().to_string(), runner);
    }

    pub fn get(&self, step_type: &str) -> Option<Arc<dyn StepRunner>> {
        self.runners.get(step_type).cloned()
    }

    pub fn registered_types(&self) -> std::collections::HashSet<String> {
        self.runners.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoRunner;

    #[async_trait]
    impl StepRunner for EchoRunner {
        fn step_type(&self) -> &'static str {
            "echo"
        }

        async fn run(&self, ctx: StepContext) -> StepOutcome {
            ctx.log("echoing");
            let mut outputs = HashMap::new();
            outputs.insert("value".to_string(), "ok".to_string());
            StepOutcome::ok(outputs)
        }
    }

    #[tokio::test]
    async fn registry_dispatches_to_registered_runner() {
        let mut registry = StepRunnerRegistry::new();
        registry.register(Arc::new(EchoRunner));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());

        let (tx, _rx) = mpsc::unbounded_channel();
        let ctx = StepContext {
            step_name: "s1".into(),
            config: serde_json::Value::Null,
            env: HashMap::new(),
            variables: HashMap::new(),
            cancellation: CancellationToken::new(),
            log_tx: tx,
        };
        let outcome = registry.get("echo").unwrap().run(ctx).await;
        assert!(outcome.success);
        assert_eq!(outcome.outputs.get("value").unwrap(), "ok");
    }
}
