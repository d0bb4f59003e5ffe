// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! `kubernetes` step runner (spec.md §4.6.4).
//!
//! `config`: `{ manifest, namespace? }` where `manifest` is an inline YAML
//! document, piped to `kubectl apply -f -`.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::application::step_runner::{StepContext, StepOutcome, StepRunner};

#[derive(Default)]
pub struct KubernetesRunner;

#[async_trait]
impl StepRunner for KubernetesRunner {
    fn step_type(&self) -> &'static str {
        "kubernetes"
    }

    async fn run(&self, ctx: StepContext) -> StepOutcome {
        let manifest = match ctx.config.get("manifest").and_then(|v| v.as_str()) {
            Some(m) => m.to_string(),
            None => return StepOutcome::failed("kubernetes step requires config.manifest"),
        };

        let mut command = Command::new("kubectl");
        command.arg("apply").arg("-f").arg("-");
        if let Some(namespace) = super::config_str(&ctx.config, "namespace") {
            command.arg("-n").arg(namespace);
        }
        command.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(c) => c,
            Err(e) => return StepOutcome::failed(format!("failed to spawn kubectl: {e}")),
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(manifest.as_bytes()).await {
                return StepOutcome::failed(format!("failed to write manifest to kubectl stdin: {e}"));
            }
        }

        let output = match child.wait_with_output().await {
            Ok(o) => o,
            Err(e) => return StepOutcome::failed(format!("kubectl apply failed: {e}")),
        };

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            ctx.log(line.to_string());
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            ctx.log(line.to_string());
        }

        if output.status.success() {
            StepOutcome::ok(Default::default())
        } else {
            StepOutcome::failed(format!("kubectl apply exited with {}", output.status))
        }
    }
}
