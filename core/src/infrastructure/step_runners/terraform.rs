// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! `terraform` step runner (spec.md §4.6.4).
//!
//! `config`: `{ working_dir, vars: {..} }`. Runs `terraform init` followed
//! by `terraform apply -auto-approve`, streaming both to the step log.
//! Outputs are collected from `terraform output -json` on success.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::process::Command;

use super::run_command_streaming;
use crate::application::step_runner::{StepContext, StepOutcome, StepRunner};

#[derive(Default)]
pub struct TerraformRunner;

#[async_trait]
impl StepRunner for TerraformRunner {
    fn step_type(&self) -> &'static str {
        "terraform"
    }

    async fn run(&self, ctx: StepContext) -> StepOutcome {
        let working_dir = match ctx.config.get("working_dir").and_then(|v| v.as_str()) {
            Some(d) => d.to_string(),
            None => return StepOutcome::failed("terraform step requires config.working_dir"),
        };

        let mut init = Command::new("terraform");
        init.arg("init").arg("-input=false").current_dir(&working_dir);
        match run_command_streaming(init, &ctx).await {
            Ok(status) if status.success() => {}
            Ok(status) => return StepOutcome::failed(format!("terraform init exited with {status}")),
            Err(e) => return StepOutcome::failed(format!("failed to run terraform init: {e}")),
        }

        let mut apply = Command::new("terraform");
        apply.arg("apply").arg("-auto-approve").arg("-input=false").current_dir(&working_dir);
        if let Some(vars) = ctx.config.get("vars").and_then(|v| v.as_object()) {
            for (key, value) in vars {
                let rendered = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                apply.arg("-var").arg(format!("{key}={rendered}"));
            }
        }
        match run_command_streaming(apply, &ctx).await {
            Ok(status) if status.success() => {}
            Ok(status) => return StepOutcome::failed(format!("terraform apply exited with {status}")),
            Err(e) => return StepOutcome::failed(format!("failed to run terraform apply: {e}")),
        }

        let mut outputs = HashMap::new();
        let output_cmd = Command::new("terraform").arg("output").arg("-json").current_dir(&working_dir).output().await;
        if let Ok(result) = output_cmd {
            if result.status.success() {
                if let Ok(parsed) = serde_json::from_slice::<serde_json::Value>(&result.stdout) {
                    if let Some(map) = parsed.as_object() {
                        for (key, entry) in map {
                            if let Some(value) = entry.get("value") {
                                outputs.insert(key.clone(), value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string()));
                            }
                        }
                    }
                }
            }
        }

        StepOutcome::ok(outputs)
    }
}
