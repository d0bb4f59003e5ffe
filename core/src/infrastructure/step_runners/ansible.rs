// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! `ansible` step runner (spec.md §4.6.4).
//!
//! `config`: `{ playbook, inventory?, extra_vars? }`. Runs
//! `ansible-playbook` with `--extra-vars` passed as a JSON string.

use async_trait::async_trait;
use tokio::process::Command;

use super::run_command_streaming;
use crate::application::step_runner::{StepContext, StepOutcome, StepRunner};

#[derive(Default)]
pub struct AnsibleRunner;

#[async_trait]
impl StepRunner for AnsibleRunner {
    fn step_type(&self) -> &'static str {
        "ansible"
    }

    async fn run(&self, ctx: StepContext) -> StepOutcome {
        let playbook = match super::config_str(&ctx.config, "playbook") {
            Some(p) => p,
            None => return StepOutcome::failed("ansible step requires config.playbook"),
        };

        let mut command = Command::new("ansible-playbook");
        command.arg(&playbook);
        if let Some(inventory) = super::config_str(&ctx.config, "inventory") {
            command.arg("-i").arg(inventory);
        }
        if let Some(extra_vars) = ctx.config.get("extra_vars") {
            command.arg("--extra-vars").arg(extra_vars.to_string());
        }

        match run_command_streaming(command, &ctx).await {
            Ok(status) if status.success() => StepOutcome::ok(Default::default()),
            Ok(status) => StepOutcome::failed(format!("ansible-playbook exited with {status}")),
            Err(e) => StepOutcome::failed(format!("failed to run ansible-playbook: {e}")),
        }
    }
}
