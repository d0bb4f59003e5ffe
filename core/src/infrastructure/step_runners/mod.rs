// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Built-in step runner implementations (spec.md §4.6.4).
//!
//! Every runner here wraps an external tool or API; the core itself has no
//! opinion on *how* `terraform apply` or a Kubernetes apply succeeds, only
//! that the runner reports success/failure and a map of named outputs.

mod ansible;
mod argocd_app;
mod gitea_repo;
mod http;
mod kubernetes;
mod notification;
mod policy;
mod terraform;
mod validation;

pub use ansible::AnsibleRunner;
pub use argocd_app::ArgoCdAppRunner;
pub use gitea_repo::GiteaRepoRunner;
pub use http::HttpRunner;
pub use kubernetes::KubernetesRunner;
pub use notification::NotificationRunner;
pub use policy::PolicyRunner;
pub use terraform::TerraformRunner;
pub use validation::ValidationRunner;

use crate::application::step_runner::StepRunnerRegistry;
use std::sync::Arc;

/// Registers every built-in step type (spec.md §4.6.4's required list).
/// Call once at startup; extension types are registered alongside these by
/// whoever assembles the registry.
pub fn register_builtin_runners(registry: &mut StepRunnerRegistry) {
    registry.register(Arc::new(TerraformRunner::default()));
    registry.register(Arc::new(KubernetesRunner::default()));
    registry.register(Arc::new(AnsibleRunner::default()));
    registry.register(Arc::new(GiteaRepoRunner::default()));
    registry.register(Arc::new(ArgoCdAppRunner::default()));
    registry.register(Arc::new(PolicyRunner::default()));
    registry.register(Arc::new(ValidationRunner::default()));
    registry.register(Arc::new(HttpRunner::default()));
    registry.register(Arc::new(NotificationRunner::default()));
}

/// Shared helper: stream a child process's combined output into the step
/// context and wait for it to exit.
pub(crate) async fn run_command_streaming(mut command: tokio::process::Command, ctx: &crate::application::step_runner::StepContext) -> std::io::Result<std::process::ExitStatus> {
    use tokio::io::{AsyncBufReadExt, BufReader};

    command.stdout(std::process::Stdio::piped());
    command.stderr(std::process::Stdio::piped());
    let mut child = command.spawn()?;

    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");
    let mut stdout_lines = BufReader::new(stdout).lines();
    let mut stderr_lines = BufReader::new(stderr).lines();

    let (mut stdout_done, mut stderr_done) = (false, false);
    while !(stdout_done && stderr_done) {
        tokio::select! {
            line = stdout_lines.next_line(), if !stdout_done => {
                match line? {
                    Some(l) => ctx.log(l),
                    None => stdout_done = true,
                }
            }
            line = stderr_lines.next_line(), if !stderr_done => {
                match line? {
                    Some(l) => ctx.log(l),
                    None => stderr_done = true,
                }
            }
            _ = ctx.cancellation.cancelled() => {
                let _ = child.start_kill();
                break;
            }
        }
    }

    child.wait().await
}

pub(crate) fn config_str(config: &serde_json::Value, key: &str) -> Option<String> {
    config.get(key).and_then(|v| v.as_str()).map(str::to_string)
}
