// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! `argocd-app` step runner (spec.md §4.6.4).
//!
//! `config`: `{ server, token, name, project, repo_url, path, dest_namespace, sync? }`.
//! Creates (or upserts) an ArgoCD Application via its REST API, optionally
//! triggering an immediate sync.

use async_trait::async_trait;

use crate::application::step_runner::{StepContext, StepOutcome, StepRunner};

#[derive(Default)]
pub struct ArgoCdAppRunner;

#[async_trait]
impl StepRunner for ArgoCdAppRunner {
    fn step_type(&self) -> &'static str {
        "argocd-app"
    }

    async fn run(&self, ctx: StepContext) -> StepOutcome {
        let server = super::config_str(&ctx.config, "server").unwrap_or_default();
        let token = super::config_str(&ctx.config, "token").unwrap_or_default();
        let name = match super::config_str(&ctx.config, "name") {
            Some(n) => n,
            None => return StepOutcome::failed("argocd-app step requires config.name"),
        };
        let project = super::config_str(&ctx.config, "project").unwrap_or_else(|| "default".to_string());
        let repo_url = super::config_str(&ctx.config, "repo_url").unwrap_or_default();
        let path = super::config_str(&ctx.config, "path").unwrap_or_else(|| ".".to_string());
        let dest_namespace = super::config_str(&ctx.config, "dest_namespace").unwrap_or_else(|| "default".to_string());

        let body = serde_json::json!({
            "metadata": {"name": name},
            "spec": {
                "project": project,
                "source": {"repoURL": repo_url, "path": path, "targetRevision": "HEAD"},
                "destination": {"server": "https://kubernetes.default.svc", "namespace": dest_namespace},
                "syncPolicy": {"automated": {"prune": true, "selfHeal": true}},
            }
        });

        let client = reqwest::Client::new();
        let url = format!("{server}/api/v1/applications");
        let response = client.post(&url).bearer_auth(&token).json(&body).send().await;
        let response = match response {
            Ok(r) => r,
            Err(e) => return StepOutcome::failed(format!("argocd application create request failed: {e}")),
        };
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return StepOutcome::failed(format!("argocd application create failed with {status}: {body}"));
        }
        ctx.log(format!("argocd application '{name}' registered"));

        if ctx.config.get("sync").and_then(|v| v.as_bool()).unwrap_or(true) {
            let sync_url = format!("{server}/api/v1/applications/{name}/sync");
            match client.post(&sync_url).bearer_auth(&token).json(&serde_json::json!({})).send().await {
                Ok(r) if r.status().is_success() => ctx.log(format!("argocd application '{name}' sync triggered")),
                Ok(r) => return StepOutcome::failed(format!("argocd sync failed with {}", r.status())),
                Err(e) => return StepOutcome::failed(format!("argocd sync request failed: {e}")),
            }
        }

        let mut outputs = std::collections::HashMap::new();
        outputs.insert("application".to_string(), name);
        StepOutcome::ok(outputs)
    }
}
