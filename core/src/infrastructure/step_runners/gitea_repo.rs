// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! `gitea-repo` step runner (spec.md §4.6.4).
//!
//! `config`: `{ base_url, token, owner, name, private? }`. Creates (or
//! confirms the existence of) a repository via the Gitea REST API.

use async_trait::async_trait;
use serde::Deserialize;

use crate::application::step_runner::{StepContext, StepOutcome, StepRunner};

#[derive(Deserialize)]
struct GiteaRepoResponse {
    html_url: String,
    clone_url: String,
}

#[derive(Default)]
pub struct GiteaRepoRunner;

#[async_trait]
impl StepRunner for GiteaRepoRunner {
    fn step_type(&self) -> &'static str {
        "gitea-repo"
    }

    async fn run(&self, ctx: StepContext) -> StepOutcome {
        let base_url = super::config_str(&ctx.config, "base_url").unwrap_or_default();
        let token = super::config_str(&ctx.config, "token").unwrap_or_default();
        let owner = super::config_str(&ctx.config, "owner");
        let name = match super::config_str(&ctx.config, "name") {
            Some(n) => n,
            None => return StepOutcome::failed("gitea-repo step requires config.name"),
        };
        let private = ctx.config.get("private").and_then(|v| v.as_bool()).unwrap_or(true);

        let url = match &owner {
            Some(owner) => format!("{base_url}/api/v1/orgs/{owner}/repos"),
            None => format!("{base_url}/api/v1/user/repos"),
        };

        let client = reqwest::Client::new();
        let response = client
            .post(&url)
            .header("Authorization", format!("token {token}"))
            .json(&serde_json::json!({"name": name, "private": private, "auto_init": true}))
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => return StepOutcome::failed(format!("gitea repo create request failed: {e}")),
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return StepOutcome::failed(format!("gitea repo create failed with {status}: {body}"));
        }

        match response.json::<GiteaRepoResponse>().await {
            Ok(repo) => {
                ctx.log(format!("created repository {}", repo.html_url));
                let mut outputs = std::collections::HashMap::new();
                outputs.insert("html_url".to_string(), repo.html_url);
                outputs.insert("clone_url".to_string(), repo.clone_url);
                StepOutcome::ok(outputs)
            }
            Err(e) => StepOutcome::failed(format!("failed to parse gitea response: {e}")),
        }
    }
}
