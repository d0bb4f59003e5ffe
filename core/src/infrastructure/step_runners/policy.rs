// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! `policy` step runner (spec.md §4.6.4).
//!
//! `config`: `{ opa_url, input }`. Posts `input` to an Open Policy Agent
//! query endpoint (`POST {opa_url}`, expected to resolve a rule returning
//! `{"result": bool}`) and fails the step when the policy denies.

use async_trait::async_trait;

use crate::application::step_runner::{StepContext, StepOutcome, StepRunner};

#[derive(Default)]
pub struct PolicyRunner;

#[async_trait]
impl StepRunner for PolicyRunner {
    fn step_type(&self) -> &'static str {
        "policy"
    }

    async fn run(&self, ctx: StepContext) -> StepOutcome {
        let opa_url = match super::config_str(&ctx.config, "opa_url") {
            Some(u) => u,
            None => return StepOutcome::failed("policy step requires config.opa_url"),
        };
        let input = ctx.config.get("input").cloned().unwrap_or(serde_json::Value::Null);

        let client = reqwest::Client::new();
        let response = client.post(&opa_url).json(&serde_json::json!({"input": input})).send().await;
        let response = match response {
            Ok(r) => r,
            Err(e) => return StepOutcome::failed(format!("policy evaluation request failed: {e}")),
        };
        if !response.status().is_success() {
            return StepOutcome::failed(format!("policy endpoint returned {}", response.status()));
        }

        let body: serde_json::Value = match response.json().await {
            Ok(b) => b,
            Err(e) => return StepOutcome::failed(format!("failed to parse policy response: {e}")),
        };

        match body.get("result") {
            Some(serde_json::Value::Bool(true)) => {
                ctx.log("policy allowed");
                StepOutcome::ok(Default::default())
            }
            Some(serde_json::Value::Bool(false)) => StepOutcome::failed("policy denied"),
            _ => StepOutcome::failed("policy response missing boolean 'result' field"),
        }
    }
}
