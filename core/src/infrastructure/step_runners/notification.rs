// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! `notification` step runner (spec.md §4.6.4).
//!
//! `config`: `{ webhook_url, message }`. Posts a Slack-compatible
//! `{"text": message}` payload; never blocks the workflow on a downstream
//! notification outage for longer than the request timeout.

use async_trait::async_trait;
use std::time::Duration;

use crate::application::step_runner::{StepContext, StepOutcome, StepRunner};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Default)]
pub struct NotificationRunner;

#[async_trait]
impl StepRunner for NotificationRunner {
    fn step_type(&self) -> &'static str {
        "notification"
    }

    async fn run(&self, ctx: StepContext) -> StepOutcome {
        let webhook_url = match super::config_str(&ctx.config, "webhook_url") {
            Some(u) => u,
            None => return StepOutcome::failed("notification step requires config.webhook_url"),
        };
        let message = super::config_str(&ctx.config, "message").unwrap_or_else(|| "(no message)".to_string());

        let client = match reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build() {
            Ok(c) => c,
            Err(e) => return StepOutcome::failed(format!("failed to build http client: {e}")),
        };

        match client.post(&webhook_url).json(&serde_json::json!({"text": message})).send().await {
            Ok(r) if r.status().is_success() => {
                ctx.log("notification sent");
                StepOutcome::ok(Default::default())
            }
            Ok(r) => StepOutcome::failed(format!("notification webhook returned {}", r.status())),
            Err(e) => StepOutcome::failed(format!("notification request failed: {e}")),
        }
    }
}
