// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! `http` step runner (spec.md §4.6.4).
//!
//! `config`: `{ method?, url, headers?, body? }`. A response status below
//! 400 is success; the response body (if any) is published as the `body`
//! output.

use async_trait::async_trait;
use std::str::FromStr;

use crate::application::step_runner::{StepContext, StepOutcome, StepRunner};

#[derive(Default)]
pub struct HttpRunner;

#[async_trait]
impl StepRunner for HttpRunner {
    fn step_type(&self) -> &'static str {
        "http"
    }

    async fn run(&self, ctx: StepContext) -> StepOutcome {
        let url = match super::config_str(&ctx.config, "url") {
            Some(u) => u,
            None => return StepOutcome::failed("http step requires config.url"),
        };
        let method = super::config_str(&ctx.config, "method").unwrap_or_else(|| "GET".to_string());
        let method = match reqwest::Method::from_str(&method.to_uppercase()) {
            Ok(m) => m,
            Err(_) => return StepOutcome::failed(format!("unsupported HTTP method '{method}'")),
        };

        let client = reqwest::Client::new();
        let mut request = client.request(method, &url);
        if let Some(headers) = ctx.config.get("headers").and_then(|v| v.as_object()) {
            for (key, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(key.as_str(), value);
                }
            }
        }
        if let Some(body) = ctx.config.get("body") {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => return StepOutcome::failed(format!("http request failed: {e}")),
        };
        let status = response.status();
        let body_text = response.text().await.unwrap_or_default();
        ctx.log(format!("{url} -> {status}"));

        if status.as_u16() >= 400 {
            return StepOutcome::failed(format!("http request to {url} returned {status}: {body_text}"));
        }

        let mut outputs = std::collections::HashMap::new();
        outputs.insert("status".to_string(), status.as_u16().to_string());
        outputs.insert("body".to_string(), body_text);
        StepOutcome::ok(outputs)
    }
}
