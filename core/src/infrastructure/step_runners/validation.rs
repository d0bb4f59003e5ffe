// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! `validation` step runner (spec.md §4.6.4).
//!
//! `config`: `{ input, rules: [{ field, required?, pattern? }] }`. `field`
//! is a dotted path into `input`; a rule fails the step (rather than
//! erroring) so its failure can be handled via the step's `on_error`
//! policy like any other step failure.

use async_trait::async_trait;
use serde::Deserialize;

use crate::application::step_runner::{StepContext, StepOutcome, StepRunner};

#[derive(Deserialize)]
struct Rule {
    field: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    pattern: Option<String>,
}

fn resolve(input: &serde_json::Value, field: &str) -> Option<serde_json::Value> {
    let mut current = input;
    for part in field.split('.') {
        current = current.get(part)?;
    }
    Some(current.clone())
}

#[derive(Default)]
pub struct ValidationRunner;

#[async_trait]
impl StepRunner for ValidationRunner {
    fn step_type(&self) -> &'static str {
        "validation"
    }

    async fn run(&self, ctx: StepContext) -> StepOutcome {
        let input = ctx.config.get("input").cloned().unwrap_or(serde_json::Value::Null);
        let rules: Vec<Rule> = match ctx.config.get("rules") {
            Some(v) => match serde_json::from_value(v.clone()) {
                Ok(r) => r,
                Err(e) => return StepOutcome::failed(format!("malformed validation rules: {e}")),
            },
            None => Vec::new(),
        };

        for rule in &rules {
            let value = resolve(&input, &rule.field);
            if rule.required && value.is_none() {
                return StepOutcome::failed(format!("required field '{}' is missing", rule.field));
            }
            if let (Some(pattern), Some(serde_json::Value::String(s))) = (&rule.pattern, &value) {
                let regex = match regex::Regex::new(pattern) {
                    Ok(r) => r,
                    Err(e) => return StepOutcome::failed(format!("invalid pattern for field '{}': {e}", rule.field)),
                };
                if !regex.is_match(s) {
                    return StepOutcome::failed(format!("field '{}' value '{s}' does not match pattern '{pattern}'", rule.field));
                }
            }
        }

        ctx.log(format!("{} validation rule(s) passed", rules.len()));
        StepOutcome::ok(Default::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn ctx(config: serde_json::Value) -> StepContext {
        let (tx, _rx) = mpsc::unbounded_channel();
        StepContext { step_name: "validate".into(), config, env: HashMap::new(), variables: HashMap::new(), cancellation: CancellationToken::new(), log_tx: tx }
    }

    #[tokio::test]
    async fn missing_required_field_fails() {
        let config = serde_json::json!({"input": {"name": "db"}, "rules": [{"field": "region", "required": true}]});
        let outcome = ValidationRunner.run(ctx(config)).await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn pattern_mismatch_fails() {
        let config = serde_json::json!({"input": {"name": "Db!"}, "rules": [{"field": "name", "pattern": "^[a-z]+$"}]});
        let outcome = ValidationRunner.run(ctx(config)).await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn satisfied_rules_succeed() {
        let config = serde_json::json!({"input": {"name": "db"}, "rules": [{"field": "name", "required": true, "pattern": "^[a-z]+$"}]});
        let outcome = ValidationRunner.run(ctx(config)).await;
        assert!(outcome.success);
    }
}
