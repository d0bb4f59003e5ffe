// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Conditional Execution
//!
//! Evaluates a step's `when`, `if`, and `unless` fields in that order
//! (spec.md §4.6.3). `when` is a small keyword vocabulary; `if`/`unless`
//! share a restricted expression grammar. Deliberately not a scripting
//! language (spec.md §9 "Variable interpolation, not a DSL") — composing
//! logic means adding more steps, not extending this grammar.

use regex::Regex;

use crate::application::interpolation::{interpolate, InterpolationContext};
use crate::domain::execution::{StepExecution, StepStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Run,
    Skip(String),
}

/// `when: always|on_success|success|on_failure|failure|manual`
/// (spec.md §4.6.3). `always` is the default when `when` is absent.
pub fn evaluate_when(when: Option<&str>, prior_steps: &[StepExecution]) -> Decision {
    let executed: Vec<&StepExecution> = prior_steps.iter().filter(|s| s.status != StepStatus::Skipped).collect();
    match when.unwrap_or("always") {
        "always" => Decision::Run,
        "manual" => Decision::Skip("when: manual is always skipped in this core".to_string()),
        "on_success" | "success" => {
            if !executed.is_empty() && executed.iter().all(|s| s.status == StepStatus::Completed) {
                Decision::Run
            } else {
                Decision::Skip("when: on_success requires all prior non-skipped steps to be completed".to_string())
            }
        }
        "on_failure" | "failure" => {
            if executed.iter().any(|s| s.status == StepStatus::Failed) {
                Decision::Run
            } else {
                Decision::Skip("when: on_failure requires at least one prior step to have failed".to_string())
            }
        }
        other => Decision::Skip(format!("unrecognized when keyword '{other}', skipping defensively")),
    }
}

/// Evaluate an `if`/`unless` expression. `negate = true` implements
/// `unless` by inverting the truth value.
pub fn evaluate_expr(expr: &str, context: &InterpolationContext, prior_steps: &[StepExecution], negate: bool) -> Result<bool, String> {
    let value = eval_raw(expr.trim(), context, prior_steps)?;
    Ok(if negate { !value } else { value })
}

fn eval_raw(expr: &str, context: &InterpolationContext, prior_steps: &[StepExecution]) -> Result<bool, String> {
    if expr == "true" {
        return Ok(true);
    }
    if expr == "false" {
        return Ok(false);
    }

    if let Some((step_name, suffix)) = expr.rsplit_once('.') {
        if matches!(suffix, "success" | "succeeded" | "failed" | "failure" | "skipped") {
            if let Some(step) = prior_steps.iter().find(|s| s.step_name == step_name) {
                return Ok(match suffix {
                    "success" | "succeeded" => step.status == StepStatus::Completed,
                    "failed" | "failure" => step.status == StepStatus::Failed,
                    "skipped" => step.status == StepStatus::Skipped,
                    _ => unreachable!(),
                });
            }
            return Ok(false);
        }
    }

    for op in ["==", "!=", "<=", ">=", "<", ">"] {
        if let Some((lhs, rhs)) = split_operator(expr, op) {
            return Ok(compare(&resolve_operand(lhs, context), &resolve_operand(rhs, context), op));
        }
    }

    if let Some((lhs, needle)) = expr.split_once(" contains ") {
        return Ok(resolve_operand(lhs.trim(), context).contains(&resolve_operand(needle.trim(), context)));
    }
    if let Some((lhs, needle)) = expr.split_once(" startsWith ") {
        return Ok(resolve_operand(lhs.trim(), context).starts_with(&resolve_operand(needle.trim(), context)));
    }
    if let Some((lhs, needle)) = expr.split_once(" endsWith ") {
        return Ok(resolve_operand(lhs.trim(), context).ends_with(&resolve_operand(needle.trim(), context)));
    }
    if let Some((lhs, pattern)) = expr.split_once(" matches ") {
        let value = resolve_operand(lhs.trim(), context);
        let re = Regex::new(pattern.trim().trim_matches('"')).map_err(|e| format!("invalid regex in 'matches': {e}"))?;
        return Ok(re.is_match(&value));
    }

    // Bare `$VAR` existence check: truthy iff defined and non-empty.
    if let Some(var) = expr.strip_prefix('$') {
        return Ok(context.get(var).map(|v| !v.is_empty()).unwrap_or(false));
    }

    Err(format!("unrecognized condition expression: '{expr}'"))
}

fn split_operator<'a>(expr: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    // Longer operators (`==`, `<=`, `>=`, `!=`) must be tried before the
    // single-character ones or `<=` would split as `<` with a stray `=`.
    let idx = expr.find(op)?;
    // Guard against matching `<` inside `<=` etc. by checking neighbours.
    if (op == "<" || op == ">") && expr.as_bytes().get(idx + 1) == Some(&b'=') {
        return None;
    }
    Some((expr[..idx].trim(), expr[idx + op.len()..].trim()))
}

fn resolve_operand(operand: &str, context: &InterpolationContext) -> String {
    let operand = operand.trim().trim_matches('"');
    if operand.starts_with('$') || operand.contains("${") || operand.contains("{{") {
        interpolate(operand, context)
    } else {
        operand.to_string()
    }
}

fn compare(lhs: &str, rhs: &str, op: &str) -> bool {
    if let (Ok(l), Ok(r)) = (lhs.parse::<f64>(), rhs.parse::<f64>()) {
        return match op {
            "==" => l == r,
            "!=" => l != r,
            "<" => l < r,
            ">" => l > r,
            "<=" => l <= r,
            ">=" => l >= r,
            _ => unreachable!(),
        };
    }
    match op {
        "==" => lhs == rhs,
        "!=" => lhs != rhs,
        "<" => lhs < rhs,
        ">" => lhs > rhs,
        "<=" => lhs <= rhs,
        ">=" => lhs >= rhs,
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::{StepExecutionId, WorkflowExecutionId};

    fn step(name: &str, status: StepStatus) -> StepExecution {
        StepExecution {
            id: StepExecutionId(1),
            execution_id: WorkflowExecutionId(1),
            step_number: 1,
            step_name: name.to_string(),
            step_type: "terraform".to_string(),
            status,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            error_message: None,
            config: serde_json::Value::Null,
            output_logs: String::new(),
        }
    }

    fn ctx(pairs: &[(&str, &str)]) -> InterpolationContext {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    // P6: when: always runs; when: on_failure runs iff >=1 prior non-skipped step failed.
    #[test]
    fn when_always_runs_with_no_prior_steps() {
        assert_eq!(evaluate_when(None, &[]), Decision::Run);
        assert_eq!(evaluate_when(Some("always"), &[]), Decision::Run);
    }

    #[test]
    fn when_on_failure_requires_a_prior_failure() {
        let prior = vec![step("build", StepStatus::Completed)];
        assert!(matches!(evaluate_when(Some("on_failure"), &prior), Decision::Skip(_)));
        let prior = vec![step("build", StepStatus::Failed)];
        assert_eq!(evaluate_when(Some("on_failure"), &prior), Decision::Run);
    }

    #[test]
    fn when_manual_always_skips() {
        assert!(matches!(evaluate_when(Some("manual"), &[]), Decision::Skip(_)));
    }

    // P6: unless: $X == true skips iff $X interpolates to true.
    #[test]
    fn unless_skips_when_variable_equals_true() {
        let context = ctx(&[("SKIP_TESTS", "true")]);
        assert!(!evaluate_expr("$SKIP_TESTS == true", &context, &[], true).unwrap());
    }

    #[test]
    fn unless_runs_when_variable_is_false() {
        let context = ctx(&[("SKIP_TESTS", "false")]);
        assert!(evaluate_expr("$SKIP_TESTS == true", &context, &[], true).unwrap());
    }

    // P6: if: step.success requires that step completed (not skipped, not failed).
    #[test]
    fn if_step_success_requires_completed_status() {
        let prior = vec![step("build", StepStatus::Completed)];
        assert!(evaluate_expr("build.success", &ctx(&[]), &prior, false).unwrap());
        let prior = vec![step("build", StepStatus::Skipped)];
        assert!(!evaluate_expr("build.success", &ctx(&[]), &prior, false).unwrap());
    }

    #[test]
    fn numeric_comparison_is_numeric_not_lexicographic() {
        let context = ctx(&[("replicas", "10")]);
        assert!(evaluate_expr("$replicas > 9", &context, &[], false).unwrap());
    }

    #[test]
    fn contains_and_matches_operators() {
        let context = ctx(&[("image", "postgres:15")]);
        assert!(evaluate_expr("$image contains postgres", &context, &[], false).unwrap());
        assert!(evaluate_expr(r#"$image matches "^postgres:\d+""#, &context, &[], false).unwrap());
    }
}
