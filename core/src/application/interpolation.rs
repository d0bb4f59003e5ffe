// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Variable Interpolation
//!
//! Recognizes `$VAR`, `${VAR}`, and `{{ .path }}` inside string fields of
//! step config (spec.md §4.6.2). Missing variables resolve to the empty
//! string; implementations never abort on a missing variable.

use handlebars::Handlebars;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Flat `name -> value` context built from workflow parameters, the
/// calling resource's flattened properties, and prior step outputs
/// (`<step_name>.<output_name>`, `<step_name>.status`).
pub type InterpolationContext = HashMap<String, String>;

static DOLLAR_BRACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.]*)\}").unwrap());
static DOLLAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_.]*)").unwrap());
static MUSTACHE_DOT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{\s*\.([A-Za-z0-9_.]+)\s*\}\}").unwrap());

/// Builds the nested JSON value handlebars needs for `{{ .a.b }}` paths out
/// of a flat context whose keys may themselves contain dots
/// (`step_name.output_name`). A flat key is inserted as a nested object
/// path so both `{{ .step_name.output_name }}` and, if ever needed,
/// `{{ step_name.output_name }}` resolve the same value.
fn nest(context: &InterpolationContext) -> serde_json::Value {
    let mut root = serde_json::Map::new();
    for (key, value) in context {
        let mut cursor = &mut root;
        let parts: Vec<&str> = key.split('.').collect();
        for (i, part) in parts.iter().enumerate() {
            if i == parts.len() - 1 {
                cursor.insert(part.to_string(), serde_json::Value::String(value.clone()));
            } else {
                cursor = cursor
                    .entry(part.to_string())
                    .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()))
                    .as_object_mut()
                    .expect("prior insert was always an object");
            }
        }
    }
    serde_json::Value::Object(root)
}

/// Replace all recognized variable forms in `input` using `context`.
/// Unresolvable variables interpolate to the empty string.
pub fn interpolate(input: &str, context: &InterpolationContext) -> String {
    let after_braces = DOLLAR_BRACE_RE.replace_all(input, |caps: &regex::Captures| context.get(&caps[1]).cloned().unwrap_or_default());
    let after_dollar = DOLLAR_RE.replace_all(&after_braces, |caps: &regex::Captures| context.get(&caps[1]).cloned().unwrap_or_default());

    if !MUSTACHE_DOT_RE.is_match(&after_dollar) {
        return after_dollar.into_owned();
    }

    let nested = nest(context);
    let handlebars = Handlebars::new();
    let mut rendered = String::with_capacity(after_dollar.len());
    let mut last = 0;
    for caps in MUSTACHE_DOT_RE.captures_iter(&after_dollar) {
        let whole = caps.get(0).unwrap();
        rendered.push_str(&after_dollar[last..whole.start()]);
        let path = &caps[1];
        let template = format!("{{{{{path}}}}}");
        let value = handlebars.render_template(&template, &nested).unwrap_or_default();
        rendered.push_str(&value);
        last = whole.end();
    }
    rendered.push_str(&after_dollar[last..]);
    rendered
}

/// Interpolates every string value in a JSON config blob, recursing into
/// arrays and objects. Non-string scalars pass through unchanged.
pub fn interpolate_json(value: &serde_json::Value, context: &InterpolationContext) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(interpolate(s, context)),
        serde_json::Value::Array(items) => serde_json::Value::Array(items.iter().map(|v| interpolate_json(v, context)).collect()),
        serde_json::Value::Object(map) => {
            serde_json::Value::Object(map.iter().map(|(k, v)| (k.clone(), interpolate_json(v, context))).collect())
        }
        other => other.clone(),
    }
}

/// `$VAR` truthy iff defined and non-empty (spec.md §4.6.3).
pub fn is_truthy(context: &InterpolationContext, var: &str) -> bool {
    context.get(var).map(|v| !v.is_empty()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, &str)]) -> InterpolationContext {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn interpolates_dollar_and_braced_forms() {
        let context = ctx(&[("REGION", "us-east-1"), ("version", "15")]);
        assert_eq!(interpolate("region=$REGION", &context), "region=us-east-1");
        assert_eq!(interpolate("region=${REGION} v${version}", &context), "region=us-east-1 v15");
    }

    #[test]
    fn missing_variable_interpolates_to_empty_string() {
        let context = ctx(&[]);
        assert_eq!(interpolate("value=$MISSING", &context), "value=");
    }

    #[test]
    fn interpolates_mustache_dot_path_from_flat_step_output_key() {
        let context = ctx(&[("build.status", "completed")]);
        assert_eq!(interpolate("{{ .build.status }}", &context), "completed");
    }

    #[test]
    fn interpolate_json_recurses_through_nested_structures() {
        let context = ctx(&[("version", "15")]);
        let config = serde_json::json!({"engine": "postgres", "options": ["--v=$version", {"tag": "${version}"}]});
        let out = interpolate_json(&config, &context);
        assert_eq!(out["options"][0], "--v=15");
        assert_eq!(out["options"][1]["tag"], "15");
    }

    #[test]
    fn is_truthy_requires_defined_and_non_empty() {
        let context = ctx(&[("SKIP_TESTS", "true"), ("EMPTY", "")]);
        assert!(is_truthy(&context, "SKIP_TESTS"));
        assert!(!is_truthy(&context, "EMPTY"));
        assert!(!is_truthy(&context, "UNDEFINED"));
    }
}
