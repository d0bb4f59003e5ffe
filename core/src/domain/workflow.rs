// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Workflow Document Model
//!
//! A workflow is a parsed YAML document (`apiVersion: innominatus.io/v1alpha1,
//! kind: Workflow`, spec.md §4.5, §6). This module holds the in-memory shape
//! and the validation that can be done without a runtime context; the YAML
//! anti-corruption layer lives in `infrastructure::workflow_parser`, and
//! execution lives in `application::executor`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::error::ErrorCode;

pub const WORKFLOW_API_VERSION: &str = "innominatus.io/v1alpha1";

/// The set of step types this core ships runner implementations for
/// (spec.md §4.6.4). Additional types may be registered as extensions;
/// anything outside this set that isn't separately registered fails parse
/// with `UNKNOWN_STEP_TYPE`.
pub const BUILTIN_STEP_TYPES: &[&str] =
    &["terraform", "kubernetes", "ansible", "gitea-repo", "argocd-app", "policy", "validation", "http", "notification"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Int,
    Bool,
    Duration,
    Enum,
}

/// A declared workflow parameter (spec.md §4.5, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed_values: Vec<String>,
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
}

impl ParameterDef {
    pub fn validate_self(&self) -> Result<(), WorkflowError> {
        if self.param_type == ParameterType::Enum && self.allowed_values.is_empty() {
            return Err(WorkflowError::InvalidParameterDef { name: self.name.clone(), reason: "enum parameters require allowed_values".into() });
        }
        if let Some(pattern) = &self.pattern {
            regex::Regex::new(pattern).map_err(|e| WorkflowError::InvalidParameterDef { name: self.name.clone(), reason: format!("invalid pattern: {e}") })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnErrorMode {
    Fail,
    Continue,
    Rollback,
}

impl Default for OnErrorMode {
    fn default() -> Self {
        OnErrorMode::Fail
    }
}

/// A step's failure policy (spec.md §4.5, §4.6.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnErrorPolicy {
    #[serde(default)]
    pub mode: OnErrorMode,
    #[serde(default)]
    pub rollback_steps: Vec<StepDef>,
}

impl Default for OnErrorPolicy {
    fn default() -> Self {
        Self { mode: OnErrorMode::Fail, rollback_steps: Vec::new() }
    }
}

/// One `steps[]` entry (spec.md §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDef {
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub env: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub when: Option<String>,
    #[serde(rename = "if", default)]
    pub if_expr: Option<String>,
    #[serde(default)]
    pub unless: Option<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub on_error: OnErrorPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// The full parsed workflow document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDocument {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: WorkflowMetadata,
    #[serde(default)]
    pub parameters: Vec<ParameterDef>,
    pub steps: Vec<StepDef>,
}

impl WorkflowDocument {
    /// Structural validation (spec.md §4.5): unique step names, known or
    /// registered step types, well-formed parameter defs. Parameter *value*
    /// validation against caller-supplied input happens in
    /// `application::executor` since it needs the input map.
    pub fn validate(&self, registered_step_types: &HashSet<String>) -> Result<(), WorkflowError> {
        if self.api_version != WORKFLOW_API_VERSION {
            return Err(WorkflowError::UnsupportedApiVersion(self.api_version.clone()));
        }
        if self.kind != "Workflow" {
            return Err(WorkflowError::InvalidKind(self.kind.clone()));
        }
        if self.metadata.name.trim().is_empty() {
            return Err(WorkflowError::EmptyName);
        }
        if self.steps.is_empty() {
            return Err(WorkflowError::NoSteps);
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name.clone()) {
                return Err(WorkflowError::DuplicateStepName(step.name.clone()));
            }
            if !BUILTIN_STEP_TYPES.contains(&step.step_type.as_str()) && !registered_step_types.contains(&step.step_type) {
                return Err(WorkflowError::UnknownStepType(step.step_type.clone()));
            }
        }
        for param in &self.parameters {
            param.validate_self()?;
        }
        Ok(())
    }

    pub fn find_step(&self, name: &str) -> Option<&StepDef> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn step_index(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("apiVersion '{0}' is not supported, expected '{WORKFLOW_API_VERSION}'")]
    UnsupportedApiVersion(String),
    #[error("kind must be 'Workflow', got '{0}'")]
    InvalidKind(String),
    #[error("workflow metadata.name must not be empty")]
    EmptyName,
    #[error("workflow must declare at least one step")]
    NoSteps,
    #[error("duplicate step name '{0}'")]
    DuplicateStepName(String),
    #[error("unregistered step type '{0}'")]
    UnknownStepType(String),
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameterDef { name: String, reason: String },
    #[error("missing required parameter '{0}'")]
    MissingRequiredParameter(String),
    #[error("parameter '{name}' failed validation: {reason}")]
    ParameterValidation { name: String, reason: String },
    #[error("failed to parse workflow document: {0}")]
    Parse(String),
}

impl crate::error::HasErrorCode for WorkflowError {
    fn code(&self) -> ErrorCode {
        match self {
            WorkflowError::UnknownStepType(_) => ErrorCode::UnknownStepType,
            WorkflowError::MissingRequiredParameter(_) | WorkflowError::ParameterValidation { .. } => ErrorCode::InvalidParameters,
            _ => ErrorCode::InvalidWorkflow,
        }
    }
}
crate::impl_core_error_from!(WorkflowError);
