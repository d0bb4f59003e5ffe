// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Workflow Executor
//!
//! Drives one [`WorkflowDocument`] to completion: sequencing, variable
//! interpolation, conditional execution, retry/resume, and log streaming
//! (spec.md §4.6). Execution is single-threaded per workflow execution;
//! the orchestration engine is responsible for running many of these
//! concurrently (spec.md §4.6.1).

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::application::conditions::{evaluate_expr, evaluate_when, Decision};
use crate::application::interpolation::{interpolate_json, InterpolationContext};
use crate::application::step_runner::{StepContext, StepRunnerRegistry};
use crate::domain::execution::{
    ExecutionStatus, NewStepExecution, NewWorkflowExecution, StepExecution, StepExecutionId, StepStatus, WorkflowExecution, WorkflowExecutionId,
};
use crate::domain::repository::{RepositoryError, StepExecutionRepository, WorkflowExecutionRepository};
use crate::domain::workflow::{OnErrorMode, ParameterType, WorkflowDocument, WorkflowError};
use crate::error::ErrorCode;

/// Published for every log line a step runner emits, and for every
/// persisted append (spec.md §4.6.7).
pub trait LogPublisher: Send + Sync {
    fn publish(&self, execution_id: WorkflowExecutionId, step_name: &str, line: &str);
}

/// No-op publisher for callers (and tests) that don't need live streaming.
pub struct NullLogPublisher;
impl LogPublisher for NullLogPublisher {
    fn publish(&self, _execution_id: WorkflowExecutionId, _step_name: &str, _line: &str) {}
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("retry source execution {0} not found")]
    RetrySourceNotFound(WorkflowExecutionId),
    #[error("execution {0} has no failed step to resume from")]
    NoResumePoint(WorkflowExecutionId),
}

impl crate::error::HasErrorCode for ExecutorError {
    fn code(&self) -> ErrorCode {
        match self {
            ExecutorError::Workflow(e) => crate::error::HasErrorCode::code(e),
            ExecutorError::Repository(e) => crate::error::HasErrorCode::code(e),
            ExecutorError::RetrySourceNotFound(_) => ErrorCode::ExecutionNotFound,
            ExecutorError::NoResumePoint(_) => ErrorCode::Internal,
        }
    }
}
crate::impl_core_error_from!(ExecutorError);

/// One step, decoupled from its YAML source: either a freshly parsed
/// [`crate::domain::workflow::StepDef`] or a tuple reconstructed from a
/// parent execution's stored step rows during retry (spec.md §4.6.6),
/// which by construction carries only `{name, type, config}` — no
/// conditions, since those aren't persisted per row.
#[derive(Debug, Clone)]
struct RunnableStep {
    name: String,
    step_type: String,
    config: serde_json::Value,
    env: HashMap<String, String>,
    when: Option<String>,
    if_expr: Option<String>,
    unless: Option<String>,
    outputs: Vec<String>,
    on_error: OnErrorMode,
    rollback: Vec<RunnableStep>,
}

impl From<&crate::domain::workflow::StepDef> for RunnableStep {
    fn from(step: &crate::domain::workflow::StepDef) -> Self {
        Self {
            name: step.name.clone(),
            step_type: step.step_type.clone(),
            config: step.config.clone(),
            env: step.env.clone(),
            when: step.when.clone(),
            if_expr: step.if_expr.clone(),
            unless: step.unless.clone(),
            outputs: step.outputs.clone(),
            on_error: step.on_error.mode,
            rollback: step.on_error.rollback_steps.iter().map(RunnableStep::from).collect(),
        }
    }
}

pub struct WorkflowExecutor {
    runners: StepRunnerRegistry,
    executions: Arc<dyn WorkflowExecutionRepository>,
    steps: Arc<dyn StepExecutionRepository>,
    log_publisher: Arc<dyn LogPublisher>,
}

impl WorkflowExecutor {
    pub fn new(
        runners: StepRunnerRegistry,
        executions: Arc<dyn WorkflowExecutionRepository>,
        steps: Arc<dyn StepExecutionRepository>,
        log_publisher: Arc<dyn LogPublisher>,
    ) -> Self {
        Self { runners, executions, steps, log_publisher }
    }

    /// Validates the document against the registered step types, then
    /// starts a fresh execution (spec.md §4.6.1).
    pub async fn start(
        &self,
        app_name: &str,
        document: &WorkflowDocument,
        resource_context: HashMap<String, String>,
        input: HashMap<String, serde_json::Value>,
        cancellation: CancellationToken,
    ) -> Result<WorkflowExecutionId, ExecutorError> {
        document.validate(&self.runners.registered_types())?;
        let params = validate_parameters(document, &input)?;

        let mut context: InterpolationContext = resource_context;
        context.extend(params);

        let runnable: Vec<RunnableStep> = document.steps.iter().map(RunnableStep::from).collect();
        let new_execution = NewWorkflowExecution::fresh(app_name, &document.metadata.name, runnable.len() as i32);
        let new_steps: Vec<NewStepExecution> = runnable
            .iter()
            .enumerate()
            .map(|(i, s)| NewStepExecution { execution_id: WorkflowExecutionId(0), step_number: (i + 1) as i32, step_name: s.name.clone(), step_type: s.step_type.clone(), config: s.config.clone() })
            .collect();

        let (execution, step_rows) = self.executions.create_with_steps(new_execution, new_steps).await?;
        self.drive(execution, step_rows, runnable, context, 1, cancellation).await
    }

    /// Retries a prior execution from its lowest-numbered failed step, or
    /// an explicit `resume_from_step` (spec.md §4.6.6, P5).
    pub async fn retry(&self, parent_id: WorkflowExecutionId, resume_from_step: Option<i32>, cancellation: CancellationToken) -> Result<WorkflowExecutionId, ExecutorError> {
        let parent = self.executions.find_by_id(parent_id).await?.ok_or(ExecutorError::RetrySourceNotFound(parent_id))?;
        let parent_steps = self.steps.list_for_execution(parent_id).await?;

        let resume_from = match resume_from_step {
            Some(n) => n,
            None => parent_steps
                .iter()
                .filter(|s| s.status == StepStatus::Failed)
                .map(|s| s.step_number)
                .min()
                .ok_or(ExecutorError::NoResumePoint(parent_id))?,
        };

        let new_execution = NewWorkflowExecution::retry_of(&parent, resume_from);
        let new_steps: Vec<NewStepExecution> = parent_steps
            .iter()
            .map(|s| NewStepExecution { execution_id: WorkflowExecutionId(0), step_number: s.step_number, step_name: s.step_name.clone(), step_type: s.step_type.clone(), config: s.config.clone() })
            .collect();
        let runnable: Vec<RunnableStep> = parent_steps
            .iter()
            .map(|s| RunnableStep {
                name: s.step_name.clone(),
                step_type: s.step_type.clone(),
                config: s.config.clone(),
                env: HashMap::new(),
                when: None,
                if_expr: None,
                unless: None,
                outputs: vec![],
                on_error: OnErrorMode::Fail,
                rollback: vec![],
            })
            .collect();

        let (execution, step_rows) = self.executions.create_with_steps(new_execution, new_steps).await?;

        // Steps before the resume point are not re-executed by default;
        // they're recorded as skipped for lineage (spec.md §4.6.6).
        for row in step_rows.iter().filter(|r| r.step_number < resume_from) {
            self.steps.set_status(row.id, StepStatus::Skipped, Some("resumed past this step".to_string())).await?;
        }

        self.drive(execution, step_rows, runnable, HashMap::new(), resume_from, cancellation).await
    }

    async fn drive(
        &self,
        execution: WorkflowExecution,
        step_rows: Vec<StepExecution>,
        steps: Vec<RunnableStep>,
        mut context: InterpolationContext,
        resume_from: i32,
        cancellation: CancellationToken,
    ) -> Result<WorkflowExecutionId, ExecutorError> {
        let mut completed_steps: Vec<StepExecution> = step_rows.iter().filter(|r| r.step_number < resume_from).cloned().collect();
        let mut final_error: Option<String> = None;

        for (step, row) in steps.iter().zip(step_rows.iter()).filter(|(_, r)| r.step_number >= resume_from) {
            if cancellation.is_cancelled() {
                self.steps.set_status(row.id, StepStatus::Failed, Some("CANCELLED".to_string())).await?;
                final_error = Some("CANCELLED".to_string());
                break;
            }

            match self.decide(step, &completed_steps, &context) {
                Decision::Skip(reason) => {
                    let updated = self.steps.set_status(row.id, StepStatus::Skipped, Some(reason)).await?;
                    completed_steps.push(updated);
                    continue;
                }
                Decision::Run => {}
            }

            self.steps.set_status(row.id, StepStatus::Running, None).await?;
            let outcome = self.dispatch(execution.id, Some(row.id), step, &context, cancellation.clone()).await;

            if outcome.success {
                let updated = self.steps.set_status(row.id, StepStatus::Completed, None).await?;
                for name in &step.outputs {
                    if let Some(value) = outcome.outputs.get(name) {
                        context.insert(format!("{}.{}", step.name, name), value.clone());
                    }
                }
                context.insert(format!("{}.status", step.name), "completed".to_string());
                completed_steps.push(updated);
            } else {
                let updated = self.steps.set_status(row.id, StepStatus::Failed, outcome.error_message.clone()).await?;
                context.insert(format!("{}.status", step.name), "failed".to_string());
                completed_steps.push(updated);

                match step.on_error {
                    OnErrorMode::Fail => {
                        final_error = outcome.error_message.clone().or_else(|| Some("STEP_FAILED".to_string()));
                        break;
                    }
                    OnErrorMode::Continue => {
                        warn!(step = %step.name, "step failed, continuing per on_error: continue");
                        continue;
                    }
                    OnErrorMode::Rollback => {
                        for rollback_step in &step.rollback {
                            let rollback_outcome = self.dispatch(execution.id, None, rollback_step, &context, cancellation.clone()).await;
                            if !rollback_outcome.success {
                                error!(step = %rollback_step.name, "rollback step failed");
                            }
                        }
                        final_error = outcome.error_message.clone().or_else(|| Some("STEP_FAILED".to_string()));
                        break;
                    }
                }
            }
        }

        let status = if final_error.is_some() { ExecutionStatus::Failed } else { ExecutionStatus::Completed };
        self.executions.set_status(execution.id, status, final_error).await?;
        info!(execution = %execution.id, status = ?status, "workflow execution finished");
        Ok(execution.id)
    }

    fn decide(&self, step: &RunnableStep, prior: &[StepExecution], context: &InterpolationContext) -> Decision {
        if let d @ Decision::Skip(_) = evaluate_when(step.when.as_deref(), prior) {
            return d;
        }
        if let Some(unless) = &step.unless {
            match evaluate_expr(unless, context, prior, true) {
                Ok(false) => return Decision::Skip(format!("unless: {unless}")),
                Ok(true) => {}
                Err(e) => warn!(error = %e, "failed to evaluate unless expression, defaulting to run"),
            }
        }
        if let Some(if_expr) = &step.if_expr {
            match evaluate_expr(if_expr, context, prior, false) {
                Ok(false) => return Decision::Skip(format!("if: {if_expr}")),
                Ok(true) => {}
                Err(e) => warn!(error = %e, "failed to evaluate if expression, defaulting to run"),
            }
        }
        Decision::Run
    }

    async fn dispatch(
        &self,
        execution_id: WorkflowExecutionId,
        step_id: Option<StepExecutionId>,
        step: &RunnableStep,
        context: &InterpolationContext,
        cancellation: CancellationToken,
    ) -> crate::application::step_runner::StepOutcome {
        use crate::application::step_runner::StepOutcome;

        let runner = match self.runners.get(&step.step_type) {
            Some(r) => r,
            None => return StepOutcome::failed(format!("no runner registered for step type '{}'", step.step_type)),
        };

        let resolved_config = interpolate_json(&step.config, context);
        let resolved_env: HashMap<String, String> = step.env.iter().map(|(k, v)| (k.clone(), crate::application::interpolation::interpolate(v, context))).collect();

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let steps_repo = self.steps.clone();
        let publisher = self.log_publisher.clone();
        let step_name = step.name.clone();

        let ctx = StepContext { step_name: step.name.clone(), config: resolved_config, env: resolved_env, variables: context.clone(), cancellation, log_tx: tx };

        let drain = async move {
            while let Some(line) = rx.recv().await {
                publisher.publish(execution_id, &step_name, &line);
                if let Some(id) = step_id {
                    if let Err(e) = steps_repo.append_log(id, &line).await {
                        warn!(error = %e, step = %step_name, "failed to persist log line");
                    }
                }
            }
        };

        let (outcome, _) = tokio::join!(runner.run(ctx), drain);
        outcome
    }
}

/// Validates workflow parameters against input (spec.md §4.5, §6) and
/// returns the flattened `name -> string value` context entry for each,
/// after defaulting.
fn validate_parameters(document: &WorkflowDocument, input: &HashMap<String, serde_json::Value>) -> Result<InterpolationContext, WorkflowError> {
    let mut result = InterpolationContext::new();
    for param in &document.parameters {
        let raw = input.get(&param.name).cloned().or_else(|| param.default.clone());
        let raw = match raw {
            Some(v) => v,
            None => {
                if param.required {
                    return Err(WorkflowError::MissingRequiredParameter(param.name.clone()));
                }
                continue;
            }
        };

        let as_string = match &raw {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        match param.param_type {
            ParameterType::String => {
                if let Some(pattern) = &param.pattern {
                    let re = regex::Regex::new(pattern).map_err(|e| WorkflowError::ParameterValidation { name: param.name.clone(), reason: format!("bad pattern: {e}") })?;
                    if !re.is_match(&as_string) {
                        return Err(WorkflowError::ParameterValidation { name: param.name.clone(), reason: format!("'{as_string}' does not match pattern '{pattern}'") });
                    }
                }
                if !param.allowed_values.is_empty() && !param.allowed_values.contains(&as_string) {
                    return Err(WorkflowError::ParameterValidation { name: param.name.clone(), reason: format!("'{as_string}' not in allowed_values") });
                }
            }
            ParameterType::Int => {
                let n: i64 = as_string.parse().map_err(|_| WorkflowError::ParameterValidation { name: param.name.clone(), reason: format!("'{as_string}' is not an integer") })?;
                if let Some(min) = param.min {
                    if n < min {
                        return Err(WorkflowError::ParameterValidation { name: param.name.clone(), reason: format!("{n} is below min {min}") });
                    }
                }
                if let Some(max) = param.max {
                    if n > max {
                        return Err(WorkflowError::ParameterValidation { name: param.name.clone(), reason: format!("{n} is above max {max}") });
                    }
                }
            }
            ParameterType::Bool => {
                as_string.parse::<bool>().map_err(|_| WorkflowError::ParameterValidation { name: param.name.clone(), reason: format!("'{as_string}' is not a bool") })?;
            }
            ParameterType::Duration => {
                humantime::parse_duration(&as_string).map_err(|e| WorkflowError::ParameterValidation { name: param.name.clone(), reason: format!("invalid duration: {e}") })?;
                if let Some(pattern) = &param.pattern {
                    let re = regex::Regex::new(pattern).map_err(|e| WorkflowError::ParameterValidation { name: param.name.clone(), reason: format!("bad pattern: {e}") })?;
                    if !re.is_match(&as_string) {
                        return Err(WorkflowError::ParameterValidation { name: param.name.clone(), reason: format!("'{as_string}' does not match pattern '{pattern}'") });
                    }
                }
            }
            ParameterType::Enum => {
                if !param.allowed_values.contains(&as_string) {
                    return Err(WorkflowError::ParameterValidation { name: param.name.clone(), reason: format!("'{as_string}' not in allowed_values") });
                }
            }
        }

        result.insert(param.name.clone(), as_string);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workflow::{OnErrorPolicy, ParameterDef, StepDef, WorkflowMetadata, WORKFLOW_API_VERSION};

    fn doc_with_param(required: bool, default: Option<serde_json::Value>) -> WorkflowDocument {
        WorkflowDocument {
            api_version: WORKFLOW_API_VERSION.to_string(),
            kind: "Workflow".to_string(),
            metadata: WorkflowMetadata { name: "provision".into(), description: None },
            parameters: vec![ParameterDef { name: "version".into(), param_type: ParameterType::String, required, default, pattern: None, allowed_values: vec![], min: None, max: None }],
            steps: vec![StepDef {
                name: "apply".into(),
                step_type: "terraform".into(),
                config: serde_json::Value::Null,
                env: Default::default(),
                when: None,
                if_expr: None,
                unless: None,
                outputs: vec![],
                on_error: OnErrorPolicy::default(),
            }],
        }
    }

    #[test]
    fn missing_required_parameter_fails_fast() {
        let doc = doc_with_param(true, None);
        let err = validate_parameters(&doc, &HashMap::new()).unwrap_err();
        assert!(matches!(err, WorkflowError::MissingRequiredParameter(_)));
    }

    #[test]
    fn default_is_used_when_input_absent() {
        let doc = doc_with_param(false, Some(serde_json::json!("15")));
        let result = validate_parameters(&doc, &HashMap::new()).unwrap();
        assert_eq!(result.get("version").unwrap(), "15");
    }

    #[test]
    fn enum_parameter_rejects_value_outside_allowed_values() {
        let mut doc = doc_with_param(true, None);
        doc.parameters[0].param_type = ParameterType::Enum;
        doc.parameters[0].allowed_values = vec!["a".into(), "b".into()];
        let mut input = HashMap::new();
        input.insert("version".to_string(), serde_json::json!("c"));
        assert!(validate_parameters(&doc, &input).is_err());
    }

    #[test]
    fn int_parameter_enforces_min_and_max() {
        let mut doc = doc_with_param(true, None);
        doc.parameters[0].param_type = ParameterType::Int;
        doc.parameters[0].min = Some(1);
        doc.parameters[0].max = Some(10);
        let mut input = HashMap::new();
        input.insert("version".to_string(), serde_json::json!(20));
        assert!(validate_parameters(&doc, &input).is_err());
    }

    #[test]
    fn duration_parameter_accepts_day_and_week_units() {
        let mut doc = doc_with_param(true, None);
        doc.parameters[0].param_type = ParameterType::Duration;
        let mut input = HashMap::new();
        input.insert("version".to_string(), serde_json::json!("2w"));
        assert!(validate_parameters(&doc, &input).is_ok());
    }
}
