// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Workflow Execution Domain Model
//!
//! A [`WorkflowExecution`] is one run of a workflow document; a
//! [`StepExecution`] is one row per declared step per execution
//! (spec.md §3). Retry lineage is a parent pointer plus a monotonically
//! increasing `retry_count` (spec.md §4.6.6, §9) — retries are never
//! flattened into the parent execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkflowExecutionId(pub i64);

impl std::fmt::Display for WorkflowExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StepExecutionId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }
}

/// One run of a workflow document (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: WorkflowExecutionId,
    pub app_name: String,
    /// Template identifier, not a foreign key to a DB row — workflows are
    /// YAML documents, not persisted entities.
    pub workflow_name: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub total_steps: i32,
    pub parent_execution_id: Option<WorkflowExecutionId>,
    pub retry_count: i32,
    pub is_retry: bool,
    pub resume_from_step: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowExecution {
    pub fn is_root(&self) -> bool {
        self.parent_execution_id.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct NewWorkflowExecution {
    pub app_name: String,
    pub workflow_name: String,
    pub total_steps: i32,
    pub parent_execution_id: Option<WorkflowExecutionId>,
    pub retry_count: i32,
    pub is_retry: bool,
    pub resume_from_step: Option<i32>,
}

impl NewWorkflowExecution {
    pub fn fresh(app_name: impl Into<String>, workflow_name: impl Into<String>, total_steps: i32) -> Self {
        Self {
            app_name: app_name.into(),
            workflow_name: workflow_name.into(),
            total_steps,
            parent_execution_id: None,
            retry_count: 0,
            is_retry: false,
            resume_from_step: None,
        }
    }

    pub fn retry_of(parent: &WorkflowExecution, resume_from_step: i32) -> Self {
        Self {
            app_name: parent.app_name.clone(),
            workflow_name: parent.workflow_name.clone(),
            total_steps: parent.total_steps,
            parent_execution_id: Some(parent.id),
            retry_count: parent.retry_count + 1,
            is_retry: true,
            resume_from_step: Some(resume_from_step),
        }
    }
}

/// One row per declared step per execution (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    pub id: StepExecutionId,
    pub execution_id: WorkflowExecutionId,
    /// 1-based, unique per execution.
    pub step_number: i32,
    pub step_name: String,
    pub step_type: String,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
    /// Original step config, preserved so a retry can rebuild the workflow
    /// without re-parsing the source YAML (spec.md §3, §4.6.6).
    pub config: serde_json::Value,
    pub output_logs: String,
}

impl StepExecution {
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(s), Some(e)) => Some(e - s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewStepExecution {
    pub execution_id: WorkflowExecutionId,
    pub step_number: i32,
    pub step_name: String,
    pub step_type: String,
    pub config: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("workflow execution not found: {0}")]
    NotFound(WorkflowExecutionId),
    #[error("step execution not found: {0:?}")]
    StepNotFound(StepExecutionId),
    #[error("execution {0} has already reached a terminal state")]
    AlreadyTerminal(WorkflowExecutionId),
    #[error("step {0} timed out")]
    Timeout(i32),
    #[error("execution {0} was cancelled")]
    Cancelled(WorkflowExecutionId),
    #[error("no failed step to resume from in execution {0}")]
    NoResumePoint(WorkflowExecutionId),
}

impl crate::error::HasErrorCode for ExecutionError {
    fn code(&self) -> ErrorCode {
        match self {
            ExecutionError::NotFound(_) | ExecutionError::StepNotFound(_) => ErrorCode::ExecutionNotFound,
            ExecutionError::AlreadyTerminal(_) | ExecutionError::NoResumePoint(_) => ErrorCode::Internal,
            ExecutionError::Timeout(_) => ErrorCode::Timeout,
            ExecutionError::Cancelled(_) => ErrorCode::Cancelled,
        }
    }
}
crate::impl_core_error_from!(ExecutionError);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_of_increments_retry_count_and_links_parent() {
        let parent = WorkflowExecution {
            id: WorkflowExecutionId(1),
            app_name: "api-1".into(),
            workflow_name: "provision".into(),
            status: ExecutionStatus::Failed,
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
            error_message: Some("boom".into()),
            total_steps: 4,
            parent_execution_id: None,
            retry_count: 0,
            is_retry: false,
            resume_from_step: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let retry = NewWorkflowExecution::retry_of(&parent, 3);
        assert_eq!(retry.parent_execution_id, Some(WorkflowExecutionId(1)));
        assert_eq!(retry.retry_count, 1);
        assert!(retry.is_retry);
        assert_eq!(retry.resume_from_step, Some(3));
    }

    #[test]
    fn duration_is_none_until_both_timestamps_present() {
        let step = StepExecution {
            id: StepExecutionId(1),
            execution_id: WorkflowExecutionId(1),
            step_number: 1,
            step_name: "terraform-apply".into(),
            step_type: "terraform".into(),
            status: StepStatus::Running,
            started_at: Some(Utc::now()),
            completed_at: None,
            duration_ms: None,
            error_message: None,
            config: serde_json::Value::Null,
            output_logs: String::new(),
        };
        assert!(step.duration().is_none());
    }
}
