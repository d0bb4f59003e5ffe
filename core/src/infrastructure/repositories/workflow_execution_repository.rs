// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Workflow execution repository, Postgres and SQLite backends.

use async_trait::async_trait;
use sqlx::{PgPool, Row, SqlitePool};

use crate::domain::execution::{ExecutionStatus, NewStepExecution, NewWorkflowExecution, StepExecution, StepStatus, WorkflowExecution, WorkflowExecutionId};
use crate::domain::repository::{RepositoryError, WorkflowExecutionRepository};

fn to_database_error<E: std::fmt::Display>(e: E) -> RepositoryError {
    RepositoryError::Database(e.to_string())
}

fn status_from_str(s: &str) -> ExecutionStatus {
    match s {
        "completed" => ExecutionStatus::Completed,
        "failed" => ExecutionStatus::Failed,
        _ => ExecutionStatus::Running,
    }
}

fn status_as_str(s: ExecutionStatus) -> &'static str {
    match s {
        ExecutionStatus::Running => "running",
        ExecutionStatus::Completed => "completed",
        ExecutionStatus::Failed => "failed",
    }
}

fn step_status_from_str(s: &str) -> StepStatus {
    match s {
        "running" => StepStatus::Running,
        "completed" => StepStatus::Completed,
        "failed" => StepStatus::Failed,
        "skipped" => StepStatus::Skipped,
        _ => StepStatus::Pending,
    }
}

const EXECUTION_COLUMNS: &str = "id, app_name, workflow_name, status, started_at, completed_at, error_message, total_steps, \
     parent_execution_id, retry_count, is_retry, resume_from_step, created_at, updated_at";
const STEP_COLUMNS: &str = "id, execution_id, step_number, step_name, step_type, status, started_at, completed_at, duration_ms, error_message, config, output_logs";

pub struct PgWorkflowExecutionRepository(PgPool);

impl PgWorkflowExecutionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self(pool)
    }
}

fn pg_row_to_execution(row: &sqlx::postgres::PgRow) -> Result<WorkflowExecution, RepositoryError> {
    let status: String = row.try_get("status").map_err(to_database_error)?;
    let parent_execution_id: Option<i64> = row.try_get("parent_execution_id").map_err(to_database_error)?;
    Ok(WorkflowExecution {
        id: WorkflowExecutionId(row.try_get("id").map_err(to_database_error)?),
        app_name: row.try_get("app_name").map_err(to_database_error)?,
        workflow_name: row.try_get("workflow_name").map_err(to_database_error)?,
        status: status_from_str(&status),
        started_at: row.try_get("started_at").map_err(to_database_error)?,
        completed_at: row.try_get("completed_at").map_err(to_database_error)?,
        error_message: row.try_get("error_message").map_err(to_database_error)?,
        total_steps: row.try_get("total_steps").map_err(to_database_error)?,
        parent_execution_id: parent_execution_id.map(WorkflowExecutionId),
        retry_count: row.try_get("retry_count").map_err(to_database_error)?,
        is_retry: row.try_get("is_retry").map_err(to_database_error)?,
        resume_from_step: row.try_get("resume_from_step").map_err(to_database_error)?,
        created_at: row.try_get("created_at").map_err(to_database_error)?,
        updated_at: row.try_get("updated_at").map_err(to_database_error)?,
    })
}

fn pg_row_to_step(row: &sqlx::postgres::PgRow) -> Result<StepExecution, RepositoryError> {
    let status: String = row.try_get("status").map_err(to_database_error)?;
    Ok(StepExecution {
        id: crate::domain::execution::StepExecutionId(row.try_get("id").map_err(to_database_error)?),
        execution_id: WorkflowExecutionId(row.try_get("execution_id").map_err(to_database_error)?),
        step_number: row.try_get("step_number").map_err(to_database_error)?,
        step_name: row.try_get("step_name").map_err(to_database_error)?,
        step_type: row.try_get("step_type").map_err(to_database_error)?,
        status: step_status_from_str(&status),
        started_at: row.try_get("started_at").map_err(to_database_error)?,
        completed_at: row.try_get("completed_at").map_err(to_database_error)?,
        duration_ms: row.try_get("duration_ms").map_err(to_database_error)?,
        error_message: row.try_get("error_message").map_err(to_database_error)?,
        config: row.try_get("config").map_err(to_database_error)?,
        output_logs: row.try_get("output_logs").map_err(to_database_error)?,
    })
}

#[async_trait]
impl WorkflowExecutionRepository for PgWorkflowExecutionRepository {
    async fn create_with_steps(&self, execution: NewWorkflowExecution, steps: Vec<NewStepExecution>) -> Result<(WorkflowExecution, Vec<StepExecution>), RepositoryError> {
        let mut tx = self.0.begin().await.map_err(to_database_error)?;
        let row = sqlx::query(&format!(
            "INSERT INTO workflow_executions (app_name, workflow_name, total_steps, parent_execution_id, retry_count, is_retry, resume_from_step)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {EXECUTION_COLUMNS}"
        ))
        .bind(&execution.app_name)
        .bind(&execution.workflow_name)
        .bind(execution.total_steps)
        .bind(execution.parent_execution_id.map(|p| p.0))
        .bind(execution.retry_count)
        .bind(execution.is_retry)
        .bind(execution.resume_from_step)
        .fetch_one(&mut *tx)
        .await
        .map_err(to_database_error)?;
        let saved_execution = pg_row_to_execution(&row)?;

        let mut saved_steps = Vec::with_capacity(steps.len());
        for step in steps {
            let row = sqlx::query(&format!(
                "INSERT INTO step_executions (execution_id, step_number, step_name, step_type, config)
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING {STEP_COLUMNS}"
            ))
            .bind(saved_execution.id.0)
            .bind(step.step_number)
            .bind(&step.step_name)
            .bind(&step.step_type)
            .bind(&step.config)
            .fetch_one(&mut *tx)
            .await
            .map_err(to_database_error)?;
            saved_steps.push(pg_row_to_step(&row)?);
        }

        tx.commit().await.map_err(to_database_error)?;
        Ok((saved_execution, saved_steps))
    }

    async fn find_by_id(&self, id: WorkflowExecutionId) -> Result<Option<WorkflowExecution>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {EXECUTION_COLUMNS} FROM workflow_executions WHERE id = $1")).bind(id.0).fetch_optional(&self.0).await.map_err(to_database_error)?;
        row.as_ref().map(pg_row_to_execution).transpose()
    }

    async fn list_by_app(&self, app_name: &str, limit: i64) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {EXECUTION_COLUMNS} FROM workflow_executions WHERE app_name = $1 ORDER BY created_at DESC LIMIT $2"))
            .bind(app_name)
            .bind(limit)
            .fetch_all(&self.0)
            .await
            .map_err(to_database_error)?;
        rows.iter().map(pg_row_to_execution).collect()
    }

    async fn set_status(&self, id: WorkflowExecutionId, status: ExecutionStatus, error_message: Option<String>) -> Result<WorkflowExecution, RepositoryError> {
        let row = sqlx::query(&format!(
            "UPDATE workflow_executions SET status = $2, error_message = $3, updated_at = now(),
             completed_at = CASE WHEN $2 IN ('completed', 'failed') THEN now() ELSE completed_at END
             WHERE id = $1
             RETURNING {EXECUTION_COLUMNS}"
        ))
        .bind(id.0)
        .bind(status_as_str(status))
        .bind(&error_message)
        .fetch_optional(&self.0)
        .await
        .map_err(to_database_error)?
        .ok_or(RepositoryError::NotFound)?;
        pg_row_to_execution(&row)
    }
}

pub struct SqliteWorkflowExecutionRepository(SqlitePool);

impl SqliteWorkflowExecutionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self(pool)
    }
}

fn sqlite_row_to_execution(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowExecution, RepositoryError> {
    let status: String = row.try_get("status").map_err(to_database_error)?;
    let parent_execution_id: Option<i64> = row.try_get("parent_execution_id").map_err(to_database_error)?;
    let is_retry: i64 = row.try_get("is_retry").map_err(to_database_error)?;
    Ok(WorkflowExecution {
        id: WorkflowExecutionId(row.try_get("id").map_err(to_database_error)?),
        app_name: row.try_get("app_name").map_err(to_database_error)?,
        workflow_name: row.try_get("workflow_name").map_err(to_database_error)?,
        status: status_from_str(&status),
        started_at: row.try_get("started_at").map_err(to_database_error)?,
        completed_at: row.try_get("completed_at").map_err(to_database_error)?,
        error_message: row.try_get("error_message").map_err(to_database_error)?,
        total_steps: row.try_get("total_steps").map_err(to_database_error)?,
        parent_execution_id: parent_execution_id.map(WorkflowExecutionId),
        retry_count: row.try_get("retry_count").map_err(to_database_error)?,
        is_retry: is_retry != 0,
        resume_from_step: row.try_get("resume_from_step").map_err(to_database_error)?,
        created_at: row.try_get("created_at").map_err(to_database_error)?,
        updated_at: row.try_get("updated_at").map_err(to_database_error)?,
    })
}

fn sqlite_row_to_step(row: &sqlx::sqlite::SqliteRow) -> Result<StepExecution, RepositoryError> {
    let status: String = row.try_get("status").map_err(to_database_error)?;
    let config: String = row.try_get("config").map_err(to_database_error)?;
    Ok(StepExecution {
        id: crate::domain::execution::StepExecutionId(row.try_get("id").map_err(to_database_error)?),
        execution_id: WorkflowExecutionId(row.try_get("execution_id").map_err(to_database_error)?),
        step_number: row.try_get("step_number").map_err(to_database_error)?,
        step_name: row.try_get("step_name").map_err(to_database_error)?,
        step_type: row.try_get("step_type").map_err(to_database_error)?,
        status: step_status_from_str(&status),
        started_at: row.try_get("started_at").map_err(to_database_error)?,
        completed_at: row.try_get("completed_at").map_err(to_database_error)?,
        duration_ms: row.try_get("duration_ms").map_err(to_database_error)?,
        error_message: row.try_get("error_message").map_err(to_database_error)?,
        config: serde_json::from_str(&config).map_err(to_database_error)?,
        output_logs: row.try_get("output_logs").map_err(to_database_error)?,
    })
}

#[async_trait]
impl WorkflowExecutionRepository for SqliteWorkflowExecutionRepository {
    async fn create_with_steps(&self, execution: NewWorkflowExecution, steps: Vec<NewStepExecution>) -> Result<(WorkflowExecution, Vec<StepExecution>), RepositoryError> {
        let mut tx = self.0.begin().await.map_err(to_database_error)?;
        let execution_id = sqlx::query(
            "INSERT INTO workflow_executions (app_name, workflow_name, total_steps, parent_execution_id, retry_count, is_retry, resume_from_step)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&execution.app_name)
        .bind(&execution.workflow_name)
        .bind(execution.total_steps)
        .bind(execution.parent_execution_id.map(|p| p.0))
        .bind(execution.retry_count)
        .bind(execution.is_retry)
        .bind(execution.resume_from_step)
        .execute(&mut *tx)
        .await
        .map_err(to_database_error)?
        .last_insert_rowid();

        let mut saved_steps = Vec::with_capacity(steps.len());
        for step in steps {
            let config = serde_json::to_string(&step.config).map_err(to_database_error)?;
            let step_id = sqlx::query("INSERT INTO step_executions (execution_id, step_number, step_name, step_type, config) VALUES (?1, ?2, ?3, ?4, ?5)")
                .bind(execution_id)
                .bind(step.step_number)
                .bind(&step.step_name)
                .bind(&step.step_type)
                .bind(&config)
                .execute(&mut *tx)
                .await
                .map_err(to_database_error)?
                .last_insert_rowid();
            let row = sqlx::query(&format!("SELECT {STEP_COLUMNS} FROM step_executions WHERE id = ?1")).bind(step_id).fetch_one(&mut *tx).await.map_err(to_database_error)?;
            saved_steps.push(sqlite_row_to_step(&row)?);
        }

        let row = sqlx::query(&format!("SELECT {EXECUTION_COLUMNS} FROM workflow_executions WHERE id = ?1")).bind(execution_id).fetch_one(&mut *tx).await.map_err(to_database_error)?;
        let saved_execution = sqlite_row_to_execution(&row)?;

        tx.commit().await.map_err(to_database_error)?;
        Ok((saved_execution, saved_steps))
    }

    async fn find_by_id(&self, id: WorkflowExecutionId) -> Result<Option<WorkflowExecution>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {EXECUTION_COLUMNS} FROM workflow_executions WHERE id = ?1")).bind(id.0).fetch_optional(&self.0).await.map_err(to_database_error)?;
        row.as_ref().map(sqlite_row_to_execution).transpose()
    }

    async fn list_by_app(&self, app_name: &str, limit: i64) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {EXECUTION_COLUMNS} FROM workflow_executions WHERE app_name = ?1 ORDER BY created_at DESC LIMIT ?2"))
            .bind(app_name)
            .bind(limit)
            .fetch_all(&self.0)
            .await
            .map_err(to_database_error)?;
        rows.iter().map(sqlite_row_to_execution).collect()
    }

    async fn set_status(&self, id: WorkflowExecutionId, status: ExecutionStatus, error_message: Option<String>) -> Result<WorkflowExecution, RepositoryError> {
        let is_terminal = status.is_terminal();
        sqlx::query(
            "UPDATE workflow_executions SET status = ?2, error_message = ?3, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
             completed_at = CASE WHEN ?4 THEN strftime('%Y-%m-%dT%H:%M:%fZ', 'now') ELSE completed_at END
             WHERE id = ?1",
        )
        .bind(id.0)
        .bind(status_as_str(status))
        .bind(&error_message)
        .bind(is_terminal)
        .execute(&self.0)
        .await
        .map_err(to_database_error)?;
        self.find_by_id(id).await?.ok_or(RepositoryError::NotFound)
    }
}
