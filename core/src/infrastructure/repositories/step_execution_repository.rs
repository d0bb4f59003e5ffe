// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Step execution repository, Postgres and SQLite backends.

use async_trait::async_trait;
use sqlx::{PgPool, Row, SqlitePool};

use crate::domain::execution::{NewStepExecution, StepExecution, StepExecutionId, StepStatus, WorkflowExecutionId};
use crate::domain::repository::{RepositoryError, StepExecutionRepository};

fn to_database_error<E: std::fmt::Display>(e: E) -> RepositoryError {
    RepositoryError::Database(e.to_string())
}

fn status_from_str(s: &str) -> StepStatus {
    match s {
        "running" => StepStatus::Running,
        "completed" => StepStatus::Completed,
        "failed" => StepStatus::Failed,
        "skipped" => StepStatus::Skipped,
        _ => StepStatus::Pending,
    }
}

const STEP_COLUMNS: &str = "id, execution_id, step_number, step_name, step_type, status, started_at, completed_at, duration_ms, error_message, config, output_logs";

pub struct PgStepExecutionRepository(PgPool);

impl PgStepExecutionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self(pool)
    }
}

fn pg_row_to_step(row: &sqlx::postgres::PgRow) -> Result<StepExecution, RepositoryError> {
    let status: String = row.try_get("status").map_err(to_database_error)?;
    Ok(StepExecution {
        id: StepExecutionId(row.try_get("id").map_err(to_database_error)?),
        execution_id: WorkflowExecutionId(row.try_get("execution_id").map_err(to_database_error)?),
        step_number: row.try_get("step_number").map_err(to_database_error)?,
        step_name: row.try_get("step_name").map_err(to_database_error)?,
        step_type: row.try_get("step_type").map_err(to_database_error)?,
        status: status_from_str(&status),
        started_at: row.try_get("started_at").map_err(to_database_error)?,
        completed_at: row.try_get("completed_at").map_err(to_database_error)?,
        duration_ms: row.try_get("duration_ms").map_err(to_database_error)?,
        error_message: row.try_get("error_message").map_err(to_database_error)?,
        config: row.try_get("config").map_err(to_database_error)?,
        output_logs: row.try_get("output_logs").map_err(to_database_error)?,
    })
}

#[async_trait]
impl StepExecutionRepository for PgStepExecutionRepository {
    async fn insert(&self, step: NewStepExecution) -> Result<StepExecution, RepositoryError> {
        let row = sqlx::query(&format!(
            "INSERT INTO step_executions (execution_id, step_number, step_name, step_type, config)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {STEP_COLUMNS}"
        ))
        .bind(step.execution_id.0)
        .bind(step.step_number)
        .bind(&step.step_name)
        .bind(&step.step_type)
        .bind(&step.config)
        .fetch_one(&self.0)
        .await
        .map_err(to_database_error)?;
        pg_row_to_step(&row)
    }

    async fn list_for_execution(&self, execution_id: WorkflowExecutionId) -> Result<Vec<StepExecution>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {STEP_COLUMNS} FROM step_executions WHERE execution_id = $1 ORDER BY step_number"))
            .bind(execution_id.0)
            .fetch_all(&self.0)
            .await
            .map_err(to_database_error)?;
        rows.iter().map(pg_row_to_step).collect()
    }

    async fn set_status(&self, id: StepExecutionId, status: StepStatus, error_message: Option<String>) -> Result<StepExecution, RepositoryError> {
        let row = sqlx::query(&format!(
            "UPDATE step_executions SET status = $2, error_message = $3,
             started_at = CASE WHEN $2 = 'running' AND started_at IS NULL THEN now() ELSE started_at END,
             completed_at = CASE WHEN $2 IN ('completed', 'failed', 'skipped') THEN now() ELSE completed_at END
             WHERE id = $1
             RETURNING {STEP_COLUMNS}"
        ))
        .bind(id.0)
        .bind(status.as_str())
        .bind(&error_message)
        .fetch_optional(&self.0)
        .await
        .map_err(to_database_error)?
        .ok_or(RepositoryError::NotFound)?;
        pg_row_to_step(&row)
    }

    async fn append_log(&self, id: StepExecutionId, chunk: &str) -> Result<String, RepositoryError> {
        let row = sqlx::query("UPDATE step_executions SET output_logs = output_logs || $2 WHERE id = $1 RETURNING output_logs")
            .bind(id.0)
            .bind(chunk)
            .fetch_optional(&self.0)
            .await
            .map_err(to_database_error)?
            .ok_or(RepositoryError::NotFound)?;
        row.try_get("output_logs").map_err(to_database_error)
    }

    async fn merge_duration(&self, id: StepExecutionId, duration_ms: i64) -> Result<StepExecution, RepositoryError> {
        let row = sqlx::query(&format!("UPDATE step_executions SET duration_ms = $2 WHERE id = $1 RETURNING {STEP_COLUMNS}"))
            .bind(id.0)
            .bind(duration_ms)
            .fetch_optional(&self.0)
            .await
            .map_err(to_database_error)?
            .ok_or(RepositoryError::NotFound)?;
        pg_row_to_step(&row)
    }
}

pub struct SqliteStepExecutionRepository(SqlitePool);

impl SqliteStepExecutionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self(pool)
    }
}

fn sqlite_row_to_step(row: &sqlx::sqlite::SqliteRow) -> Result<StepExecution, RepositoryError> {
    let status: String = row.try_get("status").map_err(to_database_error)?;
    let config: String = row.try_get("config").map_err(to_database_error)?;
    Ok(StepExecution {
        id: StepExecutionId(row.try_get("id").map_err(to_database_error)?),
        execution_id: WorkflowExecutionId(row.try_get("execution_id").map_err(to_database_error)?),
        step_number: row.try_get("step_number").map_err(to_database_error)?,
        step_name: row.try_get("step_name").map_err(to_database_error)?,
        step_type: row.try_get("step_type").map_err(to_database_error)?,
        status: status_from_str(&status),
        started_at: row.try_get("started_at").map_err(to_database_error)?,
        completed_at: row.try_get("completed_at").map_err(to_database_error)?,
        duration_ms: row.try_get("duration_ms").map_err(to_database_error)?,
        error_message: row.try_get("error_message").map_err(to_database_error)?,
        config: serde_json::from_str(&config).map_err(to_database_error)?,
        output_logs: row.try_get("output_logs").map_err(to_database_error)?,
    })
}

#[async_trait]
impl StepExecutionRepository for SqliteStepExecutionRepository {
    async fn insert(&self, step: NewStepExecution) -> Result<StepExecution, RepositoryError> {
        let config = serde_json::to_string(&step.config).map_err(to_database_error)?;
        let id = sqlx::query("INSERT INTO step_executions (execution_id, step_number, step_name, step_type, config) VALUES (?1, ?2, ?3, ?4, ?5)")
            .bind(step.execution_id.0)
            .bind(step.step_number)
            .bind(&step.step_name)
            .bind(&step.step_type)
            .bind(&config)
            .execute(&self.0)
            .await
            .map_err(to_database_error)?
            .last_insert_rowid();
        let row = sqlx::query(&format!("SELECT {STEP_COLUMNS} FROM step_executions WHERE id = ?1")).bind(id).fetch_one(&self.0).await.map_err(to_database_error)?;
        sqlite_row_to_step(&row)
    }

    async fn list_for_execution(&self, execution_id: WorkflowExecutionId) -> Result<Vec<StepExecution>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {STEP_COLUMNS} FROM step_executions WHERE execution_id = ?1 ORDER BY step_number"))
            .bind(execution_id.0)
            .fetch_all(&self.0)
            .await
            .map_err(to_database_error)?;
        rows.iter().map(sqlite_row_to_step).collect()
    }

    async fn set_status(&self, id: StepExecutionId, status: StepStatus, error_message: Option<String>) -> Result<StepExecution, RepositoryError> {
        let touches_start = status == StepStatus::Running;
        let is_terminal = matches!(status, StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped);
        sqlx::query(
            "UPDATE step_executions SET status = ?2, error_message = ?3,
             started_at = CASE WHEN ?4 AND started_at IS NULL THEN strftime('%Y-%m-%dT%H:%M:%fZ', 'now') ELSE started_at END,
             completed_at = CASE WHEN ?5 THEN strftime('%Y-%m-%dT%H:%M:%fZ', 'now') ELSE completed_at END
             WHERE id = ?1",
        )
        .bind(id.0)
        .bind(status.as_str())
        .bind(&error_message)
        .bind(touches_start)
        .bind(is_terminal)
        .execute(&self.0)
        .await
        .map_err(to_database_error)?;
        let row = sqlx::query(&format!("SELECT {STEP_COLUMNS} FROM step_executions WHERE id = ?1")).bind(id.0).fetch_optional(&self.0).await.map_err(to_database_error)?.ok_or(RepositoryError::NotFound)?;
        sqlite_row_to_step(&row)
    }

    async fn append_log(&self, id: StepExecutionId, chunk: &str) -> Result<String, RepositoryError> {
        sqlx::query("UPDATE step_executions SET output_logs = output_logs || ?2 WHERE id = ?1").bind(id.0).bind(chunk).execute(&self.0).await.map_err(to_database_error)?;
        let row = sqlx::query("SELECT output_logs FROM step_executions WHERE id = ?1").bind(id.0).fetch_optional(&self.0).await.map_err(to_database_error)?.ok_or(RepositoryError::NotFound)?;
        row.try_get("output_logs").map_err(to_database_error)
    }

    async fn merge_duration(&self, id: StepExecutionId, duration_ms: i64) -> Result<StepExecution, RepositoryError> {
        sqlx::query("UPDATE step_executions SET duration_ms = ?2 WHERE id = ?1").bind(id.0).bind(duration_ms).execute(&self.0).await.map_err(to_database_error)?;
        let row = sqlx::query(&format!("SELECT {STEP_COLUMNS} FROM step_executions WHERE id = ?1")).bind(id.0).fetch_optional(&self.0).await.map_err(to_database_error)?.ok_or(RepositoryError::NotFound)?;
        sqlite_row_to_step(&row)
    }
}
