// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Resource repository, Postgres and SQLite backends.
//!
//! `claim_pending` is the one method with materially different SQL between
//! backends: Postgres uses `FOR UPDATE SKIP LOCKED` so multiple orchestrator
//! instances can claim disjoint batches concurrently (spec.md §4.7);
//! SQLite is single-writer, so a plain transaction already serializes
//! claimants and no locking clause is needed (or available).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, SqlitePool};

use crate::domain::execution::WorkflowExecutionId;
use crate::domain::repository::{RepositoryError, ResourceRepository};
use crate::domain::resource::{
    DesiredOperation, ExternalState, HealthCheckRecord, HealthStatus, NewHealthCheckRecord, NewResource, Resource, ResourceId, ResourceState,
    ResourceTypeClass, StateTransitionRecord,
};
use crate::domain::spec::SpecId;

fn to_database_error<E: std::fmt::Display>(e: E) -> RepositoryError {
    RepositoryError::Database(e.to_string())
}

fn health_from_str(s: &str) -> HealthStatus {
    match s {
        "healthy" => HealthStatus::Healthy,
        "degraded" => HealthStatus::Degraded,
        "unhealthy" => HealthStatus::Unhealthy,
        _ => HealthStatus::Unknown,
    }
}

fn health_as_str(h: HealthStatus) -> &'static str {
    match h {
        HealthStatus::Healthy => "healthy",
        HealthStatus::Degraded => "degraded",
        HealthStatus::Unhealthy => "unhealthy",
        HealthStatus::Unknown => "unknown",
    }
}

fn type_class_from_str(s: &str) -> ResourceTypeClass {
    match s {
        "delegated" => ResourceTypeClass::Delegated,
        "external" => ResourceTypeClass::External,
        _ => ResourceTypeClass::Native,
    }
}

fn type_class_as_str(c: ResourceTypeClass) -> &'static str {
    match c {
        ResourceTypeClass::Native => "native",
        ResourceTypeClass::Delegated => "delegated",
        ResourceTypeClass::External => "external",
    }
}

fn external_state_from_str(s: &str) -> Option<ExternalState> {
    Some(match s {
        "WaitingExternal" => ExternalState::WaitingExternal,
        "BuildingExternal" => ExternalState::BuildingExternal,
        "Healthy" => ExternalState::Healthy,
        "Error" => ExternalState::Error,
        "Unknown" => ExternalState::Unknown,
        _ => return None,
    })
}

fn external_state_as_str(s: ExternalState) -> &'static str {
    match s {
        ExternalState::WaitingExternal => "WaitingExternal",
        ExternalState::BuildingExternal => "BuildingExternal",
        ExternalState::Healthy => "Healthy",
        ExternalState::Error => "Error",
        ExternalState::Unknown => "Unknown",
    }
}

fn desired_op_from_str(s: &str) -> Option<DesiredOperation> {
    Some(match s {
        "create" => DesiredOperation::Create,
        "read" => DesiredOperation::Read,
        "update" => DesiredOperation::Update,
        "delete" => DesiredOperation::Delete,
        _ => return None,
    })
}

fn desired_op_as_str(op: DesiredOperation) -> &'static str {
    match op {
        DesiredOperation::Create => "create",
        DesiredOperation::Read => "read",
        DesiredOperation::Update => "update",
        DesiredOperation::Delete => "delete",
    }
}

const RESOURCE_COLUMNS: &str = "id, spec_id, app_name, resource_name, resource_type, state, health, properties, provider, \
     provider_metadata, type_class, external_state, reference_url, last_sync, desired_operation, workflow_override, \
     workflow_tags, workflow_execution_id, error_message, created_at, updated_at, last_health_check_at";

pub struct PgResourceRepository(PgPool);

impl PgResourceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self(pool)
    }
}

fn pg_row_to_resource(row: &sqlx::postgres::PgRow) -> Result<Resource, RepositoryError> {
    let state: String = row.try_get("state").map_err(to_database_error)?;
    let health: String = row.try_get("health").map_err(to_database_error)?;
    let type_class: String = row.try_get("type_class").map_err(to_database_error)?;
    let external_state: Option<String> = row.try_get("external_state").map_err(to_database_error)?;
    let desired_operation: Option<String> = row.try_get("desired_operation").map_err(to_database_error)?;
    let workflow_tags: serde_json::Value = row.try_get("workflow_tags").map_err(to_database_error)?;
    let workflow_execution_id: Option<i64> = row.try_get("workflow_execution_id").map_err(to_database_error)?;

    Ok(Resource {
        id: ResourceId(row.try_get("id").map_err(to_database_error)?),
        spec_id: SpecId(row.try_get("spec_id").map_err(to_database_error)?),
        app_name: row.try_get("app_name").map_err(to_database_error)?,
        resource_name: row.try_get("resource_name").map_err(to_database_error)?,
        resource_type: row.try_get("resource_type").map_err(to_database_error)?,
        state: ResourceState::parse(&state).ok_or_else(|| RepositoryError::Database(format!("unknown state '{state}'")))?,
        health: health_from_str(&health),
        properties: row.try_get("properties").map_err(to_database_error)?,
        provider: row.try_get("provider").map_err(to_database_error)?,
        provider_metadata: row.try_get("provider_metadata").map_err(to_database_error)?,
        type_class: type_class_from_str(&type_class),
        external_state: external_state.as_deref().and_then(external_state_from_str),
        reference_url: row.try_get("reference_url").map_err(to_database_error)?,
        last_sync: row.try_get("last_sync").map_err(to_database_error)?,
        desired_operation: desired_operation.as_deref().and_then(desired_op_from_str),
        workflow_override: row.try_get("workflow_override").map_err(to_database_error)?,
        workflow_tags: serde_json::from_value(workflow_tags).map_err(to_database_error)?,
        workflow_execution_id: workflow_execution_id.map(WorkflowExecutionId),
        error_message: row.try_get("error_message").map_err(to_database_error)?,
        created_at: row.try_get("created_at").map_err(to_database_error)?,
        updated_at: row.try_get("updated_at").map_err(to_database_error)?,
        last_health_check_at: row.try_get("last_health_check_at").map_err(to_database_error)?,
    })
}

fn pg_row_to_health_check(row: &sqlx::postgres::PgRow) -> Result<HealthCheckRecord, RepositoryError> {
    let status: String = row.try_get("status").map_err(to_database_error)?;
    Ok(HealthCheckRecord {
        id: row.try_get("id").map_err(to_database_error)?,
        resource_id: ResourceId(row.try_get("resource_id").map_err(to_database_error)?),
        check_type: row.try_get("check_type").map_err(to_database_error)?,
        status: health_from_str(&status),
        latency_ms: row.try_get("latency_ms").map_err(to_database_error)?,
        error: row.try_get("error").map_err(to_database_error)?,
        metrics: row.try_get("metrics").map_err(to_database_error)?,
        timestamp: row.try_get("timestamp").map_err(to_database_error)?,
    })
}

fn pg_row_to_transition(row: &sqlx::postgres::PgRow) -> Result<StateTransitionRecord, RepositoryError> {
    let from_state: Option<String> = row.try_get("from_state").map_err(to_database_error)?;
    let to_state: String = row.try_get("to_state").map_err(to_database_error)?;
    Ok(StateTransitionRecord {
        id: row.try_get("id").map_err(to_database_error)?,
        resource_id: ResourceId(row.try_get("resource_id").map_err(to_database_error)?),
        from_state: from_state.as_deref().and_then(ResourceState::parse),
        to_state: ResourceState::parse(&to_state).ok_or_else(|| RepositoryError::Database(format!("unknown state '{to_state}'")))?,
        reason: row.try_get("reason").map_err(to_database_error)?,
        actor: row.try_get("actor").map_err(to_database_error)?,
        timestamp: row.try_get("timestamp").map_err(to_database_error)?,
        metadata: row.try_get("metadata").map_err(to_database_error)?,
    })
}

#[async_trait]
impl ResourceRepository for PgResourceRepository {
    async fn insert(&self, resource: NewResource) -> Result<Resource, RepositoryError> {
        let tags = serde_json::to_value(&resource.workflow_tags).map_err(to_database_error)?;
        let row = sqlx::query(&format!(
            "INSERT INTO resources (spec_id, app_name, resource_name, resource_type, properties, type_class, reference_url, workflow_override, workflow_tags)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {RESOURCE_COLUMNS}"
        ))
        .bind(resource.spec_id.0)
        .bind(&resource.app_name)
        .bind(&resource.resource_name)
        .bind(&resource.resource_type)
        .bind(&resource.properties)
        .bind(type_class_as_str(resource.type_class))
        .bind(&resource.reference_url)
        .bind(&resource.workflow_override)
        .bind(&tags)
        .fetch_one(&self.0)
        .await
        .map_err(to_database_error)?;
        pg_row_to_resource(&row)
    }

    async fn find_by_id(&self, id: ResourceId) -> Result<Option<Resource>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = $1")).bind(id.0).fetch_optional(&self.0).await.map_err(to_database_error)?;
        row.as_ref().map(pg_row_to_resource).transpose()
    }

    async fn find_by_app_and_name(&self, app_name: &str, resource_name: &str) -> Result<Option<Resource>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE app_name = $1 AND resource_name = $2"))
            .bind(app_name)
            .bind(resource_name)
            .fetch_optional(&self.0)
            .await
            .map_err(to_database_error)?;
        row.as_ref().map(pg_row_to_resource).transpose()
    }

    async fn list_by_app(&self, app_name: &str) -> Result<Vec<Resource>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE app_name = $1 ORDER BY created_at"))
            .bind(app_name)
            .fetch_all(&self.0)
            .await
            .map_err(to_database_error)?;
        rows.iter().map(pg_row_to_resource).collect()
    }

    async fn list_by_spec(&self, spec_id: SpecId) -> Result<Vec<Resource>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE spec_id = $1 ORDER BY created_at"))
            .bind(spec_id.0)
            .fetch_all(&self.0)
            .await
            .map_err(to_database_error)?;
        rows.iter().map(pg_row_to_resource).collect()
    }

    async fn claim_pending(&self, batch_size: i64) -> Result<Vec<Resource>, RepositoryError> {
        let mut tx = self.0.begin().await.map_err(to_database_error)?;
        let rows = sqlx::query(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources
             WHERE state = 'requested' AND workflow_execution_id IS NULL
             ORDER BY created_at ASC
             LIMIT $1
             FOR UPDATE SKIP LOCKED"
        ))
        .bind(batch_size)
        .fetch_all(&mut *tx)
        .await
        .map_err(to_database_error)?;

        let resources: Result<Vec<Resource>, RepositoryError> = rows.iter().map(pg_row_to_resource).collect();
        let resources = resources?;

        for resource in &resources {
            sqlx::query("UPDATE resources SET state = 'provisioning', updated_at = now() WHERE id = $1")
                .bind(resource.id.0)
                .execute(&mut *tx)
                .await
                .map_err(to_database_error)?;
        }
        tx.commit().await.map_err(to_database_error)?;

        Ok(resources.into_iter().map(|r| Resource { state: ResourceState::Provisioning, ..r }).collect())
    }

    async fn transition_state(
        &self,
        id: ResourceId,
        to: ResourceState,
        reason: Option<String>,
        actor: &str,
        provider: Option<&str>,
        workflow_execution_id: Option<WorkflowExecutionId>,
        error_message: Option<String>,
    ) -> Result<(Resource, StateTransitionRecord), RepositoryError> {
        let mut tx = self.0.begin().await.map_err(to_database_error)?;
        let current = sqlx::query(&format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = $1 FOR UPDATE"))
            .bind(id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(to_database_error)?
            .ok_or(RepositoryError::NotFound)?;
        let current = pg_row_to_resource(&current)?;

        if !current.state.can_transition_to(to) {
            return Err(RepositoryError::InvalidTransition { from: current.state, to });
        }

        let updated = sqlx::query(&format!(
            "UPDATE resources SET state = $2, provider = COALESCE($3, provider), workflow_execution_id = $4, error_message = $5, updated_at = now() WHERE id = $1
             RETURNING {RESOURCE_COLUMNS}"
        ))
        .bind(id.0)
        .bind(to.as_str())
        .bind(provider)
        .bind(workflow_execution_id.map(|w| w.0))
        .bind(&error_message)
        .fetch_one(&mut *tx)
        .await
        .map_err(to_database_error)?;
        let updated = pg_row_to_resource(&updated)?;

        let transition = sqlx::query(
            "INSERT INTO resource_state_transitions (resource_id, from_state, to_state, reason, actor)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, resource_id, from_state, to_state, reason, actor, timestamp, metadata",
        )
        .bind(id.0)
        .bind(current.state.as_str())
        .bind(to.as_str())
        .bind(&reason)
        .bind(actor)
        .fetch_one(&mut *tx)
        .await
        .map_err(to_database_error)?;
        let transition = pg_row_to_transition(&transition)?;

        tx.commit().await.map_err(to_database_error)?;
        Ok((updated, transition))
    }

    async fn list_transitions(&self, id: ResourceId) -> Result<Vec<StateTransitionRecord>, RepositoryError> {
        let rows = sqlx::query("SELECT id, resource_id, from_state, to_state, reason, actor, timestamp, metadata FROM resource_state_transitions WHERE resource_id = $1 ORDER BY timestamp")
            .bind(id.0)
            .fetch_all(&self.0)
            .await
            .map_err(to_database_error)?;
        rows.iter().map(pg_row_to_transition).collect()
    }

    async fn delete(&self, id: ResourceId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM resources WHERE id = $1").bind(id.0).execute(&self.0).await.map_err(to_database_error)?;
        Ok(())
    }

    async fn record_health_check(&self, check: NewHealthCheckRecord) -> Result<HealthCheckRecord, RepositoryError> {
        let mut tx = self.0.begin().await.map_err(to_database_error)?;
        let row = sqlx::query(
            "INSERT INTO resource_health_checks (resource_id, check_type, status, latency_ms, error, metrics)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, resource_id, check_type, status, latency_ms, error, metrics, timestamp",
        )
        .bind(check.resource_id.0)
        .bind(&check.check_type)
        .bind(health_as_str(check.status))
        .bind(check.latency_ms)
        .bind(&check.error)
        .bind(&check.metrics)
        .fetch_one(&mut *tx)
        .await
        .map_err(to_database_error)?;
        let record = pg_row_to_health_check(&row)?;

        sqlx::query("UPDATE resources SET health = $2, last_health_check_at = now(), updated_at = now() WHERE id = $1")
            .bind(check.resource_id.0)
            .bind(health_as_str(check.status))
            .execute(&mut *tx)
            .await
            .map_err(to_database_error)?;

        tx.commit().await.map_err(to_database_error)?;
        Ok(record)
    }

    async fn list_health_checks(&self, id: ResourceId, limit: i64) -> Result<Vec<HealthCheckRecord>, RepositoryError> {
        let rows = sqlx::query("SELECT id, resource_id, check_type, status, latency_ms, error, metrics, timestamp FROM resource_health_checks WHERE resource_id = $1 ORDER BY timestamp DESC LIMIT $2")
            .bind(id.0)
            .bind(limit)
            .fetch_all(&self.0)
            .await
            .map_err(to_database_error)?;
        rows.iter().map(pg_row_to_health_check).collect()
    }
}

pub struct SqliteResourceRepository(SqlitePool);

impl SqliteResourceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self(pool)
    }
}

fn sqlite_row_to_resource(row: &sqlx::sqlite::SqliteRow) -> Result<Resource, RepositoryError> {
    let state: String = row.try_get("state").map_err(to_database_error)?;
    let health: String = row.try_get("health").map_err(to_database_error)?;
    let type_class: String = row.try_get("type_class").map_err(to_database_error)?;
    let external_state: Option<String> = row.try_get("external_state").map_err(to_database_error)?;
    let desired_operation: Option<String> = row.try_get("desired_operation").map_err(to_database_error)?;
    let properties: String = row.try_get("properties").map_err(to_database_error)?;
    let provider_metadata: Option<String> = row.try_get("provider_metadata").map_err(to_database_error)?;
    let workflow_tags: String = row.try_get("workflow_tags").map_err(to_database_error)?;
    let workflow_execution_id: Option<i64> = row.try_get("workflow_execution_id").map_err(to_database_error)?;
    let last_sync: Option<DateTime<Utc>> = row.try_get("last_sync").map_err(to_database_error)?;
    let last_health_check_at: Option<DateTime<Utc>> = row.try_get("last_health_check_at").map_err(to_database_error)?;

    Ok(Resource {
        id: ResourceId(row.try_get("id").map_err(to_database_error)?),
        spec_id: SpecId(row.try_get("spec_id").map_err(to_database_error)?),
        app_name: row.try_get("app_name").map_err(to_database_error)?,
        resource_name: row.try_get("resource_name").map_err(to_database_error)?,
        resource_type: row.try_get("resource_type").map_err(to_database_error)?,
        state: ResourceState::parse(&state).ok_or_else(|| RepositoryError::Database(format!("unknown state '{state}'")))?,
        health: health_from_str(&health),
        properties: serde_json::from_str(&properties).map_err(to_database_error)?,
        provider: row.try_get("provider").map_err(to_database_error)?,
        provider_metadata: provider_metadata.map(|s| serde_json::from_str(&s)).transpose().map_err(to_database_error)?,
        type_class: type_class_from_str(&type_class),
        external_state: external_state.as_deref().and_then(external_state_from_str),
        reference_url: row.try_get("reference_url").map_err(to_database_error)?,
        last_sync,
        desired_operation: desired_operation.as_deref().and_then(desired_op_from_str),
        workflow_override: row.try_get("workflow_override").map_err(to_database_error)?,
        workflow_tags: serde_json::from_str(&workflow_tags).map_err(to_database_error)?,
        workflow_execution_id: workflow_execution_id.map(WorkflowExecutionId),
        error_message: row.try_get("error_message").map_err(to_database_error)?,
        created_at: row.try_get("created_at").map_err(to_database_error)?,
        updated_at: row.try_get("updated_at").map_err(to_database_error)?,
        last_health_check_at,
    })
}

fn sqlite_row_to_health_check(row: &sqlx::sqlite::SqliteRow) -> Result<HealthCheckRecord, RepositoryError> {
    let status: String = row.try_get("status").map_err(to_database_error)?;
    let metrics: Option<String> = row.try_get("metrics").map_err(to_database_error)?;
    Ok(HealthCheckRecord {
        id: row.try_get("id").map_err(to_database_error)?,
        resource_id: ResourceId(row.try_get("resource_id").map_err(to_database_error)?),
        check_type: row.try_get("check_type").map_err(to_database_error)?,
        status: health_from_str(&status),
        latency_ms: row.try_get("latency_ms").map_err(to_database_error)?,
        error: row.try_get("error").map_err(to_database_error)?,
        metrics: metrics.map(|s| serde_json::from_str(&s)).transpose().map_err(to_database_error)?,
        timestamp: row.try_get("timestamp").map_err(to_database_error)?,
    })
}

fn sqlite_row_to_transition(row: &sqlx::sqlite::SqliteRow) -> Result<StateTransitionRecord, RepositoryError> {
    let from_state: Option<String> = row.try_get("from_state").map_err(to_database_error)?;
    let to_state: String = row.try_get("to_state").map_err(to_database_error)?;
    let metadata: Option<String> = row.try_get("metadata").map_err(to_database_error)?;
    Ok(StateTransitionRecord {
        id: row.try_get("id").map_err(to_database_error)?,
        resource_id: ResourceId(row.try_get("resource_id").map_err(to_database_error)?),
        from_state: from_state.as_deref().and_then(ResourceState::parse),
        to_state: ResourceState::parse(&to_state).ok_or_else(|| RepositoryError::Database(format!("unknown state '{to_state}'")))?,
        reason: row.try_get("reason").map_err(to_database_error)?,
        actor: row.try_get("actor").map_err(to_database_error)?,
        timestamp: row.try_get("timestamp").map_err(to_database_error)?,
        metadata: metadata.map(|s| serde_json::from_str(&s)).transpose().map_err(to_database_error)?,
    })
}

#[async_trait]
impl ResourceRepository for SqliteResourceRepository {
    async fn insert(&self, resource: NewResource) -> Result<Resource, RepositoryError> {
        let properties = serde_json::to_string(&resource.properties).map_err(to_database_error)?;
        let tags = serde_json::to_string(&resource.workflow_tags).map_err(to_database_error)?;
        let inserted = sqlx::query(
            "INSERT INTO resources (spec_id, app_name, resource_name, resource_type, properties, type_class, reference_url, workflow_override, workflow_tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(resource.spec_id.0)
        .bind(&resource.app_name)
        .bind(&resource.resource_name)
        .bind(&resource.resource_type)
        .bind(&properties)
        .bind(type_class_as_str(resource.type_class))
        .bind(&resource.reference_url)
        .bind(&resource.workflow_override)
        .bind(&tags)
        .execute(&self.0)
        .await
        .map_err(to_database_error)?;
        self.find_by_id(ResourceId(inserted.last_insert_rowid()))
            .await?
            .ok_or_else(|| RepositoryError::Database("insert did not produce a row".to_string()))
    }

    async fn find_by_id(&self, id: ResourceId) -> Result<Option<Resource>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = ?1")).bind(id.0).fetch_optional(&self.0).await.map_err(to_database_error)?;
        row.as_ref().map(sqlite_row_to_resource).transpose()
    }

    async fn find_by_app_and_name(&self, app_name: &str, resource_name: &str) -> Result<Option<Resource>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE app_name = ?1 AND resource_name = ?2"))
            .bind(app_name)
            .bind(resource_name)
            .fetch_optional(&self.0)
            .await
            .map_err(to_database_error)?;
        row.as_ref().map(sqlite_row_to_resource).transpose()
    }

    async fn list_by_app(&self, app_name: &str) -> Result<Vec<Resource>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE app_name = ?1 ORDER BY created_at"))
            .bind(app_name)
            .fetch_all(&self.0)
            .await
            .map_err(to_database_error)?;
        rows.iter().map(sqlite_row_to_resource).collect()
    }

    async fn list_by_spec(&self, spec_id: SpecId) -> Result<Vec<Resource>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE spec_id = ?1 ORDER BY created_at"))
            .bind(spec_id.0)
            .fetch_all(&self.0)
            .await
            .map_err(to_database_error)?;
        rows.iter().map(sqlite_row_to_resource).collect()
    }

    async fn claim_pending(&self, batch_size: i64) -> Result<Vec<Resource>, RepositoryError> {
        // SQLite has a single writer connection in this pool, so the
        // transaction alone serializes claimants; no row-locking clause
        // exists or is needed.
        let mut tx = self.0.begin().await.map_err(to_database_error)?;
        let rows = sqlx::query(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources
             WHERE state = 'requested' AND workflow_execution_id IS NULL
             ORDER BY created_at ASC
             LIMIT ?1"
        ))
        .bind(batch_size)
        .fetch_all(&mut *tx)
        .await
        .map_err(to_database_error)?;

        let resources: Result<Vec<Resource>, RepositoryError> = rows.iter().map(sqlite_row_to_resource).collect();
        let resources = resources?;

        for resource in &resources {
            sqlx::query("UPDATE resources SET state = 'provisioning', updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?1")
                .bind(resource.id.0)
                .execute(&mut *tx)
                .await
                .map_err(to_database_error)?;
        }
        tx.commit().await.map_err(to_database_error)?;

        Ok(resources.into_iter().map(|r| Resource { state: ResourceState::Provisioning, ..r }).collect())
    }

    async fn transition_state(
        &self,
        id: ResourceId,
        to: ResourceState,
        reason: Option<String>,
        actor: &str,
        provider: Option<&str>,
        workflow_execution_id: Option<WorkflowExecutionId>,
        error_message: Option<String>,
    ) -> Result<(Resource, StateTransitionRecord), RepositoryError> {
        let mut tx = self.0.begin().await.map_err(to_database_error)?;
        let current = sqlx::query(&format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = ?1")).bind(id.0).fetch_optional(&mut *tx).await.map_err(to_database_error)?.ok_or(RepositoryError::NotFound)?;
        let current = sqlite_row_to_resource(&current)?;

        if !current.state.can_transition_to(to) {
            return Err(RepositoryError::InvalidTransition { from: current.state, to });
        }

        sqlx::query("UPDATE resources SET state = ?2, provider = COALESCE(?3, provider), workflow_execution_id = ?4, error_message = ?5, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?1")
            .bind(id.0)
            .bind(to.as_str())
            .bind(provider)
            .bind(workflow_execution_id.map(|w| w.0))
            .bind(&error_message)
            .execute(&mut *tx)
            .await
            .map_err(to_database_error)?;

        let transition_id = sqlx::query("INSERT INTO resource_state_transitions (resource_id, from_state, to_state, reason, actor) VALUES (?1, ?2, ?3, ?4, ?5)")
            .bind(id.0)
            .bind(current.state.as_str())
            .bind(to.as_str())
            .bind(&reason)
            .bind(actor)
            .execute(&mut *tx)
            .await
            .map_err(to_database_error)?
            .last_insert_rowid();

        let updated_row = sqlx::query(&format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = ?1")).bind(id.0).fetch_one(&mut *tx).await.map_err(to_database_error)?;
        let updated = sqlite_row_to_resource(&updated_row)?;
        let transition_row = sqlx::query("SELECT id, resource_id, from_state, to_state, reason, actor, timestamp, metadata FROM resource_state_transitions WHERE id = ?1")
            .bind(transition_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(to_database_error)?;
        let transition = sqlite_row_to_transition(&transition_row)?;

        tx.commit().await.map_err(to_database_error)?;
        Ok((updated, transition))
    }

    async fn list_transitions(&self, id: ResourceId) -> Result<Vec<StateTransitionRecord>, RepositoryError> {
        let rows = sqlx::query("SELECT id, resource_id, from_state, to_state, reason, actor, timestamp, metadata FROM resource_state_transitions WHERE resource_id = ?1 ORDER BY timestamp")
            .bind(id.0)
            .fetch_all(&self.0)
            .await
            .map_err(to_database_error)?;
        rows.iter().map(sqlite_row_to_transition).collect()
    }

    async fn delete(&self, id: ResourceId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM resources WHERE id = ?1").bind(id.0).execute(&self.0).await.map_err(to_database_error)?;
        Ok(())
    }

    async fn record_health_check(&self, check: NewHealthCheckRecord) -> Result<HealthCheckRecord, RepositoryError> {
        let metrics = check.metrics.as_ref().map(serde_json::to_string).transpose().map_err(to_database_error)?;
        let mut tx = self.0.begin().await.map_err(to_database_error)?;
        let check_id = sqlx::query("INSERT INTO resource_health_checks (resource_id, check_type, status, latency_ms, error, metrics) VALUES (?1, ?2, ?3, ?4, ?5, ?6)")
            .bind(check.resource_id.0)
            .bind(&check.check_type)
            .bind(health_as_str(check.status))
            .bind(check.latency_ms)
            .bind(&check.error)
            .bind(&metrics)
            .execute(&mut *tx)
            .await
            .map_err(to_database_error)?
            .last_insert_rowid();

        sqlx::query("UPDATE resources SET health = ?2, last_health_check_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?1")
            .bind(check.resource_id.0)
            .bind(health_as_str(check.status))
            .execute(&mut *tx)
            .await
            .map_err(to_database_error)?;

        let row = sqlx::query("SELECT id, resource_id, check_type, status, latency_ms, error, metrics, timestamp FROM resource_health_checks WHERE id = ?1")
            .bind(check_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(to_database_error)?;
        let record = sqlite_row_to_health_check(&row)?;

        tx.commit().await.map_err(to_database_error)?;
        Ok(record)
    }

    async fn list_health_checks(&self, id: ResourceId, limit: i64) -> Result<Vec<HealthCheckRecord>, RepositoryError> {
        let rows = sqlx::query("SELECT id, resource_id, check_type, status, latency_ms, error, metrics, timestamp FROM resource_health_checks WHERE resource_id = ?1 ORDER BY timestamp DESC LIMIT ?2")
            .bind(id.0)
            .bind(limit)
            .fetch_all(&self.0)
            .await
            .map_err(to_database_error)?;
        rows.iter().map(sqlite_row_to_health_check).collect()
    }
}
