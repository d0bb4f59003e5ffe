// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Resource dependency repository, Postgres and SQLite backends.

use async_trait::async_trait;
use sqlx::{PgPool, Row, SqlitePool};

use crate::domain::dependency::{DependencyKind, NewResourceDependency, ResourceDependency, ResourceDependencyId};
use crate::domain::repository::{RepositoryError, ResourceDependencyRepository};
use crate::domain::resource::ResourceId;

fn to_database_error<E: std::fmt::Display>(e: E) -> RepositoryError {
    RepositoryError::Database(e.to_string())
}

fn kind_or_hard(s: &str) -> DependencyKind {
    DependencyKind::parse(s).unwrap_or(DependencyKind::Hard)
}

pub struct PgResourceDependencyRepository(PgPool);

impl PgResourceDependencyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self(pool)
    }
}

fn pg_row_to_dependency(row: &sqlx::postgres::PgRow) -> Result<ResourceDependency, RepositoryError> {
    let kind: String = row.try_get("kind").map_err(to_database_error)?;
    Ok(ResourceDependency {
        id: ResourceDependencyId(row.try_get("id").map_err(to_database_error)?),
        resource_id: ResourceId(row.try_get("resource_id").map_err(to_database_error)?),
        depends_on_id: ResourceId(row.try_get("depends_on_id").map_err(to_database_error)?),
        kind: kind_or_hard(&kind),
    })
}

#[async_trait]
impl ResourceDependencyRepository for PgResourceDependencyRepository {
    async fn insert(&self, dep: NewResourceDependency) -> Result<ResourceDependency, RepositoryError> {
        let row = sqlx::query(
            "INSERT INTO resource_dependencies (resource_id, depends_on_id, kind) VALUES ($1, $2, $3)
             ON CONFLICT (resource_id, depends_on_id) DO UPDATE SET kind = EXCLUDED.kind
             RETURNING id, resource_id, depends_on_id, kind",
        )
        .bind(dep.resource_id.0)
        .bind(dep.depends_on_id.0)
        .bind(dep.kind.as_str())
        .fetch_one(&self.0)
        .await
        .map_err(to_database_error)?;
        pg_row_to_dependency(&row)
    }

    async fn list_for_resource(&self, resource_id: ResourceId) -> Result<Vec<ResourceDependency>, RepositoryError> {
        let rows = sqlx::query("SELECT id, resource_id, depends_on_id, kind FROM resource_dependencies WHERE resource_id = $1")
            .bind(resource_id.0)
            .fetch_all(&self.0)
            .await
            .map_err(to_database_error)?;
        rows.iter().map(pg_row_to_dependency).collect()
    }

    async fn delete(&self, id: ResourceDependencyId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM resource_dependencies WHERE id = $1").bind(id.0).execute(&self.0).await.map_err(to_database_error)?;
        Ok(())
    }
}

pub struct SqliteResourceDependencyRepository(SqlitePool);

impl SqliteResourceDependencyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self(pool)
    }
}

fn sqlite_row_to_dependency(row: &sqlx::sqlite::SqliteRow) -> Result<ResourceDependency, RepositoryError> {
    let kind: String = row.try_get("kind").map_err(to_database_error)?;
    Ok(ResourceDependency {
        id: ResourceDependencyId(row.try_get("id").map_err(to_database_error)?),
        resource_id: ResourceId(row.try_get("resource_id").map_err(to_database_error)?),
        depends_on_id: ResourceId(row.try_get("depends_on_id").map_err(to_database_error)?),
        kind: kind_or_hard(&kind),
    })
}

#[async_trait]
impl ResourceDependencyRepository for SqliteResourceDependencyRepository {
    async fn insert(&self, dep: NewResourceDependency) -> Result<ResourceDependency, RepositoryError> {
        sqlx::query(
            "INSERT INTO resource_dependencies (resource_id, depends_on_id, kind) VALUES (?1, ?2, ?3)
             ON CONFLICT (resource_id, depends_on_id) DO UPDATE SET kind = excluded.kind",
        )
        .bind(dep.resource_id.0)
        .bind(dep.depends_on_id.0)
        .bind(dep.kind.as_str())
        .execute(&self.0)
        .await
        .map_err(to_database_error)?;

        let row = sqlx::query("SELECT id, resource_id, depends_on_id, kind FROM resource_dependencies WHERE resource_id = ?1 AND depends_on_id = ?2")
            .bind(dep.resource_id.0)
            .bind(dep.depends_on_id.0)
            .fetch_one(&self.0)
            .await
            .map_err(to_database_error)?;
        sqlite_row_to_dependency(&row)
    }

    async fn list_for_resource(&self, resource_id: ResourceId) -> Result<Vec<ResourceDependency>, RepositoryError> {
        let rows = sqlx::query("SELECT id, resource_id, depends_on_id, kind FROM resource_dependencies WHERE resource_id = ?1")
            .bind(resource_id.0)
            .fetch_all(&self.0)
            .await
            .map_err(to_database_error)?;
        rows.iter().map(sqlite_row_to_dependency).collect()
    }

    async fn delete(&self, id: ResourceDependencyId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM resource_dependencies WHERE id = ?1").bind(id.0).execute(&self.0).await.map_err(to_database_error)?;
        Ok(())
    }
}
