// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Spec repository, Postgres and SQLite backends.

use async_trait::async_trait;
use sqlx::{PgPool, Row, SqlitePool};

use crate::domain::repository::{RepositoryError, SpecRepository};
use crate::domain::spec::{NewSpec, ScoreDocument, Spec, SpecId};

fn to_database_error<E: std::fmt::Display>(e: E) -> RepositoryError {
    RepositoryError::Database(e.to_string())
}

fn decode_document(raw: &str) -> Result<ScoreDocument, RepositoryError> {
    serde_json::from_str(raw).map_err(to_database_error)
}

pub struct PgSpecRepository(PgPool);

impl PgSpecRepository {
    pub fn new(pool: PgPool) -> Self {
        Self(pool)
    }
}

fn pg_row_to_spec(row: &sqlx::postgres::PgRow) -> Result<Spec, RepositoryError> {
    let document: serde_json::Value = row.try_get("document").map_err(to_database_error)?;
    Ok(Spec {
        id: SpecId(row.try_get("id").map_err(to_database_error)?),
        name: row.try_get("name").map_err(to_database_error)?,
        document: serde_json::from_value(document).map_err(to_database_error)?,
        team: row.try_get("team").map_err(to_database_error)?,
        submitted_by: row.try_get("submitted_by").map_err(to_database_error)?,
        created_at: row.try_get("created_at").map_err(to_database_error)?,
        updated_at: row.try_get("updated_at").map_err(to_database_error)?,
    })
}

#[async_trait]
impl SpecRepository for PgSpecRepository {
    async fn upsert(&self, spec: NewSpec) -> Result<Spec, RepositoryError> {
        let document = serde_json::to_value(&spec.document).map_err(to_database_error)?;
        let row = sqlx::query(
            r#"
            INSERT INTO specs (name, document, team, submitted_by)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO UPDATE SET
                document = EXCLUDED.document,
                team = EXCLUDED.team,
                submitted_by = EXCLUDED.submitted_by,
                updated_at = now()
            RETURNING id, name, document, team, submitted_by, created_at, updated_at
            "#,
        )
        .bind(&spec.name)
        .bind(&document)
        .bind(&spec.team)
        .bind(&spec.submitted_by)
        .fetch_one(&self.0)
        .await
        .map_err(to_database_error)?;
        pg_row_to_spec(&row)
    }

    async fn find_by_id(&self, id: SpecId) -> Result<Option<Spec>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, document, team, submitted_by, created_at, updated_at FROM specs WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.0)
            .await
            .map_err(to_database_error)?;
        row.as_ref().map(pg_row_to_spec).transpose()
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Spec>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, document, team, submitted_by, created_at, updated_at FROM specs WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.0)
            .await
            .map_err(to_database_error)?;
        row.as_ref().map(pg_row_to_spec).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Spec>, RepositoryError> {
        let rows = sqlx::query("SELECT id, name, document, team, submitted_by, created_at, updated_at FROM specs ORDER BY created_at DESC")
            .fetch_all(&self.0)
            .await
            .map_err(to_database_error)?;
        rows.iter().map(pg_row_to_spec).collect()
    }

    async fn delete(&self, id: SpecId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM specs WHERE id = $1").bind(id.0).execute(&self.0).await.map_err(to_database_error)?;
        Ok(())
    }
}

pub struct SqliteSpecRepository(SqlitePool);

impl SqliteSpecRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self(pool)
    }
}

fn sqlite_row_to_spec(row: &sqlx::sqlite::SqliteRow) -> Result<Spec, RepositoryError> {
    let document: String = row.try_get("document").map_err(to_database_error)?;
    Ok(Spec {
        id: SpecId(row.try_get("id").map_err(to_database_error)?),
        name: row.try_get("name").map_err(to_database_error)?,
        document: decode_document(&document)?,
        team: row.try_get("team").map_err(to_database_error)?,
        submitted_by: row.try_get("submitted_by").map_err(to_database_error)?,
        created_at: row.try_get("created_at").map_err(to_database_error)?,
        updated_at: row.try_get("updated_at").map_err(to_database_error)?,
    })
}

#[async_trait]
impl SpecRepository for SqliteSpecRepository {
    async fn upsert(&self, spec: NewSpec) -> Result<Spec, RepositoryError> {
        let document = serde_json::to_string(&spec.document).map_err(to_database_error)?;
        let existing = self.find_by_name(&spec.name).await?;
        if let Some(existing) = existing {
            sqlx::query("UPDATE specs SET document = ?1, team = ?2, submitted_by = ?3, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?4")
                .bind(&document)
                .bind(&spec.team)
                .bind(&spec.submitted_by)
                .bind(existing.id.0)
                .execute(&self.0)
                .await
                .map_err(to_database_error)?;
        } else {
            sqlx::query("INSERT INTO specs (name, document, team, submitted_by) VALUES (?1, ?2, ?3, ?4)")
                .bind(&spec.name)
                .bind(&document)
                .bind(&spec.team)
                .bind(&spec.submitted_by)
                .execute(&self.0)
                .await
                .map_err(to_database_error)?;
        }
        self.find_by_name(&spec.name).await?.ok_or_else(|| RepositoryError::Database("upsert did not produce a row".to_string()))
    }

    async fn find_by_id(&self, id: SpecId) -> Result<Option<Spec>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, document, team, submitted_by, created_at, updated_at FROM specs WHERE id = ?1")
            .bind(id.0)
            .fetch_optional(&self.0)
            .await
            .map_err(to_database_error)?;
        row.as_ref().map(sqlite_row_to_spec).transpose()
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Spec>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, document, team, submitted_by, created_at, updated_at FROM specs WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.0)
            .await
            .map_err(to_database_error)?;
        row.as_ref().map(sqlite_row_to_spec).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Spec>, RepositoryError> {
        let rows = sqlx::query("SELECT id, name, document, team, submitted_by, created_at, updated_at FROM specs ORDER BY created_at DESC")
            .fetch_all(&self.0)
            .await
            .map_err(to_database_error)?;
        rows.iter().map(sqlite_row_to_spec).collect()
    }

    async fn delete(&self, id: SpecId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM specs WHERE id = ?1").bind(id.0).execute(&self.0).await.map_err(to_database_error)?;
        Ok(())
    }
}
