// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Schema migrations (spec.md §6).
//!
//! Each backend has its own numbered SQL file set under `migrations/{postgres,sqlite}/`,
//! embedded at compile time. Applied versions are tracked in
//! `schema_migrations(version, applied_at)`; a file numbered lower than the
//! highest already-applied version is a startup-fatal error rather than a
//! silent skip — migrations are meant to be append-only.

use sqlx::{PgPool, Row, SqlitePool};

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("migration {version} is out of order: version {highest_applied} is already applied")]
    OutOfOrder { version: i64, highest_applied: i64 },
    #[error("migration {0} failed: {1}")]
    Apply(i64, String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const POSTGRES_MIGRATIONS: &[Migration] = &[Migration { version: 1, name: "0001_init", sql: include_str!("../../migrations/postgres/0001_init.sql") }];

const SQLITE_MIGRATIONS: &[Migration] = &[Migration { version: 1, name: "0001_init", sql: include_str!("../../migrations/sqlite/0001_init.sql") }];

pub async fn run_postgres(pool: &PgPool) -> Result<(), MigrationError> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_migrations (version BIGINT PRIMARY KEY, name TEXT NOT NULL, applied_at TIMESTAMPTZ NOT NULL DEFAULT now())")
        .execute(pool)
        .await?;

    let highest_applied: i64 = sqlx::query("SELECT COALESCE(MAX(version), 0) AS v FROM schema_migrations")
        .fetch_one(pool)
        .await?
        .try_get("v")?;

    for migration in POSTGRES_MIGRATIONS {
        if migration.version <= highest_applied {
            continue;
        }
        if migration.version != highest_applied + 1 {
            return Err(MigrationError::OutOfOrder { version: migration.version, highest_applied });
        }
        let mut tx = pool.begin().await?;
        // Migration bodies are unparameterized, multi-statement DDL; the
        // simple query protocol (raw_sql) runs them as-is instead of
        // requiring one prepared statement per `;`.
        sqlx::raw_sql(migration.sql).execute(&mut *tx).await.map_err(|e| MigrationError::Apply(migration.version, e.to_string()))?;
        sqlx::query("INSERT INTO schema_migrations (version, name) VALUES ($1, $2)")
            .bind(migration.version)
            .bind(migration.name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        tracing::info!(version = migration.version, name = migration.name, "applied postgres migration");
    }
    Ok(())
}

pub async fn run_sqlite(pool: &SqlitePool) -> Result<(), MigrationError> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_migrations (version INTEGER PRIMARY KEY, name TEXT NOT NULL, applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')))")
        .execute(pool)
        .await?;

    let highest_applied: i64 = sqlx::query("SELECT COALESCE(MAX(version), 0) AS v FROM schema_migrations")
        .fetch_one(pool)
        .await?
        .try_get("v")?;

    for migration in SQLITE_MIGRATIONS {
        if migration.version <= highest_applied {
            continue;
        }
        if migration.version != highest_applied + 1 {
            return Err(MigrationError::OutOfOrder { version: migration.version, highest_applied });
        }
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(migration.sql).execute(&mut *tx).await.map_err(|e| MigrationError::Apply(migration.version, e.to_string()))?;
        sqlx::query("INSERT INTO schema_migrations (version, name) VALUES ($1, $2)")
            .bind(migration.version)
            .bind(migration.name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        tracing::info!(version = migration.version, name = migration.name, "applied sqlite migration");
    }
    Ok(())
}
