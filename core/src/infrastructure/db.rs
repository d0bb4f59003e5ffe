// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Connection pool setup (spec.md §4.1).
//!
//! The core runs against either PostgreSQL (production) or an embedded
//! SQLite file/`:memory:` database (single-node / test deployments),
//! selected by the `DB_DRIVER` environment variable. Everything above this
//! module depends only on the repository traits in `domain::repository`;
//! this is the one place that knows which backend is live.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{postgres::PgPoolOptions, PgPool, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

/// Production default: leaves headroom under typical `max_connections=100`
/// Postgres instances shared with other services (spec.md §4.1).
pub const DEFAULT_PG_MAX_CONNECTIONS: u32 = 25;

/// SQLite is single-writer; more than one pooled connection just serializes
/// behind the database lock, so the embedded backend is capped at one.
pub const EMBEDDED_MAX_CONNECTIONS: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("unsupported DB_DRIVER '{0}', expected 'postgres' or 'sqlite'")]
    UnsupportedDriver(String),
    #[error("database connection failed: {0}")]
    Connect(#[from] sqlx::Error),
}

/// The live connection pool, one of two backends. Repository structs hold
/// the variant they were built for directly (`Pg*Repository(PgPool)` /
/// `Sqlite*Repository(SqlitePool)`) — this enum exists only to make
/// startup backend selection a single call site.
#[derive(Clone)]
pub enum DbPool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl DbPool {
    /// Connects using `DB_DRIVER` (`postgres` default) and `DATABASE_URL`.
    pub async fn connect_from_env() -> Result<Self, DbError> {
        let driver = std::env::var("DB_DRIVER").unwrap_or_else(|_| "postgres".to_string());
        let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| match driver.as_str() {
            "sqlite" => "sqlite::memory:".to_string(),
            _ => "postgres://localhost/forgebase".to_string(),
        });
        Self::connect(&driver, &url).await
    }

    pub async fn connect(driver: &str, url: &str) -> Result<Self, DbError> {
        match driver {
            "postgres" | "postgresql" => {
                let pool = PgPoolOptions::new()
                    .max_connections(DEFAULT_PG_MAX_CONNECTIONS)
                    .acquire_timeout(Duration::from_secs(10))
                    .connect(url)
                    .await?;
                Ok(DbPool::Postgres(pool))
            }
            "sqlite" => {
                let options = SqliteConnectOptions::from_str(url)?.foreign_keys(true).create_if_missing(true);
                let pool = SqlitePoolOptions::new().max_connections(EMBEDDED_MAX_CONNECTIONS).connect_with(options).await?;
                Ok(DbPool::Sqlite(pool))
            }
            other => Err(DbError::UnsupportedDriver(other.to_string())),
        }
    }

    pub fn as_postgres(&self) -> Option<&PgPool> {
        match self {
            DbPool::Postgres(pool) => Some(pool),
            DbPool::Sqlite(_) => None,
        }
    }

    pub fn as_sqlite(&self) -> Option<&SqlitePool> {
        match self {
            DbPool::Sqlite(pool) => Some(pool),
            DbPool::Postgres(_) => None,
        }
    }

    pub async fn migrate(&self) -> Result<(), crate::infrastructure::migrations::MigrationError> {
        match self {
            DbPool::Postgres(pool) => crate::infrastructure::migrations::run_postgres(pool).await,
            DbPool::Sqlite(pool) => crate::infrastructure::migrations::run_sqlite(pool).await,
        }
    }
}
