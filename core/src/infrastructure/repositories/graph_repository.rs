// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Dependency graph repository, Postgres and SQLite backends (spec.md §4.8).
//!
//! The projection tables are expected to stay small relative to the
//! resource/execution tables they summarize, so `graph_for_app` fetches the
//! full node and edge sets and filters in memory rather than building a
//! per-backend `IN (...)` clause.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, SqlitePool};

use crate::domain::graph::{EdgeKind, GraphAnnotation, GraphEdge, GraphNode, NodeKey, NodeType};
use crate::domain::repository::{GraphRepository, RepositoryError};

fn to_database_error<E: std::fmt::Display>(e: E) -> RepositoryError {
    RepositoryError::Database(e.to_string())
}

fn node_type_as_str(t: NodeType) -> &'static str {
    t.as_str()
}

fn node_type_from_str(s: &str) -> NodeType {
    match s {
        "resource" => NodeType::Resource,
        "provider" => NodeType::Provider,
        "workflow" => NodeType::Workflow,
        _ => NodeType::Spec,
    }
}

fn edge_kind_as_str(k: EdgeKind) -> &'static str {
    match k {
        EdgeKind::Contains => "contains",
        EdgeKind::Requires => "requires",
        EdgeKind::Executes => "executes",
    }
}

fn edge_kind_from_str(s: &str) -> EdgeKind {
    match s {
        "requires" => EdgeKind::Requires,
        "executes" => EdgeKind::Executes,
        _ => EdgeKind::Contains,
    }
}

/// A node belongs to `app_name`'s graph if it's the spec node itself or a
/// `resource:<app>:<name>` node (spec.md §4.8 node id conventions).
fn node_in_app(node_id: &str, app_name: &str) -> bool {
    node_id == format!("spec:{app_name}") || node_id.starts_with(&format!("resource:{app_name}:"))
}

pub struct PgGraphRepository(PgPool);

impl PgGraphRepository {
    pub fn new(pool: PgPool) -> Self {
        Self(pool)
    }
}

fn pg_row_to_node(row: &sqlx::postgres::PgRow) -> Result<GraphNode, RepositoryError> {
    let node_type: String = row.try_get("node_type").map_err(to_database_error)?;
    let node_id: String = row.try_get("node_id").map_err(to_database_error)?;
    Ok(GraphNode {
        id: row.try_get("id").map_err(to_database_error)?,
        key: NodeKey::new(node_type_from_str(&node_type), node_id),
        metadata: row.try_get("metadata").map_err(to_database_error)?,
        execution_started_at: row.try_get("execution_started_at").map_err(to_database_error)?,
        execution_completed_at: row.try_get("execution_completed_at").map_err(to_database_error)?,
        execution_duration_ms: row.try_get("execution_duration_ms").map_err(to_database_error)?,
    })
}

fn pg_row_to_edge(row: &sqlx::postgres::PgRow) -> Result<GraphEdge, RepositoryError> {
    let source_node_id: String = row.try_get("source_node_id").map_err(to_database_error)?;
    let target_node_id: String = row.try_get("target_node_id").map_err(to_database_error)?;
    let kind: String = row.try_get("kind").map_err(to_database_error)?;
    Ok(GraphEdge {
        id: row.try_get("id").map_err(to_database_error)?,
        source: NodeKey::new(NodeType::Resource, source_node_id),
        target: NodeKey::new(NodeType::Resource, target_node_id),
        kind: edge_kind_from_str(&kind),
        metadata: row.try_get("metadata").map_err(to_database_error)?,
    })
}

fn pg_row_to_annotation(row: &sqlx::postgres::PgRow) -> Result<GraphAnnotation, RepositoryError> {
    Ok(GraphAnnotation {
        id: row.try_get("id").map_err(to_database_error)?,
        app_name: row.try_get("app_name").map_err(to_database_error)?,
        node_id: row.try_get("node_id").map_err(to_database_error)?,
        author: row.try_get("author").map_err(to_database_error)?,
        text: row.try_get("text").map_err(to_database_error)?,
        created_at: row.try_get("created_at").map_err(to_database_error)?,
        updated_at: row.try_get("updated_at").map_err(to_database_error)?,
    })
}

#[async_trait]
impl GraphRepository for PgGraphRepository {
    async fn upsert_node(&self, key: NodeKey, metadata: serde_json::Value) -> Result<GraphNode, RepositoryError> {
        let row = sqlx::query(
            "INSERT INTO graph_nodes (node_type, node_id, metadata) VALUES ($1, $2, $3)
             ON CONFLICT (node_id) DO UPDATE SET metadata = EXCLUDED.metadata
             RETURNING id, node_type, node_id, metadata, execution_started_at, execution_completed_at, execution_duration_ms",
        )
        .bind(node_type_as_str(key.node_type))
        .bind(&key.node_id)
        .bind(&metadata)
        .fetch_one(&self.0)
        .await
        .map_err(to_database_error)?;
        pg_row_to_node(&row)
    }

    async fn upsert_edge(&self, source: NodeKey, target: NodeKey, kind: EdgeKind, metadata: serde_json::Value) -> Result<GraphEdge, RepositoryError> {
        let row = sqlx::query(
            "INSERT INTO graph_edges (source_node_id, target_node_id, kind, metadata) VALUES ($1, $2, $3, $4)
             ON CONFLICT (source_node_id, target_node_id, kind) DO UPDATE SET metadata = EXCLUDED.metadata
             RETURNING id, source_node_id, target_node_id, kind, metadata",
        )
        .bind(&source.node_id)
        .bind(&target.node_id)
        .bind(edge_kind_as_str(kind))
        .bind(&metadata)
        .fetch_one(&self.0)
        .await
        .map_err(to_database_error)?;
        pg_row_to_edge(&row)
    }

    async fn update_execution_timing(
        &self,
        key: &NodeKey,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
        duration_ms: Option<i64>,
    ) -> Result<GraphNode, RepositoryError> {
        let row = sqlx::query(
            "UPDATE graph_nodes SET execution_started_at = $2, execution_completed_at = $3, execution_duration_ms = $4 WHERE node_id = $1
             RETURNING id, node_type, node_id, metadata, execution_started_at, execution_completed_at, execution_duration_ms",
        )
        .bind(&key.node_id)
        .bind(started_at)
        .bind(completed_at)
        .bind(duration_ms)
        .fetch_optional(&self.0)
        .await
        .map_err(to_database_error)?
        .ok_or(RepositoryError::NotFound)?;
        pg_row_to_node(&row)
    }

    async fn graph_for_app(&self, app_name: &str) -> Result<(Vec<GraphNode>, Vec<GraphEdge>), RepositoryError> {
        let all_nodes = sqlx::query("SELECT id, node_type, node_id, metadata, execution_started_at, execution_completed_at, execution_duration_ms FROM graph_nodes")
            .fetch_all(&self.0)
            .await
            .map_err(to_database_error)?
            .iter()
            .map(pg_row_to_node)
            .collect::<Result<Vec<_>, _>>()?;
        let all_edges = sqlx::query("SELECT id, source_node_id, target_node_id, kind, metadata FROM graph_edges")
            .fetch_all(&self.0)
            .await
            .map_err(to_database_error)?
            .iter()
            .map(pg_row_to_edge)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(filter_graph_for_app(all_nodes, all_edges, app_name))
    }

    async fn add_annotation(&self, app_name: &str, node_id: &str, author: &str, text: &str) -> Result<GraphAnnotation, RepositoryError> {
        let row = sqlx::query(
            "INSERT INTO graph_annotations (app_name, node_id, author, text) VALUES ($1, $2, $3, $4)
             RETURNING id, app_name, node_id, author, text, created_at, updated_at",
        )
        .bind(app_name)
        .bind(node_id)
        .bind(author)
        .bind(text)
        .fetch_one(&self.0)
        .await
        .map_err(to_database_error)?;
        pg_row_to_annotation(&row)
    }

    async fn list_annotations(&self, app_name: &str, node_id: &str) -> Result<Vec<GraphAnnotation>, RepositoryError> {
        let rows = sqlx::query("SELECT id, app_name, node_id, author, text, created_at, updated_at FROM graph_annotations WHERE app_name = $1 AND node_id = $2 ORDER BY created_at")
            .bind(app_name)
            .bind(node_id)
            .fetch_all(&self.0)
            .await
            .map_err(to_database_error)?;
        rows.iter().map(pg_row_to_annotation).collect()
    }

    async fn delete_annotation(&self, id: i64) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM graph_annotations WHERE id = $1").bind(id).execute(&self.0).await.map_err(to_database_error)?;
        Ok(())
    }
}

/// Shared between backends: restrict the full node/edge set down to the
/// nodes that belong to `app_name` plus anything directly connected to them
/// (e.g. a workflow node reached via an `executes` edge).
fn filter_graph_for_app(all_nodes: Vec<GraphNode>, all_edges: Vec<GraphEdge>, app_name: &str) -> (Vec<GraphNode>, Vec<GraphEdge>) {
    use std::collections::HashSet;

    let mut kept_ids: HashSet<String> = all_nodes.iter().filter(|n| node_in_app(&n.key.node_id, app_name)).map(|n| n.key.node_id.clone()).collect();

    let edges: Vec<GraphEdge> = all_edges
        .into_iter()
        .filter(|e| kept_ids.contains(&e.source.node_id) || kept_ids.contains(&e.target.node_id))
        .collect();

    for edge in &edges {
        kept_ids.insert(edge.source.node_id.clone());
        kept_ids.insert(edge.target.node_id.clone());
    }

    let nodes = all_nodes.into_iter().filter(|n| kept_ids.contains(&n.key.node_id)).collect();
    (nodes, edges)
}

pub struct SqliteGraphRepository(SqlitePool);

impl SqliteGraphRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self(pool)
    }
}

fn sqlite_row_to_node(row: &sqlx::sqlite::SqliteRow) -> Result<GraphNode, RepositoryError> {
    let node_type: String = row.try_get("node_type").map_err(to_database_error)?;
    let node_id: String = row.try_get("node_id").map_err(to_database_error)?;
    let metadata: String = row.try_get("metadata").map_err(to_database_error)?;
    Ok(GraphNode {
        id: row.try_get("id").map_err(to_database_error)?,
        key: NodeKey::new(node_type_from_str(&node_type), node_id),
        metadata: serde_json::from_str(&metadata).map_err(to_database_error)?,
        execution_started_at: row.try_get("execution_started_at").map_err(to_database_error)?,
        execution_completed_at: row.try_get("execution_completed_at").map_err(to_database_error)?,
        execution_duration_ms: row.try_get("execution_duration_ms").map_err(to_database_error)?,
    })
}

fn sqlite_row_to_edge(row: &sqlx::sqlite::SqliteRow) -> Result<GraphEdge, RepositoryError> {
    let source_node_id: String = row.try_get("source_node_id").map_err(to_database_error)?;
    let target_node_id: String = row.try_get("target_node_id").map_err(to_database_error)?;
    let kind: String = row.try_get("kind").map_err(to_database_error)?;
    let metadata: String = row.try_get("metadata").map_err(to_database_error)?;
    Ok(GraphEdge {
        id: row.try_get("id").map_err(to_database_error)?,
        source: NodeKey::new(NodeType::Resource, source_node_id),
        target: NodeKey::new(NodeType::Resource, target_node_id),
        kind: edge_kind_from_str(&kind),
        metadata: serde_json::from_str(&metadata).map_err(to_database_error)?,
    })
}

fn sqlite_row_to_annotation(row: &sqlx::sqlite::SqliteRow) -> Result<GraphAnnotation, RepositoryError> {
    Ok(GraphAnnotation {
        id: row.try_get("id").map_err(to_database_error)?,
        app_name: row.try_get("app_name").map_err(to_database_error)?,
        node_id: row.try_get("node_id").map_err(to_database_error)?,
        author: row.try_get("author").map_err(to_database_error)?,
        text: row.try_get("text").map_err(to_database_error)?,
        created_at: row.try_get("created_at").map_err(to_database_error)?,
        updated_at: row.try_get("updated_at").map_err(to_database_error)?,
    })
}

#[async_trait]
impl GraphRepository for SqliteGraphRepository {
    async fn upsert_node(&self, key: NodeKey, metadata: serde_json::Value) -> Result<GraphNode, RepositoryError> {
        let metadata_str = serde_json::to_string(&metadata).map_err(to_database_error)?;
        sqlx::query(
            "INSERT INTO graph_nodes (node_type, node_id, metadata) VALUES (?1, ?2, ?3)
             ON CONFLICT (node_id) DO UPDATE SET metadata = excluded.metadata",
        )
        .bind(node_type_as_str(key.node_type))
        .bind(&key.node_id)
        .bind(&metadata_str)
        .execute(&self.0)
        .await
        .map_err(to_database_error)?;
        let row = sqlx::query("SELECT id, node_type, node_id, metadata, execution_started_at, execution_completed_at, execution_duration_ms FROM graph_nodes WHERE node_id = ?1")
            .bind(&key.node_id)
            .fetch_one(&self.0)
            .await
            .map_err(to_database_error)?;
        sqlite_row_to_node(&row)
    }

    async fn upsert_edge(&self, source: NodeKey, target: NodeKey, kind: EdgeKind, metadata: serde_json::Value) -> Result<GraphEdge, RepositoryError> {
        let metadata_str = serde_json::to_string(&metadata).map_err(to_database_error)?;
        sqlx::query(
            "INSERT INTO graph_edges (source_node_id, target_node_id, kind, metadata) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (source_node_id, target_node_id, kind) DO UPDATE SET metadata = excluded.metadata",
        )
        .bind(&source.node_id)
        .bind(&target.node_id)
        .bind(edge_kind_as_str(kind))
        .bind(&metadata_str)
        .execute(&self.0)
        .await
        .map_err(to_database_error)?;
        let row = sqlx::query("SELECT id, source_node_id, target_node_id, kind, metadata FROM graph_edges WHERE source_node_id = ?1 AND target_node_id = ?2 AND kind = ?3")
            .bind(&source.node_id)
            .bind(&target.node_id)
            .bind(edge_kind_as_str(kind))
            .fetch_one(&self.0)
            .await
            .map_err(to_database_error)?;
        sqlite_row_to_edge(&row)
    }

    async fn update_execution_timing(
        &self,
        key: &NodeKey,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
        duration_ms: Option<i64>,
    ) -> Result<GraphNode, RepositoryError> {
        sqlx::query("UPDATE graph_nodes SET execution_started_at = ?2, execution_completed_at = ?3, execution_duration_ms = ?4 WHERE node_id = ?1")
            .bind(&key.node_id)
            .bind(started_at)
            .bind(completed_at)
            .bind(duration_ms)
            .execute(&self.0)
            .await
            .map_err(to_database_error)?;
        let row = sqlx::query("SELECT id, node_type, node_id, metadata, execution_started_at, execution_completed_at, execution_duration_ms FROM graph_nodes WHERE node_id = ?1")
            .bind(&key.node_id)
            .fetch_optional(&self.0)
            .await
            .map_err(to_database_error)?
            .ok_or(RepositoryError::NotFound)?;
        sqlite_row_to_node(&row)
    }

    async fn graph_for_app(&self, app_name: &str) -> Result<(Vec<GraphNode>, Vec<GraphEdge>), RepositoryError> {
        let all_nodes = sqlx::query("SELECT id, node_type, node_id, metadata, execution_started_at, execution_completed_at, execution_duration_ms FROM graph_nodes")
            .fetch_all(&self.0)
            .await
            .map_err(to_database_error)?
            .iter()
            .map(sqlite_row_to_node)
            .collect::<Result<Vec<_>, _>>()?;
        let all_edges = sqlx::query("SELECT id, source_node_id, target_node_id, kind, metadata FROM graph_edges")
            .fetch_all(&self.0)
            .await
            .map_err(to_database_error)?
            .iter()
            .map(sqlite_row_to_edge)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(filter_graph_for_app(all_nodes, all_edges, app_name))
    }

    async fn add_annotation(&self, app_name: &str, node_id: &str, author: &str, text: &str) -> Result<GraphAnnotation, RepositoryError> {
        let id = sqlx::query("INSERT INTO graph_annotations (app_name, node_id, author, text) VALUES (?1, ?2, ?3, ?4)")
            .bind(app_name)
            .bind(node_id)
            .bind(author)
            .bind(text)
            .execute(&self.0)
            .await
            .map_err(to_database_error)?
            .last_insert_rowid();
        let row = sqlx::query("SELECT id, app_name, node_id, author, text, created_at, updated_at FROM graph_annotations WHERE id = ?1")
            .bind(id)
            .fetch_one(&self.0)
            .await
            .map_err(to_database_error)?;
        sqlite_row_to_annotation(&row)
    }

    async fn list_annotations(&self, app_name: &str, node_id: &str) -> Result<Vec<GraphAnnotation>, RepositoryError> {
        let rows = sqlx::query("SELECT id, app_name, node_id, author, text, created_at, updated_at FROM graph_annotations WHERE app_name = ?1 AND node_id = ?2 ORDER BY created_at")
            .bind(app_name)
            .bind(node_id)
            .fetch_all(&self.0)
            .await
            .map_err(to_database_error)?;
        rows.iter().map(sqlite_row_to_annotation).collect()
    }

    async fn delete_annotation(&self, id: i64) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM graph_annotations WHERE id = ?1").bind(id).execute(&self.0).await.map_err(to_database_error)?;
        Ok(())
    }
}
