// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Dependency Graph Domain Model
//!
//! The graph is a projection of orchestration events, not a source of
//! truth (spec.md §4.8, §9 "Graph is a projection") — it can always be
//! rebuilt from the resource/workflow tables. This module holds the node
//! and edge shapes plus the critical-path algorithm; writes happen
//! transactionally alongside the event that causes them, in
//! `application::graph_service`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

use crate::error::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Spec,
    Resource,
    Provider,
    Workflow,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Spec => "spec",
            NodeType::Resource => "resource",
            NodeType::Provider => "provider",
            NodeType::Workflow => "workflow",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Contains,
    Requires,
    Executes,
}

/// `(node_type, node_id)` uniquely identifies a node; `node_id` is a
/// human-readable key such as `spec:api-1` or `resource:api-1:db`
/// (spec.md §4.8).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    pub node_type: NodeType,
    pub node_id: String,
}

impl NodeKey {
    pub fn new(node_type: NodeType, node_id: impl Into<String>) -> Self {
        Self { node_type, node_id: node_id.into() }
    }

    pub fn spec(app: &str) -> Self {
        Self::new(NodeType::Spec, format!("spec:{app}"))
    }

    pub fn resource(app: &str, resource_name: &str) -> Self {
        Self::new(NodeType::Resource, format!("resource:{app}:{resource_name}"))
    }

    pub fn provider(name: &str) -> Self {
        Self::new(NodeType::Provider, format!("provider:{name}"))
    }

    pub fn workflow(execution_id: i64) -> Self {
        Self::new(NodeType::Workflow, format!("workflow:{execution_id}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: i64,
    pub key: NodeKey,
    pub metadata: serde_json::Value,
    pub execution_started_at: Option<DateTime<Utc>>,
    pub execution_completed_at: Option<DateTime<Utc>>,
    pub execution_duration_ms: Option<i64>,
}

impl GraphNode {
    pub fn weight(&self) -> i64 {
        self.execution_duration_ms.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: i64,
    pub source: NodeKey,
    pub target: NodeKey,
    pub kind: EdgeKind,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphAnnotation {
    pub id: i64,
    pub app_name: String,
    pub node_id: String,
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GraphAnnotation {
    pub fn can_delete(&self, requester: &str, requester_is_admin: bool) -> bool {
        requester_is_admin || self.author == requester
    }
}

/// An in-memory view of nodes/edges reachable from a root, sufficient to
/// run the critical-path query without round-tripping to storage per hop.
#[derive(Debug, Clone, Default)]
pub struct GraphView {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone)]
pub struct CriticalPathResult {
    pub path: Vec<String>,
    pub total_weight_ms: i64,
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("node '{0}' not found in graph")]
    NodeNotFound(String),
    #[error("graph for root '{0}' is empty")]
    EmptyGraph(String),
}

impl crate::error::HasErrorCode for GraphError {
    fn code(&self) -> ErrorCode {
        ErrorCode::Internal
    }
}
crate::impl_core_error_from!(GraphError);

impl GraphView {
    /// Longest path by summed node weight from `root`, tolerant of cycles
    /// (spec.md §4.8: "Cycles are possible in principle ... and MUST be
    /// tolerated by producing a best-effort answer rather than looping").
    /// Kahn's topological sort, then DP for longest path, then backtrack.
    pub fn critical_path(&self, root: &str) -> Result<CriticalPathResult, GraphError> {
        if !self.nodes.iter().any(|n| n.key.node_id == root) {
            return Err(GraphError::NodeNotFound(root.to_string()));
        }

        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
        let mut indegree: HashMap<String, usize> = HashMap::new();
        let weight: HashMap<String, i64> = self.nodes.iter().map(|n| (n.key.node_id.clone(), n.weight())).collect();

        for node in &self.nodes {
            indegree.entry(node.key.node_id.clone()).or_insert(0);
            adjacency.entry(node.key.node_id.clone()).or_default();
        }
        for edge in &self.edges {
            adjacency.entry(edge.source.node_id.clone()).or_default().push(edge.target.node_id.clone());
            *indegree.entry(edge.target.node_id.clone()).or_insert(0) += 1;
        }

        // Kahn's algorithm. Nodes still in-degree > 0 once the queue is
        // drained indicate a cycle; they are simply skipped from the
        // topological order rather than causing an infinite loop.
        let mut queue: VecDeque<String> = indegree.iter().filter(|(_, &d)| d == 0).map(|(k, _)| k.clone()).collect();
        let mut remaining = indegree.clone();
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        while let Some(n) = queue.pop_front() {
            if !visited.insert(n.clone()) {
                continue;
            }
            order.push(n.clone());
            if let Some(targets) = adjacency.get(&n) {
                for t in targets {
                    if let Some(d) = remaining.get_mut(t) {
                        if *d > 0 {
                            *d -= 1;
                        }
                        if *d == 0 && !visited.contains(t) {
                            queue.push_back(t.clone());
                        }
                    }
                }
            }
        }

        if !order.contains(&root.to_string()) {
            // Root is part of a cycle reachable only through back-edges;
            // still produce a best-effort single-node answer.
            let w = *weight.get(root).unwrap_or(&0);
            return Ok(CriticalPathResult { path: vec![root.to_string()], total_weight_ms: w });
        }

        let mut best: HashMap<String, i64> = HashMap::new();
        let mut prev: HashMap<String, String> = HashMap::new();
        best.insert(root.to_string(), *weight.get(root).unwrap_or(&0));

        for n in &order {
            if !best.contains_key(n) {
                continue;
            }
            let base = best[n];
            if let Some(targets) = adjacency.get(n) {
                for t in targets {
                    let candidate = base + *weight.get(t).unwrap_or(&0);
                    if candidate > *best.get(t).unwrap_or(&i64::MIN) {
                        best.insert(t.clone(), candidate);
                        prev.insert(t.clone(), n.clone());
                    }
                }
            }
        }

        let (end, &total_weight_ms) = best.iter().max_by_key(|(_, &w)| w).unwrap();
        let mut path = vec![end.clone()];
        let mut cursor = end.clone();
        while let Some(p) = prev.get(&cursor) {
            path.push(p.clone());
            cursor = p.clone();
        }
        path.reverse();

        Ok(CriticalPathResult { path, total_weight_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64, node_id: &str, duration_ms: Option<i64>) -> GraphNode {
        GraphNode {
            id,
            key: NodeKey::new(NodeType::Resource, node_id),
            metadata: serde_json::Value::Null,
            execution_started_at: None,
            execution_completed_at: None,
            execution_duration_ms: duration_ms,
        }
    }

    fn edge(id: i64, source: &str, target: &str) -> GraphEdge {
        GraphEdge { id, source: NodeKey::new(NodeType::Resource, source), target: NodeKey::new(NodeType::Resource, target), kind: EdgeKind::Requires, metadata: serde_json::Value::Null }
    }

    // P9: critical path weight equals the longest root-to-leaf duration sum.
    #[test]
    fn critical_path_picks_longest_weighted_chain() {
        let view = GraphView {
            nodes: vec![node(1, "a", Some(10)), node(2, "b", Some(20)), node(3, "c", Some(5)), node(4, "d", Some(100))],
            edges: vec![edge(1, "a", "b"), edge(2, "b", "c"), edge(3, "a", "d")],
        };
        let result = view.critical_path("a").unwrap();
        assert_eq!(result.path, vec!["a".to_string(), "d".to_string()]);
        assert_eq!(result.total_weight_ms, 110);
    }

    #[test]
    fn critical_path_tolerates_cycles_without_looping() {
        let view = GraphView {
            nodes: vec![node(1, "a", Some(1)), node(2, "b", Some(1))],
            edges: vec![edge(1, "a", "b"), edge(2, "b", "a")],
        };
        let result = view.critical_path("a");
        assert!(result.is_ok());
    }

    #[test]
    fn critical_path_errors_on_missing_root() {
        let view = GraphView { nodes: vec![node(1, "a", Some(1))], edges: vec![] };
        assert!(matches!(view.critical_path("missing"), Err(GraphError::NodeNotFound(_))));
    }

    #[test]
    fn annotation_deletable_by_author_or_admin_only() {
        let ann = GraphAnnotation {
            id: 1,
            app_name: "api-1".into(),
            node_id: "resource:api-1:db".into(),
            author: "alice".into(),
            text: "flaky".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(ann.can_delete("alice", false));
        assert!(ann.can_delete("bob", true));
        assert!(!ann.can_delete("bob", false));
    }
}
