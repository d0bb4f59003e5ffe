// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Resource Dependency Domain Model
//!
//! A declared edge between two resources within the same spec. Unlike the
//! graph's `requires`/`contains`/`executes` edges (see
//! [`crate::domain::graph`]), this is an author-declared relationship used
//! for ordering and impact analysis, not a projection of orchestration
//! events.

use serde::{Deserialize, Serialize};

use crate::domain::resource::ResourceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceDependencyId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Hard,
    Soft,
    Optional,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Hard => "hard",
            DependencyKind::Soft => "soft",
            DependencyKind::Optional => "optional",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "hard" => DependencyKind::Hard,
            "soft" => DependencyKind::Soft,
            "optional" => DependencyKind::Optional,
            _ => return None,
        })
    }
}

/// `resource_id` depends on `depends_on_id`. The pair is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDependency {
    pub id: ResourceDependencyId,
    pub resource_id: ResourceId,
    pub depends_on_id: ResourceId,
    pub kind: DependencyKind,
}

#[derive(Debug, Clone)]
pub struct NewResourceDependency {
    pub resource_id: ResourceId,
    pub depends_on_id: ResourceId,
    pub kind: DependencyKind,
}

impl NewResourceDependency {
    pub fn is_self_referential(&self) -> bool {
        self.resource_id == self.depends_on_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_self_referential_dependency() {
        let dep = NewResourceDependency { resource_id: ResourceId(1), depends_on_id: ResourceId(1), kind: DependencyKind::Hard };
        assert!(dep.is_self_referential());
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [DependencyKind::Hard, DependencyKind::Soft, DependencyKind::Optional] {
            assert_eq!(DependencyKind::parse(kind.as_str()), Some(kind));
        }
    }
}
