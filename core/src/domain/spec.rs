// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Spec Domain Model
//!
//! A [`Spec`] is the submitted declarative document (spec.md §3, §6). It
//! owns the [`Resource`](crate::domain::resource::Resource) rows declared
//! under its `resources` map; resubmitting a spec with the same `name`
//! replaces the row rather than creating a new one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::error::ErrorCode;

/// Store-assigned identifier. Entities in this system use monotonically
/// increasing integer ids assigned by the store, not client-generated UUIDs
/// (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpecId(pub i64);

impl std::fmt::Display for SpecId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The apiVersion this core understands for Score specs (spec.md §6).
pub const SCORE_API_VERSION: &str = "score.dev/v1b1";

/// A single `containers.<name>` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerDecl {
    pub image: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A single `resources.<name>` entry, before resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceDecl {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub properties: serde_json::Value,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Set only when `type: delegated`.
    #[serde(default)]
    pub provider: Option<String>,
}

impl ResourceDecl {
    pub fn is_delegated(&self) -> bool {
        self.resource_type == "delegated"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecMetadata {
    pub name: String,
    #[serde(default)]
    pub product: Option<String>,
}

/// The verbatim Score document, structured per spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreDocument {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub metadata: SpecMetadata,
    #[serde(default)]
    pub containers: HashMap<String, ContainerDecl>,
    #[serde(default)]
    pub resources: HashMap<String, ResourceDecl>,
}

/// Aggregate root: the submitted declarative document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spec {
    pub id: SpecId,
    pub name: String,
    pub document: ScoreDocument,
    pub team: Option<String>,
    pub submitted_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Not-yet-persisted form; the repository assigns [`SpecId`] on insert (or
/// reuses the existing row's id when `name` already exists — resubmission
/// replaces the row, per spec.md §3).
#[derive(Debug, Clone)]
pub struct NewSpec {
    pub name: String,
    pub document: ScoreDocument,
    pub team: Option<String>,
    pub submitted_by: String,
}

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("apiVersion '{0}' is not supported, expected '{SCORE_API_VERSION}'")]
    UnsupportedApiVersion(String),
    #[error("spec metadata.name must not be empty")]
    EmptyName,
    #[error("resource '{0}' references container-less image field incorrectly: {1}")]
    InvalidResource(String, String),
    #[error("failed to parse spec document: {0}")]
    Parse(String),
}

impl crate::error::HasErrorCode for SpecError {
    fn code(&self) -> ErrorCode {
        ErrorCode::InvalidSpec
    }
}
crate::impl_core_error_from!(SpecError);

impl NewSpec {
    /// Validate invariants that don't require a database round trip.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.document.api_version != SCORE_API_VERSION {
            return Err(SpecError::UnsupportedApiVersion(self.document.api_version.clone()));
        }
        if self.document.metadata.name.trim().is_empty() {
            return Err(SpecError::EmptyName);
        }
        for (name, decl) in &self.document.resources {
            if decl.is_delegated() && decl.provider.is_none() {
                return Err(SpecError::InvalidResource(
                    name.clone(),
                    "type: delegated requires a provider field".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(api_version: &str, name: &str) -> ScoreDocument {
        ScoreDocument {
            api_version: api_version.to_string(),
            metadata: SpecMetadata { name: name.to_string(), product: None },
            containers: HashMap::new(),
            resources: HashMap::new(),
        }
    }

    #[test]
    fn rejects_unsupported_api_version() {
        let spec = NewSpec {
            name: "api-1".into(),
            document: doc("score.dev/v2", "api-1"),
            team: None,
            submitted_by: "alice".into(),
        };
        assert!(matches!(spec.validate(), Err(SpecError::UnsupportedApiVersion(_))));
    }

    #[test]
    fn rejects_empty_metadata_name() {
        let spec = NewSpec {
            name: "api-1".into(),
            document: doc(SCORE_API_VERSION, ""),
            team: None,
            submitted_by: "alice".into(),
        };
        assert!(matches!(spec.validate(), Err(SpecError::EmptyName)));
    }

    #[test]
    fn delegated_resource_requires_provider() {
        let mut document = doc(SCORE_API_VERSION, "api-1");
        document.resources.insert(
            "db".to_string(),
            ResourceDecl {
                resource_type: "delegated".to_string(),
                properties: serde_json::Value::Null,
                metadata: HashMap::new(),
                provider: None,
            },
        );
        let spec = NewSpec { name: "api-1".into(), document, team: None, submitted_by: "alice".into() };
        assert!(matches!(spec.validate(), Err(SpecError::InvalidResource(_, _))));
    }

    #[test]
    fn accepts_well_formed_spec() {
        let mut document = doc(SCORE_API_VERSION, "api-1");
        document.resources.insert(
            "db".to_string(),
            ResourceDecl {
                resource_type: "postgres".to_string(),
                properties: serde_json::json!({"version": "15"}),
                metadata: HashMap::new(),
                provider: None,
            },
        );
        let spec = NewSpec { name: "api-1".into(), document, team: None, submitted_by: "alice".into() };
        assert!(spec.validate().is_ok());
    }
}
