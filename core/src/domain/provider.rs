// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Provider Domain Model
//!
//! A [`ProviderManifest`] is pure data loaded from YAML (spec.md §4.3); the
//! registry (`application::registry`) is what turns a set of manifests into
//! a queryable, conflict-checked snapshot. Nothing in this module touches
//! the filesystem or git.

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowCategory {
    Provisioner,
    Goldenpath,
}

impl WorkflowCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowCategory::Provisioner => "provisioner",
            WorkflowCategory::Goldenpath => "goldenpath",
        }
    }
}

/// One `workflows[]` entry in a provider manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderWorkflowRef {
    pub name: String,
    /// Filesystem-relative path to the workflow YAML, relative to the
    /// provider's source root.
    pub file: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub category: WorkflowCategory,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Min/max acceptable core version, both optional (spec.md §4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompatibilityWindow {
    #[serde(default)]
    pub min_core_version: Option<String>,
    #[serde(default)]
    pub max_core_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(rename = "resourceTypes")]
    pub resource_types: Vec<String>,
}

/// The raw, parsed provider manifest (`apiVersion: v1, kind: Provider`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderManifest {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: ProviderMetadata,
    #[serde(default)]
    pub compatibility: CompatibilityWindow,
    pub capabilities: Capabilities,
    pub workflows: Vec<ProviderWorkflowRef>,
    /// Identifies where this manifest was loaded from, for error messages
    /// and reload bookkeeping. Not part of the wire schema itself.
    #[serde(skip)]
    pub source_root: Option<String>,
}

impl ProviderManifest {
    pub fn find_workflow(&self, name: &str) -> Option<&ProviderWorkflowRef> {
        self.workflows.iter().find(|w| w.name == name)
    }

    pub fn first_provisioner(&self, tags: &[String]) -> Option<&ProviderWorkflowRef> {
        self.workflows
            .iter()
            .filter(|w| w.category == WorkflowCategory::Provisioner)
            .find(|w| tags.is_empty() || w.tags.iter().any(|t| tags.contains(t)))
    }

    pub fn claims(&self, resource_type: &str) -> bool {
        self.capabilities.resource_types.iter().any(|t| t == resource_type)
    }

    /// Validate the manifest in isolation (rules 1-2 of spec.md §4.3's
    /// four-rule validation list; rules 3-4 require the full registry).
    pub fn validate_self(&self, core_version: &Version) -> Result<(), ProviderError> {
        if self.kind != "Provider" {
            return Err(ProviderError::InvalidManifest(format!("kind must be 'Provider', got '{}'", self.kind)));
        }
        if self.metadata.name.trim().is_empty() {
            return Err(ProviderError::InvalidManifest("metadata.name is required".into()));
        }
        Version::parse(&self.metadata.version)
            .map_err(|e| ProviderError::InvalidManifest(format!("metadata.version '{}' is not valid semver: {e}", self.metadata.version)))?;

        if let Some(min) = &self.compatibility.min_core_version {
            let req = VersionReq::parse(&format!(">={min}")).map_err(|e| ProviderError::InvalidManifest(format!("bad min_core_version: {e}")))?;
            if !req.matches(core_version) {
                return Err(ProviderError::IncompatibleCore { provider: self.metadata.name.clone(), core_version: core_version.to_string() });
            }
        }
        if let Some(max) = &self.compatibility.max_core_version {
            let req = VersionReq::parse(&format!("<={max}")).map_err(|e| ProviderError::InvalidManifest(format!("bad max_core_version: {e}")))?;
            if !req.matches(core_version) {
                return Err(ProviderError::IncompatibleCore { provider: self.metadata.name.clone(), core_version: core_version.to_string() });
            }
        }
        if self.workflows.is_empty() {
            return Err(ProviderError::InvalidManifest("workflows[] must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid provider manifest: {0}")]
    InvalidManifest(String),
    #[error("provider '{provider}' incompatible with core version {core_version}")]
    IncompatibleCore { provider: String, core_version: String },
    #[error("duplicate provider name '{0}'")]
    DuplicateName(String),
    #[error("capability conflict on resource type '{resource_type}': claimed by {claimants:?}")]
    CapabilityConflict { resource_type: String, claimants: Vec<String> },
    #[error("no provider claims resource type '{0}'")]
    NoProvider(String),
    #[error("provider '{provider}' has no workflow matching requested criteria")]
    NoProvisioner { provider: String },
    #[error("workflow file '{0}' not found")]
    WorkflowFileMissing(String),
}

impl crate::error::HasErrorCode for ProviderError {
    fn code(&self) -> ErrorCode {
        match self {
            ProviderError::InvalidManifest(_) | ProviderError::IncompatibleCore { .. } | ProviderError::DuplicateName(_) | ProviderError::WorkflowFileMissing(_) => {
                ErrorCode::InvalidSpec
            }
            ProviderError::CapabilityConflict { .. } => ErrorCode::CapabilityConflict,
            ProviderError::NoProvider(_) => ErrorCode::NoProvider,
            ProviderError::NoProvisioner { .. } => ErrorCode::NoProvisioner,
        }
    }
}
crate::impl_core_error_from!(ProviderError);

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(name: &str, version: &str, resource_types: Vec<&str>) -> ProviderManifest {
        ProviderManifest {
            api_version: "v1".into(),
            kind: "Provider".into(),
            metadata: ProviderMetadata { name: name.into(), version: version.into(), category: None, description: None },
            compatibility: CompatibilityWindow::default(),
            capabilities: Capabilities { resource_types: resource_types.into_iter().map(String::from).collect() },
            workflows: vec![ProviderWorkflowRef {
                name: "provision".into(),
                file: "workflows/provision.yaml".into(),
                version: None,
                description: None,
                category: WorkflowCategory::Provisioner,
                tags: vec![],
            }],
            source_root: None,
        }
    }

    #[test]
    fn rejects_non_semver_version() {
        let m = manifest("db", "not-a-version", vec!["postgres"]);
        assert!(matches!(m.validate_self(&Version::new(1, 0, 0)), Err(ProviderError::InvalidManifest(_))));
    }

    #[test]
    fn rejects_empty_workflows() {
        let mut m = manifest("db", "1.0.0", vec!["postgres"]);
        m.workflows.clear();
        assert!(m.validate_self(&Version::new(1, 0, 0)).is_err());
    }

    #[test]
    fn enforces_compatibility_window() {
        let mut m = manifest("db", "1.0.0", vec!["postgres"]);
        m.compatibility.min_core_version = Some("2.0.0".into());
        assert!(matches!(m.validate_self(&Version::new(1, 0, 0)), Err(ProviderError::IncompatibleCore { .. })));
    }

    #[test]
    fn first_provisioner_honors_tags() {
        let mut m = manifest("db", "1.0.0", vec!["postgres"]);
        m.workflows.push(ProviderWorkflowRef {
            name: "provision-ha".into(),
            file: "workflows/ha.yaml".into(),
            version: None,
            description: None,
            category: WorkflowCategory::Provisioner,
            tags: vec!["ha".into()],
        });
        let tags = vec!["ha".to_string()];
        assert_eq!(m.first_provisioner(&tags).unwrap().name, "provision-ha");
        assert_eq!(m.first_provisioner(&[]).unwrap().name, "provision");
    }

    #[test]
    fn claims_checks_resource_types_membership() {
        let m = manifest("db", "1.0.0", vec!["postgres", "postgresql"]);
        assert!(m.claims("postgres"));
        assert!(!m.claims("redis"));
    }
}
