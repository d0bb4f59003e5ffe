// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Provider manifest loading (spec.md §4.3).
//!
//! A provider's manifest can come from a filesystem directory
//! (`provider.yaml` + `workflows/*.yaml`) or a Git repository, shallow
//! cloned at startup and on explicit reload. A source failure is isolated
//! to that provider — one bad Git remote must never prevent the rest of
//! the registry from loading.

use semver::Version;
use serde::Deserialize;
use serde_yaml::Value as YamlValue;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::domain::provider::{ProviderManifest, ProviderWorkflowRef, WorkflowCategory};

#[derive(Debug, Clone)]
pub enum ProviderSource {
    Filesystem { path: PathBuf },
    Git { url: String, reference: String },
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read manifest at {0}: {1}")]
    Io(PathBuf, String),
    #[error("failed to parse manifest yaml: {0}")]
    Parse(String),
    #[error("git clone of {url}@{reference} failed: {detail}")]
    GitClone { url: String, reference: String, detail: String },
}

/// Loads every source, isolating per-source failures: a source that fails
/// is logged and skipped rather than aborting the whole load (spec.md §4.3
/// "a failed clone is fatal for that source but never for unrelated
/// providers"). Startup-fatal validation (schema, compatibility, duplicate
/// names, capability conflicts) happens afterward in
/// `application::registry::build_snapshot`.
pub async fn load_all(sources: &[ProviderSource], workdir: &Path) -> Vec<ProviderManifest> {
    let mut manifests = Vec::new();
    for source in sources {
        match load_one(source, workdir).await {
            Ok(manifest) => manifests.push(manifest),
            Err(e) => warn!(source = ?source, error = %e, "skipping provider source that failed to load"),
        }
    }
    manifests
}

async fn load_one(source: &ProviderSource, workdir: &Path) -> Result<ProviderManifest, LoadError> {
    let root = match source {
        ProviderSource::Filesystem { path } => path.clone(),
        ProviderSource::Git { url, reference } => clone_shallow(url, reference, workdir)?,
    };

    let manifest_path = root.join("provider.yaml");
    let raw = tokio::fs::read_to_string(&manifest_path).await.map_err(|e| LoadError::Io(manifest_path.clone(), e.to_string()))?;
    let mut manifest = parse_manifest(&raw)?;
    manifest.source_root = Some(root.to_string_lossy().to_string());
    Ok(manifest)
}

/// Shallow-clones `url` at `reference` (tag, branch, or commit) into a
/// fresh subdirectory of `workdir`.
fn clone_shallow(url: &str, reference: &str, workdir: &Path) -> Result<PathBuf, LoadError> {
    let dest = workdir.join(sanitize_dirname(url)).join(reference);
    if dest.exists() {
        std::fs::remove_dir_all(&dest).map_err(|e| LoadError::GitClone { url: url.to_string(), reference: reference.to_string(), detail: e.to_string() })?;
    }
    std::fs::create_dir_all(&dest).map_err(|e| LoadError::GitClone { url: url.to_string(), reference: reference.to_string(), detail: e.to_string() })?;

    let mut builder = git2::build::RepoBuilder::new();
    let mut fetch_options = git2::FetchOptions::new();
    fetch_options.depth(1);
    builder.branch(reference);
    builder.fetch_options(fetch_options);

    match builder.clone(url, &dest) {
        Ok(_) => Ok(dest),
        Err(_) => {
            // `reference` may be a tag or commit rather than a branch;
            // fall back to a full-depth clone plus a manual checkout.
            let repo = git2::Repository::clone(url, &dest).map_err(|e| LoadError::GitClone { url: url.to_string(), reference: reference.to_string(), detail: e.to_string() })?;
            let (object, _) = repo
                .revparse_ext(reference)
                .map_err(|e| LoadError::GitClone { url: url.to_string(), reference: reference.to_string(), detail: e.to_string() })?;
            repo.checkout_tree(&object, None).map_err(|e| LoadError::GitClone { url: url.to_string(), reference: reference.to_string(), detail: e.to_string() })?;
            repo.set_head_detached(object.id()).map_err(|e| LoadError::GitClone { url: url.to_string(), reference: reference.to_string(), detail: e.to_string() })?;
            Ok(dest)
        }
    }
}

fn sanitize_dirname(url: &str) -> String {
    url.chars().map(|c| if c.is_alphanumeric() { c } else { '_' }).collect()
}

/// Older-shape manifest fields, migrated into the unified `workflows[]`
/// before the document is deserialized into `ProviderManifest` (spec.md
/// §4.3 "Backward-compat migration").
#[derive(Debug, Deserialize)]
struct LegacyWorkflowRef {
    name: String,
    file: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

impl LegacyWorkflowRef {
    fn into_ref(self, category: WorkflowCategory) -> ProviderWorkflowRef {
        ProviderWorkflowRef { name: self.name, file: self.file, version: self.version, description: self.description, category, tags: self.tags }
    }
}

pub fn parse_manifest(raw: &str) -> Result<ProviderManifest, LoadError> {
    let mut doc: YamlValue = serde_yaml::from_str(raw).map_err(|e| LoadError::Parse(e.to_string()))?;
    migrate_legacy_workflow_lists(&mut doc)?;
    serde_yaml::from_value(doc).map_err(|e| LoadError::Parse(e.to_string()))
}

/// Rewrites a document using the legacy `provisioners[]`/`goldenpaths[]`
/// shape into `workflows[]`, tagging each with the matching category. A
/// manifest that already uses `workflows[]` is left untouched.
fn migrate_legacy_workflow_lists(doc: &mut YamlValue) -> Result<(), LoadError> {
    let YamlValue::Mapping(map) = doc else {
        return Ok(());
    };
    if map.contains_key(&YamlValue::String("workflows".to_string())) {
        return Ok(());
    }

    let mut workflows = Vec::new();
    for (key, category) in [("provisioners", WorkflowCategory::Provisioner), ("goldenpaths", WorkflowCategory::Goldenpath)] {
        if let Some(YamlValue::Sequence(entries)) = map.remove(&YamlValue::String(key.to_string())) {
            for entry in entries {
                let legacy: LegacyWorkflowRef = serde_yaml::from_value(entry).map_err(|e| LoadError::Parse(format!("malformed legacy '{key}' entry: {e}")))?;
                workflows.push(legacy.into_ref(category));
            }
        }
    }

    let workflows_value = serde_yaml::to_value(&workflows).map_err(|e| LoadError::Parse(e.to_string()))?;
    map.insert(YamlValue::String("workflows".to_string()), workflows_value);
    Ok(())
}

pub fn core_version() -> Version {
    Version::parse(env!("CARGO_PKG_VERSION")).unwrap_or(Version::new(0, 1, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODERN: &str = r#"
apiVersion: v1
kind: Provider
metadata:
  name: postgres-provider
  version: "1.0.0"
capabilities:
  resourceTypes: ["postgres"]
workflows:
  - name: provision
    file: workflows/provision.yaml
    category: provisioner
"#;

    const LEGACY: &str = r#"
apiVersion: v1
kind: Provider
metadata:
  name: postgres-provider
  version: "1.0.0"
capabilities:
  resourceTypes: ["postgres"]
provisioners:
  - name: provision
    file: workflows/provision.yaml
goldenpaths:
  - name: onboard
    file: workflows/onboard.yaml
    tags: ["starter"]
"#;

    #[test]
    fn modern_manifest_parses_as_is() {
        let manifest = parse_manifest(MODERN).unwrap();
        assert_eq!(manifest.workflows.len(), 1);
        assert_eq!(manifest.workflows[0].category, WorkflowCategory::Provisioner);
    }

    #[test]
    fn legacy_provisioners_and_goldenpaths_migrate_into_workflows() {
        let manifest = parse_manifest(LEGACY).unwrap();
        assert_eq!(manifest.workflows.len(), 2);
        assert!(manifest.find_workflow("provision").unwrap().category == WorkflowCategory::Provisioner);
        assert!(manifest.find_workflow("onboard").unwrap().category == WorkflowCategory::Goldenpath);
        assert_eq!(manifest.find_workflow("onboard").unwrap().tags, vec!["starter".to_string()]);
    }
}
