// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Provider Registry
//!
//! Owns the currently-loaded set of [`ProviderManifest`]s and their
//! capability map. Reload swaps the whole snapshot atomically via
//! [`ArcSwap`] so readers never observe a half-updated registry
//! (spec.md §5 "The provider registry is read-mostly; writes (reload) swap
//! the registry atomically").

use arc_swap::ArcSwap;
use semver::Version;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::domain::provider::{ProviderError, ProviderManifest};

/// One entry per reload attempt, kept for operator visibility (spec.md §4.3
/// "Reload" has no persisted audit trail of its own; this in-memory log is
/// what an operator endpoint or CLI would surface).
#[derive(Debug, Clone)]
pub struct ReloadEvent {
    pub at: chrono::DateTime<chrono::Utc>,
    pub provider_count: usize,
    pub error: Option<String>,
}

impl ReloadEvent {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

const MAX_RELOAD_HISTORY: usize = 50;

/// An immutable, validated view of all loaded providers plus the derived
/// `resourceType -> providerName` capability map.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    pub providers: HashMap<String, ProviderManifest>,
    capability_map: HashMap<String, String>,
}

impl RegistrySnapshot {
    pub fn provider(&self, name: &str) -> Option<&ProviderManifest> {
        self.providers.get(name)
    }

    pub fn provider_for_resource_type(&self, resource_type: &str) -> Option<&ProviderManifest> {
        self.capability_map.get(resource_type).and_then(|name| self.providers.get(name))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Builds a [`RegistrySnapshot`] from a set of manifests, running the
/// validation and capability-conflict checks required before anything is
/// registered (spec.md §4.3).
pub fn build_snapshot(manifests: Vec<ProviderManifest>, core_version: &Version) -> Result<RegistrySnapshot, ProviderError> {
    let mut providers = HashMap::new();
    for manifest in manifests {
        manifest.validate_self(core_version)?;
        if providers.contains_key(&manifest.metadata.name) {
            return Err(ProviderError::DuplicateName(manifest.metadata.name.clone()));
        }
        providers.insert(manifest.metadata.name.clone(), manifest);
    }

    let mut capability_map: HashMap<String, String> = HashMap::new();
    let mut claimants: HashMap<String, Vec<String>> = HashMap::new();
    for (name, manifest) in &providers {
        for resource_type in &manifest.capabilities.resource_types {
            claimants.entry(resource_type.clone()).or_default().push(name.clone());
        }
    }
    for (resource_type, names) in &claimants {
        if names.len() > 1 {
            return Err(ProviderError::CapabilityConflict { resource_type: resource_type.clone(), claimants: names.clone() });
        }
        capability_map.insert(resource_type.clone(), names[0].clone());
    }

    Ok(RegistrySnapshot { providers, capability_map })
}

/// Thread-safe, hot-swappable registry handle. Cloned cheaply; all clones
/// share the same underlying [`ArcSwap`].
#[derive(Clone)]
pub struct ProviderRegistry {
    snapshot: Arc<ArcSwap<RegistrySnapshot>>,
    core_version: Version,
    reload_history: Arc<Mutex<Vec<ReloadEvent>>>,
}

impl ProviderRegistry {
    pub fn new(manifests: Vec<ProviderManifest>, core_version: Version) -> Result<Self, ProviderError> {
        let snapshot = build_snapshot(manifests, &core_version)?;
        info!(providers = snapshot.len(), "provider registry initialized");
        Ok(Self { snapshot: Arc::new(ArcSwap::from_pointee(snapshot)), core_version, reload_history: Arc::new(Mutex::new(Vec::new())) })
    }

    pub fn load(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.load_full()
    }

    /// Re-runs validation against a freshly-loaded manifest set and only
    /// swaps the registry if every check passes; on failure the previous
    /// registry remains in effect (spec.md §4.3 "Reload").
    pub fn reload(&self, manifests: Vec<ProviderManifest>) -> Result<(), ProviderError> {
        let result = build_snapshot(manifests, &self.core_version);
        let event = match &result {
            Ok(snapshot) => {
                info!(providers = snapshot.len(), "provider registry reloaded");
                ReloadEvent { at: chrono::Utc::now(), provider_count: snapshot.len(), error: None }
            }
            Err(e) => {
                warn!(error = %e, "provider reload rejected, previous registry retained");
                ReloadEvent { at: chrono::Utc::now(), provider_count: self.load().len(), error: Some(e.to_string()) }
            }
        };
        self.push_history(event);

        match result {
            Ok(snapshot) => {
                self.snapshot.store(Arc::new(snapshot));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn push_history(&self, event: ReloadEvent) {
        let mut history = self.reload_history.lock().unwrap_or_else(|p| p.into_inner());
        history.push(event);
        if history.len() > MAX_RELOAD_HISTORY {
            let overflow = history.len() - MAX_RELOAD_HISTORY;
            history.drain(0..overflow);
        }
    }

    /// Most recent reloads first.
    pub fn reload_history(&self) -> Vec<ReloadEvent> {
        let history = self.reload_history.lock().unwrap_or_else(|p| p.into_inner());
        history.iter().rev().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::provider::{Capabilities, CompatibilityWindow, ProviderMetadata, ProviderWorkflowRef, WorkflowCategory};

    fn manifest(name: &str, resource_types: Vec<&str>) -> ProviderManifest {
        ProviderManifest {
            api_version: "v1".into(),
            kind: "Provider".into(),
            metadata: ProviderMetadata { name: name.into(), version: "1.0.0".into(), category: None, description: None },
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

    // P3: capability disjointness.
    #[test]
    fn rejects_duplicate_resource_type_claims() {
        let manifests = vec![manifest("database-team", vec!["postgres"]), manifest("data-platform", vec!["postgres"])];
        let err = build_snapshot(manifests, &Version::new(1, 0, 0)).unwrap_err();
        assert!(matches!(err, ProviderError::CapabilityConflict { .. }));
    }

    #[test]
    fn reload_preserves_previous_registry_on_failure() {
        let registry = ProviderRegistry::new(vec![manifest("database-team", vec!["postgres"])], Version::new(1, 0, 0)).unwrap();
        let bad = vec![manifest("a", vec!["redis"]), manifest("b", vec!["redis"])];
        assert!(registry.reload(bad).is_err());
        let snapshot = registry.load();
        assert!(snapshot.provider_for_resource_type("postgres").is_some());
    }

    #[test]
    fn resolves_resource_type_to_claiming_provider() {
        let registry = ProviderRegistry::new(vec![manifest("database-team", vec!["postgres"])], Version::new(1, 0, 0)).unwrap();
        let snapshot = registry.load();
        assert_eq!(snapshot.provider_for_resource_type("postgres").unwrap().metadata.name, "database-team");
        assert!(snapshot.provider_for_resource_type("redis").is_none());
    }
}
