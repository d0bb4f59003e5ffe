// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Resolver
//!
//! Maps a resource type string to `(provider, provisioner workflow)`
//! (spec.md §4.4). The algorithm itself is pure; it only reads the current
//! registry snapshot.

use crate::application::registry::ProviderRegistry;
use crate::domain::provider::{ProviderError, ProviderManifest, ProviderWorkflowRef, WorkflowCategory};

#[derive(Clone)]
pub struct Resolver {
    registry: ProviderRegistry,
}

impl Resolver {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    /// `ResolveProviderForResource` (spec.md §4.4). `workflow_override`, when
    /// set, is interpreted as `<provider>/<workflow>` and bypasses the
    /// capability map entirely; `workflow_tags` narrows the provisioner
    /// choice to those matching at least one tag.
    pub fn resolve(&self, resource_type: &str, workflow_override: Option<&str>, workflow_tags: &[String]) -> Result<(ProviderManifest, ProviderWorkflowRef), ProviderError> {
        let snapshot = self.registry.load();

        if let Some(override_spec) = workflow_override {
            let (provider_name, workflow_name) =
                override_spec.split_once('/').ok_or_else(|| ProviderError::InvalidManifest(format!("workflow_override '{override_spec}' must be '<provider>/<workflow>'")))?;
            let provider = snapshot.provider(provider_name).ok_or_else(|| ProviderError::NoProvider(provider_name.to_string()))?;
            let workflow = provider
                .find_workflow(workflow_name)
                .filter(|w| w.category == WorkflowCategory::Provisioner)
                .ok_or_else(|| ProviderError::NoProvisioner { provider: provider_name.to_string() })?;
            return Ok((provider.clone(), workflow.clone()));
        }

        let provider = snapshot.provider_for_resource_type(resource_type).ok_or_else(|| ProviderError::NoProvider(resource_type.to_string()))?;
        let workflow = provider.first_provisioner(workflow_tags).ok_or_else(|| ProviderError::NoProvisioner { provider: provider.metadata.name.clone() })?;
        Ok((provider.clone(), workflow.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::provider::{Capabilities, CompatibilityWindow, ProviderMetadata, WorkflowCategory};
    use semver::Version;

    fn manifest(name: &str, resource_types: Vec<&str>, workflows: Vec<ProviderWorkflowRef>) -> ProviderManifest {
        ProviderManifest {
            api_version: "v1".into(),
            kind: "Provider".into(),
            metadata: ProviderMetadata { name: name.into(), version: "1.0.0".into(), category: None, description: None },
            compatibility: CompatibilityWindow::default(),
            capabilities: Capabilities { resource_types: resource_types.into_iter().map(String::from).collect() },
            workflows,
            source_root: None,
        }
    }

    fn provisioner(name: &str) -> ProviderWorkflowRef {
        ProviderWorkflowRef { name: name.into(), file: format!("workflows/{name}.yaml"), version: None, description: None, category: WorkflowCategory::Provisioner, tags: vec![] }
    }

    #[test]
    fn resolves_via_capability_map() {
        let registry = ProviderRegistry::new(vec![manifest("database-team", vec!["postgres"], vec![provisioner("provision")])], Version::new(1, 0, 0)).unwrap();
        let resolver = Resolver::new(registry);
        let (provider, workflow) = resolver.resolve("postgres", None, &[]).unwrap();
        assert_eq!(provider.metadata.name, "database-team");
        assert_eq!(workflow.name, "provision");
    }

    #[test]
    fn missing_provider_yields_no_provider() {
        let registry = ProviderRegistry::new(vec![manifest("database-team", vec!["postgres"], vec![provisioner("provision")])], Version::new(1, 0, 0)).unwrap();
        let resolver = Resolver::new(registry);
        assert!(matches!(resolver.resolve("redis", None, &[]), Err(ProviderError::NoProvider(_))));
    }

    #[test]
    fn provider_with_no_provisioner_workflow_yields_no_provisioner() {
        let goldenpath = ProviderWorkflowRef { name: "demo".into(), file: "workflows/demo.yaml".into(), version: None, description: None, category: WorkflowCategory::Goldenpath, tags: vec![] };
        let registry = ProviderRegistry::new(vec![manifest("database-team", vec!["postgres"], vec![goldenpath])], Version::new(1, 0, 0)).unwrap();
        let resolver = Resolver::new(registry);
        assert!(matches!(resolver.resolve("postgres", None, &[]), Err(ProviderError::NoProvisioner { .. })));
    }

    #[test]
    fn workflow_override_bypasses_capability_map() {
        let registry = ProviderRegistry::new(vec![manifest("database-team", vec!["postgres"], vec![provisioner("provision-ha")])], Version::new(1, 0, 0)).unwrap();
        let resolver = Resolver::new(registry);
        let (provider, workflow) = resolver.resolve("unrelated-type", Some("database-team/provision-ha"), &[]).unwrap();
        assert_eq!(provider.metadata.name, "database-team");
        assert_eq!(workflow.name, "provision-ha");
    }

    #[test]
    fn workflow_override_pointing_at_a_goldenpath_is_rejected() {
        let goldenpath = ProviderWorkflowRef { name: "demo".into(), file: "workflows/demo.yaml".into(), version: None, description: None, category: WorkflowCategory::Goldenpath, tags: vec![] };
        let registry = ProviderRegistry::new(vec![manifest("database-team", vec!["postgres"], vec![provisioner("provision"), goldenpath])], Version::new(1, 0, 0)).unwrap();
        let resolver = Resolver::new(registry);
        assert!(matches!(resolver.resolve("unrelated-type", Some("database-team/demo"), &[]), Err(ProviderError::NoProvisioner { .. })));
    }
}
