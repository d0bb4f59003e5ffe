// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Workflow YAML parsing (spec.md §4.5, §6).
//!
//! `WorkflowDocument` already mirrors the wire shape field-for-field, so
//! parsing is a direct `serde_yaml` deserialize; this module's job is to
//! turn a parse or structural-validation failure into a `WorkflowError`
//! with the offending document identified, and to load a document from a
//! provider's source root given a [`ProviderWorkflowRef`].

use std::collections::HashSet;
use std::path::Path;

use crate::domain::provider::ProviderWorkflowRef;
use crate::domain::workflow::{WorkflowDocument, WorkflowError};
use crate::error::CoreError;

pub fn parse_workflow_yaml(raw: &str, registered_step_types: &HashSet<String>) -> Result<WorkflowDocument, WorkflowError> {
    let document: WorkflowDocument = serde_yaml::from_str(raw).map_err(|e| WorkflowError::Parse(e.to_string()))?;
    document.validate(registered_step_types)?;
    Ok(document)
}

/// Loads `<provider_source_root>/<workflow_ref.file>` and parses it
/// (spec.md §4.4 step 3, §4.7). The file path is provider-relative so a
/// provider cannot reference workflow files outside its own source root.
pub async fn load_workflow_file(provider_source_root: &str, workflow_ref: &ProviderWorkflowRef, registered_step_types: &HashSet<String>) -> Result<WorkflowDocument, WorkflowError> {
    let path = Path::new(provider_source_root).join(&workflow_ref.file);
    let raw = tokio::fs::read_to_string(&path).await.map_err(|e| WorkflowError::Parse(format!("failed to read workflow file {}: {e}", path.display())))?;
    parse_workflow_yaml(&raw, registered_step_types)
}

/// [`application::engine::WorkflowLoader`] wired to the local filesystem,
/// against whichever step types the running process has registered.
pub struct FileWorkflowLoader {
    registered_step_types: HashSet<String>,
}

impl FileWorkflowLoader {
    pub fn new(registered_step_types: HashSet<String>) -> Self {
        Self { registered_step_types }
    }
}

#[async_trait::async_trait]
impl crate::application::engine::WorkflowLoader for FileWorkflowLoader {
    async fn load(&self, provider_source_root: &str, workflow_ref: &ProviderWorkflowRef) -> Result<WorkflowDocument, CoreError> {
        load_workflow_file(provider_source_root, workflow_ref, &self.registered_step_types).await.map_err(CoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
apiVersion: innominatus.io/v1alpha1
kind: Workflow
metadata:
  name: provision-postgres
parameters:
  - name: version
    type: string
    required: true
steps:
  - name: apply
    type: terraform
    config:
      module: postgres
"#;

    #[test]
    fn parses_a_well_formed_workflow_document() {
        let doc = parse_workflow_yaml(VALID, &HashSet::new()).unwrap();
        assert_eq!(doc.metadata.name, "provision-postgres");
        assert_eq!(doc.steps.len(), 1);
    }

    #[test]
    fn malformed_yaml_surfaces_as_parse_error() {
        let err = parse_workflow_yaml("not valid: [yaml", &HashSet::new()).unwrap_err();
        assert!(matches!(err, WorkflowError::Parse(_)));
    }

    #[test]
    fn structural_violations_surface_through_validate() {
        let missing_steps = VALID.replace("steps:\n  - name: apply\n    type: terraform\n    config:\n      module: postgres\n", "steps: []\n");
        let err = parse_workflow_yaml(&missing_steps, &HashSet::new()).unwrap_err();
        assert!(matches!(err, WorkflowError::NoSteps));
    }
}
