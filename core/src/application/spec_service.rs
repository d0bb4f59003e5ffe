// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Spec submission use case.
//!
//! Submitting a spec validates it, upserts the row (replacing a prior
//! submission of the same name), inserts/updates its declared resources,
//! and records the `spec --contains--> resource` graph edges
//! (spec.md §3, §4.8).

use std::sync::Arc;
use tracing::info;

use crate::application::graph_service::GraphService;
use crate::domain::repository::{ResourceRepository, SpecRepository};
use crate::domain::resource::{NewResource, ResourceTypeClass};
use crate::domain::spec::{NewSpec, Spec, SpecError};
use crate::error::CoreError;

pub struct SpecService {
    specs: Arc<dyn SpecRepository>,
    resources: Arc<dyn ResourceRepository>,
    graph: Arc<GraphService>,
}

impl SpecService {
    pub fn new(specs: Arc<dyn SpecRepository>, resources: Arc<dyn ResourceRepository>, graph: Arc<GraphService>) -> Self {
        Self { specs, resources, graph }
    }

    pub async fn submit(&self, new_spec: NewSpec) -> Result<Spec, CoreError> {
        new_spec.validate().map_err(CoreError::from)?;

        let resource_decls: Vec<(String, crate::domain::spec::ResourceDecl)> = new_spec.document.resources.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let app_name = new_spec.name.clone();
        let spec = self.specs.upsert(new_spec).await.map_err(CoreError::from)?;

        for (resource_name, decl) in &resource_decls {
            let type_class = if decl.is_delegated() { ResourceTypeClass::Delegated } else { ResourceTypeClass::Native };
            let new_resource = NewResource {
                spec_id: spec.id,
                app_name: app_name.clone(),
                resource_name: resource_name.clone(),
                resource_type: decl.resource_type.clone(),
                properties: decl.properties.clone(),
                type_class,
                reference_url: None,
                workflow_override: decl.provider.clone(),
                workflow_tags: Vec::new(),
            };
            if let Err(e) = self.resources.insert(new_resource).await {
                info!(app = %app_name, resource = %resource_name, error = %e, "resource already declared, skipping insert on resubmission");
            }
        }

        let resource_names: Vec<String> = resource_decls.into_iter().map(|(name, _)| name).collect();
        self.graph.record_spec(&app_name, &resource_names).await;

        Ok(spec)
    }

    pub async fn delete(&self, name: &str) -> Result<(), CoreError> {
        let spec = self.specs.find_by_name(name).await.map_err(CoreError::from)?.ok_or_else(|| CoreError::new(crate::error::ErrorCode::ResourceNotFound, format!("spec '{name}' not found")))?;
        self.specs.delete(spec.id).await.map_err(CoreError::from)
    }

    pub async fn validate_only(&self, new_spec: &NewSpec) -> Result<(), SpecError> {
        new_spec.validate()
    }
}
