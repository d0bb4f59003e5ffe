// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Score spec YAML parsing (spec.md §6).
//!
//! Translates the external Score document into [`NewSpec`]. Validation of
//! the parsed document (apiVersion, delegated-resource invariants, ...)
//! happens in the domain layer (`NewSpec::validate`) — this module's job
//! is purely YAML → struct.

use crate::domain::spec::{NewSpec, ScoreDocument, SpecError};

pub fn parse_score_yaml(raw: &str, submitted_by: &str, team: Option<String>) -> Result<NewSpec, SpecError> {
    let document: ScoreDocument = serde_yaml::from_str(raw).map_err(|e| SpecError::Parse(e.to_string()))?;
    let name = document.metadata.name.clone();
    Ok(NewSpec { name, document, team, submitted_by: submitted_by.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
apiVersion: score.dev/v1b1
metadata:
  name: api-1
containers:
  web:
    image: nginx:1.25
resources:
  db:
    type: postgres
    properties:
      version: "15"
"#;

    #[test]
    fn parses_a_well_formed_score_document() {
        let spec = parse_score_yaml(VALID, "alice", None).unwrap();
        assert_eq!(spec.name, "api-1");
        assert_eq!(spec.document.resources.get("db").unwrap().resource_type, "postgres");
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn malformed_yaml_surfaces_as_parse_error() {
        let err = parse_score_yaml("not: [valid, yaml: :", "alice", None).unwrap_err();
        assert!(matches!(err, SpecError::Parse(_)));
    }
}
