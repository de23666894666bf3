//! Pipeline definition and tenant stores.
//!
//! File-backed stores read one JSON document per name from a directory.
//! Cloud backends remain future work behind the same traits.

use crate::errors::{DefinitionError, WeirError};
use crate::model::{PipelineDefinition, TenantProfile};
use crate::vars::Variables;
use std::path::PathBuf;

/// Loads pipeline definitions by flow name.
pub trait DefinitionStore: Send + Sync {
    /// Loads one pipeline definition.
    ///
    /// # Errors
    ///
    /// Returns an error when the definition is absent or unparseable.
    fn get(&self, flow_name: &str) -> Result<PipelineDefinition, WeirError>;
}

/// Loads tenant profiles by tenant name.
pub trait TenantStore: Send + Sync {
    /// Loads one tenant profile.
    ///
    /// # Errors
    ///
    /// Returns an error when the profile is absent or unparseable.
    fn get(&self, tenant_name: &str) -> Result<TenantProfile, WeirError>;
}

/// Names map to files; dots would escape the store directory.
fn check_name(kind: &str, name: &str) -> Result<(), WeirError> {
    if name.contains('.') {
        return Err(DefinitionError::DottedName {
            kind: kind.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Definition store reading `<root>/<flow_name>.json`.
#[derive(Debug, Clone)]
pub struct FileDefinitionStore {
    root: PathBuf,
}

impl FileDefinitionStore {
    /// Creates a store rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DefinitionStore for FileDefinitionStore {
    fn get(&self, flow_name: &str) -> Result<PipelineDefinition, WeirError> {
        check_name("flow", flow_name)?;
        let path = self.root.join(format!("{flow_name}.json"));
        let document = std::fs::read_to_string(&path)?;
        PipelineDefinition::from_json(&document)
    }
}

/// Tenant store reading `<root>/<tenant_name>.json`.
#[derive(Debug, Clone)]
pub struct FileTenantStore {
    root: PathBuf,
}

impl FileTenantStore {
    /// Creates a store rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TenantStore for FileTenantStore {
    fn get(&self, tenant_name: &str) -> Result<TenantProfile, WeirError> {
        check_name("tenant", tenant_name)?;
        let path = self.root.join(format!("{tenant_name}.json"));
        let document = std::fs::read_to_string(&path)?;
        let variables: Variables = serde_json::from_str(&document)
            .map_err(|err| DefinitionError::Parse(err.to_string()))?;
        Ok(TenantProfile::new(tenant_name.to_string(), variables))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn write_file(dir: &std::path::Path, name: &str, content: &str) {
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_file_definition_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "example.json",
            &json!({
                "name": "example",
                "tenant": "acme",
                "steps": [
                    {"name": "load", "uses": "internal/read@latest", "config": {"path": "data.jsonl"}},
                ],
            })
            .to_string(),
        );

        let store = FileDefinitionStore::new(dir.path());
        let definition = store.get("example").unwrap();
        assert_eq!(definition.name.as_deref(), Some("example"));
        assert_eq!(definition.steps.len(), 1);
        assert_eq!(definition.steps[0].uses, "internal/read@latest");
    }

    #[test]
    fn test_dotted_names_are_rejected() {
        let store = FileDefinitionStore::new("definitions");
        let err = store.get("../../etc/passwd").unwrap_err();
        assert!(matches!(
            err,
            WeirError::Definition(DefinitionError::DottedName { .. })
        ));
    }

    #[test]
    fn test_missing_definition_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDefinitionStore::new(dir.path());
        assert!(store.get("absent").is_err());
    }

    #[test]
    fn test_file_tenant_store_loads_variables() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "acme.json",
            &json!({
                "environment": {"bucket": "acme-landing"},
                "secrets": {"api_key": "ACME_API_KEY"},
            })
            .to_string(),
        );

        let store = FileTenantStore::new(dir.path());
        let profile = store.get("acme").unwrap();
        assert_eq!(profile.name, "acme");
        assert_eq!(
            profile.variables["environment"]["bucket"],
            json!("acme-landing")
        );
    }
}
