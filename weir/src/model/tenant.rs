//! Tenant profiles: per-tenant variable namespaces.

use crate::vars::Variables;
use serde::{Deserialize, Serialize};

/// A tenant's configuration: a two-level mapping of variable namespaces
/// (e.g. `environment`, `secrets`) to key-value pairs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantProfile {
    /// The tenant's name.
    pub name: String,
    /// The tenant's variable namespaces.
    #[serde(default)]
    pub variables: Variables,
}

impl TenantProfile {
    /// Creates a named profile with the given variables.
    #[must_use]
    pub const fn new(name: String, variables: Variables) -> Self {
        Self { name, variables }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserializes_namespaced_variables() {
        let profile: TenantProfile = serde_json::from_value(json!({
            "name": "acme",
            "variables": {
                "environment": {"bucket": "acme-landing"},
                "secrets": {"api_key": "ACME_API_KEY"},
            },
        }))
        .unwrap();

        assert_eq!(profile.name, "acme");
        assert_eq!(
            profile.variables["environment"]["bucket"],
            json!("acme-landing")
        );
    }
}
