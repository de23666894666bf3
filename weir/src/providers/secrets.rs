//! Secret stores.

use crate::errors::{VariableError, WeirError};
use std::collections::HashMap;

/// Looks up secret values by name.
pub trait SecretStore: Send + Sync {
    /// Retrieves the value of a secret.
    ///
    /// # Errors
    ///
    /// Returns [`VariableError::MissingSecret`] when the secret is absent.
    fn get(&self, name: &str) -> Result<String, WeirError>;
}

/// Secret store backed by process environment variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn get(&self, name: &str) -> Result<String, WeirError> {
        std::env::var(name).map_err(|_| {
            VariableError::MissingSecret {
                name: name.to_string(),
            }
            .into()
        })
    }
}

/// In-memory secret store, for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct StaticSecretStore {
    secrets: HashMap<String, String>,
}

impl StaticSecretStore {
    /// Creates a store holding the given secrets.
    #[must_use]
    pub fn new(secrets: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            secrets: secrets.into_iter().collect(),
        }
    }
}

impl SecretStore for StaticSecretStore {
    fn get(&self, name: &str) -> Result<String, WeirError> {
        self.secrets.get(name).cloned().ok_or_else(|| {
            VariableError::MissingSecret {
                name: name.to_string(),
            }
            .into()
        })
    }
}

/// Selects a secret store implementation.
///
/// `SECRETS_BACKEND` takes priority; otherwise an `ENVIRONMENT` of `dev`
/// or `local` selects the environment-variable store. Cloud backends are
/// future work and fail as unsupported.
///
/// # Errors
///
/// Returns an error for unsupported backends.
pub fn secret_store_from_env(backend: Option<&str>) -> Result<Box<dyn SecretStore>, WeirError> {
    let from_env = std::env::var("SECRETS_BACKEND").ok();
    let backend = backend.map(String::from).or(from_env).or_else(|| {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "local".to_string());
        matches!(environment.to_lowercase().as_str(), "dev" | "local").then(|| "env".to_string())
    });

    match backend.as_deref() {
        Some("env") => Ok(Box::new(EnvSecretStore)),
        other => Err(WeirError::Step(format!(
            "unsupported secrets backend: '{}'",
            other.unwrap_or("none")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_store_lookup() {
        let store = StaticSecretStore::new([("KEY".to_string(), "value".to_string())]);
        assert_eq!(store.get("KEY").unwrap(), "value");
        assert!(store.get("MISSING").is_err());
    }

    #[test]
    fn test_env_store_reads_process_environment() {
        std::env::set_var("WEIR_TEST_SECRET", "from-env");
        assert_eq!(EnvSecretStore.get("WEIR_TEST_SECRET").unwrap(), "from-env");
        std::env::remove_var("WEIR_TEST_SECRET");
        assert!(EnvSecretStore.get("WEIR_TEST_SECRET").is_err());
    }

    #[test]
    fn test_factory_selects_env_backend() {
        assert!(secret_store_from_env(Some("env")).is_ok());
        assert!(secret_store_from_env(Some("hashi")).is_err());
    }
}
