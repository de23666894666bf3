//! External collaborators: definition, tenant and secret stores.

mod definitions;
mod secrets;

pub use definitions::{DefinitionStore, FileDefinitionStore, FileTenantStore, TenantStore};
pub use secrets::{secret_store_from_env, EnvSecretStore, SecretStore, StaticSecretStore};
