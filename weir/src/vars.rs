//! `{{namespace.key}}` template substitution for step configuration.
//!
//! Values are looked up in a two-level mapping `namespace -> key -> value`.
//! The `secrets` namespace is special: its values are secret *names*,
//! indirected through a [`SecretStore`] so the secret material never lives
//! in tenant files.

use crate::errors::{VariableError, WeirError};
use crate::providers::SecretStore;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Namespaced variables: `namespace -> key -> value`.
pub type Variables = HashMap<String, HashMap<String, Value>>;

/// The namespace that indirects through the secret store.
pub const SECRETS_NAMESPACE: &str = "secrets";

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(r"\{\{\s*(\w+)\.(\w+)\s*\}\}").unwrap()
    })
}

/// Recursively resolves placeholders in a config structure, preserving its
/// shape: objects and arrays are walked, strings are substituted, other
/// values pass through unchanged.
///
/// # Errors
///
/// Returns a [`VariableError`] when a referenced namespace, key or secret
/// is absent.
pub fn resolve_value(
    value: &Value,
    variables: &Variables,
    secrets: &dyn SecretStore,
) -> Result<Value, WeirError> {
    match value {
        Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, entry) in map {
                resolved.insert(key.clone(), resolve_value(entry, variables, secrets)?);
            }
            Ok(Value::Object(resolved))
        }
        Value::Array(items) => {
            let resolved: Result<Vec<Value>, WeirError> = items
                .iter()
                .map(|item| resolve_value(item, variables, secrets))
                .collect();
            Ok(Value::Array(resolved?))
        }
        Value::String(text) => Ok(Value::String(resolve_text(text, variables, secrets)?)),
        other => Ok(other.clone()),
    }
}

fn resolve_text(
    text: &str,
    variables: &Variables,
    secrets: &dyn SecretStore,
) -> Result<String, WeirError> {
    let pattern = placeholder_pattern();
    let mut resolved = String::with_capacity(text.len());
    let mut last_end = 0;

    for captures in pattern.captures_iter(text) {
        let whole = captures.get(0).ok_or_else(|| {
            WeirError::Step("placeholder match without a capture".to_string())
        })?;
        let namespace = &captures[1];
        let key = &captures[2];

        let value = variables
            .get(namespace)
            .and_then(|entries| entries.get(key))
            .ok_or_else(|| VariableError::MissingVariable {
                namespace: namespace.to_string(),
                key: key.to_string(),
            })?;

        resolved.push_str(&text[last_end..whole.start()]);
        if namespace == SECRETS_NAMESPACE {
            let secret_name = value.as_str().map_or_else(|| value.to_string(), String::from);
            resolved.push_str(&secrets.get(&secret_name)?);
        } else {
            match value {
                Value::String(s) => resolved.push_str(s),
                other => resolved.push_str(&other.to_string()),
            }
        }
        last_end = whole.end();
    }

    resolved.push_str(&text[last_end..]);
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::StaticSecretStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn variables() -> Variables {
        let mut vars = Variables::new();
        vars.insert(
            "environment".to_string(),
            HashMap::from([
                ("bucket".to_string(), json!("acme-landing")),
                ("retries".to_string(), json!(3)),
            ]),
        );
        vars.insert(
            "secrets".to_string(),
            HashMap::from([("api_key".to_string(), json!("ACME_API_KEY"))]),
        );
        vars
    }

    fn secrets() -> StaticSecretStore {
        StaticSecretStore::new([("ACME_API_KEY".to_string(), "s3cr3t".to_string())])
    }

    #[test]
    fn test_substitutes_in_nested_structures() {
        let config = json!({
            "target": "gs://{{environment.bucket}}/raw",
            "attempts": "{{ environment.retries }}",
            "nested": [{"key": "{{secrets.api_key}}"}],
            "untouched": 42,
        });

        let resolved = resolve_value(&config, &variables(), &secrets()).unwrap();
        assert_eq!(
            resolved,
            json!({
                "target": "gs://acme-landing/raw",
                "attempts": "3",
                "nested": [{"key": "s3cr3t"}],
                "untouched": 42,
            })
        );
    }

    #[test]
    fn test_missing_namespace_fails() {
        let config = json!("{{nowhere.key}}");
        let err = resolve_value(&config, &variables(), &secrets()).unwrap_err();
        assert!(matches!(
            err,
            WeirError::Variable(VariableError::MissingVariable { .. })
        ));
    }

    #[test]
    fn test_missing_key_fails() {
        let config = json!("{{environment.missing}}");
        assert!(resolve_value(&config, &variables(), &secrets()).is_err());
    }

    #[test]
    fn test_missing_secret_fails() {
        let empty = StaticSecretStore::new([]);
        let config = json!("{{secrets.api_key}}");
        let err = resolve_value(&config, &variables(), &empty).unwrap_err();
        assert!(matches!(
            err,
            WeirError::Variable(VariableError::MissingSecret { .. })
        ));
    }

    #[test]
    fn test_plain_strings_pass_through() {
        let config = json!("no placeholders here");
        let resolved = resolve_value(&config, &variables(), &secrets()).unwrap();
        assert_eq!(resolved, config);
    }
}
