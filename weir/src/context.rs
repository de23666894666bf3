//! Execution context threaded alongside data through a flow.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Key under which the per-run identifier is stored.
pub const RUN_ID_KEY: &str = "run_id";

/// Key flagging whether a flow is being finalized after a fatal failure.
pub const ERRORED_KEY: &str = "weir:errored";

/// An arbitrary key-value mapping carried beside the data payload.
///
/// Contexts are copied, not shared, when an operator's output fans out to
/// multiple successors, so each branch mutates an independent copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext {
    values: HashMap<String, Value>,
}

impl ExecutionContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Removes and returns the value stored under `key`.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Returns the run identifier, if one has been assigned.
    #[must_use]
    pub fn run_id(&self) -> Option<&str> {
        self.values.get(RUN_ID_KEY).and_then(Value::as_str)
    }

    /// Assigns a fresh run identifier if none is present, returning it.
    pub fn ensure_run_id(&mut self) -> String {
        if let Some(id) = self.run_id() {
            return id.to_string();
        }
        let id = Uuid::new_v4().to_string();
        self.values
            .insert(RUN_ID_KEY.to_string(), Value::String(id.clone()));
        id
    }

    /// Returns true if the context holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of values in the context.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Iterates over the key-value pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

impl From<HashMap<String, Value>> for ExecutionContext {
    fn from(values: HashMap<String, Value>) -> Self {
        Self { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_id_assigned_once() {
        let mut ctx = ExecutionContext::new();
        assert!(ctx.run_id().is_none());

        let first = ctx.ensure_run_id();
        let second = ctx.ensure_run_id();
        assert_eq!(first, second);
        assert_eq!(ctx.run_id(), Some(first.as_str()));
    }

    #[test]
    fn test_clone_is_independent() {
        let mut ctx = ExecutionContext::new();
        ctx.insert("shared", json!(1));

        let mut branch = ctx.clone();
        branch.insert("shared", json!(2));
        branch.insert("only-here", json!(true));

        assert_eq!(ctx.get("shared"), Some(&json!(1)));
        assert!(ctx.get("only-here").is_none());
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let mut ctx = ExecutionContext::new();
        ctx.insert("a", json!(1));
        let encoded = serde_json::to_value(&ctx).unwrap();
        assert_eq!(encoded, json!({"a": 1}));
    }
}
