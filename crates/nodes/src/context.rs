//! The execution context threaded through a run.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::NodeError;

/// Accumulated key/value results of a run, one key per node variable name.
///
/// Owned and passed by value from node to node. The only mutation is
/// [`Context::contribute`], which writes a single key, so entries from earlier
/// nodes stay intact unless a later node reuses the same variable name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(Map<String, Value>);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or overwrite the entry for `variable_name`.
    pub fn contribute(mut self, variable_name: impl Into<String>, value: Value) -> Self {
        self.0.insert(variable_name.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Context {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Check that `name` is usable as a context key inside templates:
/// a letter or underscore followed by letters, digits or underscores.
pub fn validate_variable_name(node_label: &str, name: &str) -> Result<(), NodeError> {
    let mut chars = name.chars();
    let valid_head = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_head && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(NodeError::validation(format!(
            "{node_label}: variableName '{name}' must start with a letter or underscore \
             and contain only letters, numbers and underscores"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn contribute_only_touches_its_own_key() {
        let ctx = Context::new()
            .contribute("a", json!(1))
            .contribute("b", json!(2))
            .contribute("a", json!(3));

        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.get("a"), Some(&json!(3)));
        assert_eq!(ctx.get("b"), Some(&json!(2)));
    }

    #[test]
    fn serializes_as_a_plain_object() {
        let ctx = Context::new().contribute("ping", json!({ "status": 200 }));
        assert_eq!(
            serde_json::to_value(&ctx).unwrap(),
            json!({ "ping": { "status": 200 } })
        );
    }

    #[test]
    fn variable_names() {
        for ok in ["ping", "_x", "myApiCall2", "A_B"] {
            assert!(validate_variable_name("node", ok).is_ok(), "{ok}");
        }
        for bad in ["", "2fast", "has-dash", "with space", "dot.ted"] {
            assert!(validate_variable_name("node", bad).is_err(), "{bad}");
        }
    }
}
