//! Execution context
//!
//! A key/value bag accumulated during one run. Node outputs land under
//! `<nodeId>_output` and `lastOutput`; run-scoped identifiers (claim id,
//! member id) are seeded at start.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key holding the most recent node output
pub const LAST_OUTPUT: &str = "lastOutput";
/// Key holding the run's execution id
pub const EXECUTION_ID: &str = "executionId";
pub const CLAIM_ID: &str = "claimId";
pub const MEMBER_ID: &str = "memberId";

const OUTPUT_SUFFIX: &str = "_output";

/// Context key for a node's output
pub fn output_key(node_id: &str) -> String {
    format!("{}{}", node_id, OUTPUT_SUFFIX)
}

/// Values seeded into a fresh context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutionSeed {
    pub claim_id: Option<String>,
    pub member_id: Option<String>,
    /// Additional run variables
    pub variables: Map<String, Value>,
}

impl ExecutionSeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(mut self, claim_id: impl Into<String>) -> Self {
        self.claim_id = Some(claim_id.into());
        self
    }

    pub fn member(mut self, member_id: impl Into<String>) -> Self {
        self.member_id = Some(member_id.into());
        self
    }

    pub fn var(mut self, key: impl Into<String>, value: Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }
}

/// Mutable accumulator for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    variables: Map<String, Value>,
}

impl ExecutionContext {
    /// Create a context holding only the execution id
    pub fn new(execution_id: &str) -> Self {
        let mut variables = Map::new();
        variables.insert(EXECUTION_ID.to_string(), Value::String(execution_id.to_string()));
        Self { variables }
    }

    /// Create a context seeded with run identifiers and variables
    pub fn seeded(execution_id: &str, seed: &ExecutionSeed) -> Self {
        let mut context = Self::new(execution_id);
        for (key, value) in &seed.variables {
            context.set(key.clone(), value.clone());
        }
        if let Some(claim_id) = &seed.claim_id {
            context.set(CLAIM_ID, Value::String(claim_id.clone()));
        }
        if let Some(member_id) = &seed.member_id {
            context.set(MEMBER_ID, Value::String(member_id.clone()));
        }
        context
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.variables.insert(key.into(), value);
    }

    /// Exact key lookup
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.lookup(key).and_then(Value::as_str)
    }

    /// Resolve a condition field
    ///
    /// Tries the exact key, then a dotted path (`lastOutput.amount`,
    /// `doc_output.codes.0`), then the same path inside `lastOutput`.
    pub fn lookup(&self, field: &str) -> Option<&Value> {
        if let Some(value) = self.variables.get(field) {
            return Some(value);
        }
        if let Some(value) = resolve_path(&self.variables, field) {
            return Some(value);
        }
        match self.variables.get(LAST_OUTPUT) {
            Some(Value::Object(last)) => resolve_path(last, field),
            _ => None,
        }
    }

    /// Merge a node's output under `<nodeId>_output` and `lastOutput`
    pub fn record_output(&mut self, node_id: &str, output: Value) {
        self.variables.insert(output_key(node_id), output.clone());
        self.variables.insert(LAST_OUTPUT.to_string(), output);
    }

    pub fn output_of(&self, node_id: &str) -> Option<&Value> {
        self.variables.get(&output_key(node_id))
    }

    pub fn last_output(&self) -> Option<&Value> {
        self.variables.get(LAST_OUTPUT)
    }

    /// Number of node outputs recorded so far
    pub fn recorded_outputs(&self) -> usize {
        self.variables
            .keys()
            .filter(|k| k.ends_with(OUTPUT_SUFFIX))
            .count()
    }

    pub fn execution_id(&self) -> Option<&str> {
        self.variables.get(EXECUTION_ID).and_then(Value::as_str)
    }

    pub fn claim_id(&self) -> Option<&str> {
        self.variables.get(CLAIM_ID).and_then(Value::as_str)
    }

    pub fn member_id(&self) -> Option<&str> {
        self.variables.get(MEMBER_ID).and_then(Value::as_str)
    }

    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    /// Owned copy for log entries
    pub fn snapshot(&self) -> Value {
        Value::Object(self.variables.clone())
    }
}

fn resolve_path<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = root.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_seeded_context() {
        let seed = ExecutionSeed::new()
            .claim("CLM-1")
            .member("MBR-9")
            .var("amount", json!(5000));
        let context = ExecutionContext::seeded("exec-1", &seed);

        assert_eq!(context.execution_id(), Some("exec-1"));
        assert_eq!(context.claim_id(), Some("CLM-1"));
        assert_eq!(context.member_id(), Some("MBR-9"));
        assert_eq!(context.get("amount"), Some(&json!(5000)));
    }

    #[test]
    fn test_record_output() {
        let mut context = ExecutionContext::new("exec-1");
        context.record_output("a", json!({ "x": 1 }));
        context.record_output("b", json!({ "y": 2 }));

        assert_eq!(context.output_of("a"), Some(&json!({ "x": 1 })));
        assert_eq!(context.last_output(), Some(&json!({ "y": 2 })));
        assert_eq!(context.recorded_outputs(), 2);
    }

    #[test]
    fn test_lookup_order() {
        let mut context = ExecutionContext::new("exec-1");
        context.set("score", json!(1));
        context.record_output("doc", json!({ "score": 2, "fields": { "codes": ["99213", "E11.9"] } }));

        assert_eq!(context.lookup("score"), Some(&json!(1)));
        assert_eq!(context.lookup("doc_output.fields.codes.1"), Some(&json!("E11.9")));
        assert_eq!(context.lookup("fields.codes.0"), Some(&json!("99213")));
        assert_eq!(context.lookup("missing.path"), None);
    }
}
