// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! State Reducer (C1).
//!
//! Applies immutable updates to workflow state. Field policies are declared
//! statically alongside the state schema rather than discovered through
//! runtime reflection/attributes — see `FieldSchema`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// How a field combines its current value with an incoming delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldPolicy {
    /// `s'.f = d.f` (default).
    Replace,
    /// `s'.f = s.f ++ d.f_items`, preserving insertion order.
    Append,
    /// For each `(k, v)` in `d.f`, `s'.f[k] = v` (last-write-wins).
    Merge,
}

/// Static declaration of a state type's field policies, keyed by field name.
///
/// Built once per workflow state type and shared by every reduction.
#[derive(Debug, Clone, Default)]
pub struct FieldSchema {
    policies: HashMap<String, FieldPolicy>,
}

impl FieldSchema {
    /// Start an empty schema (every undeclared field reduction fails).
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field's policy. Returns `self` for fluent construction.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, policy: FieldPolicy) -> Self {
        self.policies.insert(name.into(), policy);
        self
    }

    /// Look up a field's declared policy.
    pub fn policy_of(&self, field: &str) -> Option<FieldPolicy> {
        self.policies.get(field).copied()
    }
}

/// An immutable snapshot of workflow state plus its monotonic version.
///
/// `fields` holds arbitrary user data as JSON; `version` increases by one on
/// every successful reduction and is never reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Unique identifier for the workflow instance this state belongs to.
    pub workflow_id: String,
    /// Monotonically increasing snapshot version.
    pub version: u64,
    /// Arbitrary user fields, keyed by name.
    pub fields: HashMap<String, Value>,
}

impl WorkflowState {
    /// Create the initial (version 0) snapshot for a workflow instance.
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            version: 0,
            fields: HashMap::new(),
        }
    }

    /// Read a field, deserializing it into `T`. Returns `None` if absent.
    pub fn get<T: for<'de> Deserialize<'de>>(&self, field: &str) -> Option<T> {
        self.fields
            .get(field)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// A proposed update to apply to a `WorkflowState`.
///
/// `replace`/`merge` fields carry the raw incoming value; `append` fields
/// carry the sequence of items to push, not the full resulting array.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delta {
    /// Field name -> new value (for `Replace` fields) or items to append
    /// (for `Append` fields, expected to be a JSON array) or a map of
    /// updates (for `Merge` fields, expected to be a JSON object).
    pub values: HashMap<String, Value>,
}

impl Delta {
    /// An empty delta (no-op when reduced).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or append/merge, per the field's policy) a single field's value.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.values.insert(field.into(), value);
        self
    }
}

/// Pure, side-effect-free reduction of a state snapshot against a schema.
///
/// `reduce(s, d)` never mutates `s`; it returns a new snapshot `s'` with
/// `version = s.version + 1` whenever `d` is non-empty, or `s` unchanged
/// (same version) when `d` is empty.
pub fn reduce(state: &WorkflowState, delta: &Delta, schema: &FieldSchema) -> Result<WorkflowState> {
    if delta.values.is_empty() {
        return Ok(state.clone());
    }

    let mut fields = state.fields.clone();

    for (field, incoming) in &delta.values {
        let policy = schema
            .policy_of(field)
            .ok_or_else(|| Error::SchemaViolation(format!("field '{field}' not in schema")))?;

        match policy {
            FieldPolicy::Replace => {
                fields.insert(field.clone(), incoming.clone());
            }
            FieldPolicy::Append => {
                let items = incoming.as_array().ok_or_else(|| {
                    Error::SchemaViolation(format!(
                        "field '{field}' declared Append but delta is not a JSON array"
                    ))
                })?;
                if items.is_empty() {
                    continue;
                }
                let entry = fields
                    .entry(field.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                let arr = entry.as_array_mut().ok_or_else(|| {
                    Error::SchemaViolation(format!(
                        "field '{field}' declared Append but existing value is not a JSON array"
                    ))
                })?;
                arr.extend(items.iter().cloned());
            }
            FieldPolicy::Merge => {
                let updates = incoming.as_object().ok_or_else(|| {
                    Error::SchemaViolation(format!(
                        "field '{field}' declared Merge but delta is not a JSON object"
                    ))
                })?;
                let entry = fields
                    .entry(field.clone())
                    .or_insert_with(|| Value::Object(serde_json::Map::new()));
                let map = entry.as_object_mut().ok_or_else(|| {
                    Error::SchemaViolation(format!(
                        "field '{field}' declared Merge but existing value is not a JSON object"
                    ))
                })?;
                for (k, v) in updates {
                    map.insert(k.clone(), v.clone());
                }
            }
        }
    }

    Ok(WorkflowState {
        workflow_id: state.workflow_id.clone(),
        version: state.version + 1,
        fields,
    })
}
