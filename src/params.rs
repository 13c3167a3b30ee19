// src/params.rs

//! Task parameters as a JSON object tree.
//!
//! Operators receive their parameters as one nested mapping. `Params` wraps a
//! `serde_json::Map` and adds the two merge flavours the operators need:
//! [`Params::merge_default`] (fill in missing keys) and [`Params::merge`]
//! (override keys). Both recurse into nested objects.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{Result, TaskExecError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(Map<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(TaskExecError::ConfigError(format!(
                "expected parameters to be a mapping, got {}",
                type_name(&other)
            ))),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(|v| !v.is_null())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Optional string parameter. Present-but-not-a-string is a config error.
    pub fn get_str(&self, key: &str) -> Result<Option<&str>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(TaskExecError::ConfigError(format!(
                "parameter '{}' must be a string, got {}",
                key,
                type_name(other)
            ))),
        }
    }

    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.get_str(key)?.ok_or_else(|| {
            TaskExecError::ConfigError(format!("parameter '{}' is required", key))
        })
    }

    /// Nested mapping under `key`, or an empty mapping when absent.
    ///
    /// A present value that is not a mapping is also treated as empty; this
    /// matches how operator-scoped sections (`batch`, `script`) are optional.
    pub fn nested_or_empty(&self, key: &str) -> Params {
        match self.0.get(key) {
            Some(Value::Object(map)) => Params(map.clone()),
            _ => Params::default(),
        }
    }

    /// Nested mapping under `key`; missing or non-mapping is a config error.
    pub fn nested(&self, key: &str) -> Result<Params> {
        match self.0.get(key) {
            Some(Value::Object(map)) => Ok(Params(map.clone())),
            None | Some(Value::Null) => Err(TaskExecError::ConfigError(format!(
                "parameter '{}' is required",
                key
            ))),
            Some(other) => Err(TaskExecError::ConfigError(format!(
                "parameter '{}' must be a mapping, got {}",
                key,
                type_name(other)
            ))),
        }
    }

    /// Return a copy where keys missing from `self` are filled from
    /// `defaults`. Existing keys win.
    pub fn merge_default(&self, defaults: &Params) -> Params {
        let mut out = defaults.0.clone();
        deep_merge(&mut out, &self.0);
        Params(out)
    }

    /// Return a copy where keys from `other` override keys in `self`.
    pub fn merge(&self, other: &Params) -> Params {
        let mut out = self.0.clone();
        deep_merge(&mut out, &other.0);
        Params(out)
    }

    /// Look up a dotted path like `"db.host"`.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.0.get(first)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Merge `src` into `dst`; `src` wins on scalar conflicts, objects recurse.
fn deep_merge(dst: &mut Map<String, Value>, src: &Map<String, Value>) {
    for (key, value) in src {
        match (dst.get_mut(key), value) {
            (Some(Value::Object(d)), Value::Object(s)) => deep_merge(d, s),
            _ => {
                dst.insert(key.clone(), value.clone());
            }
        }
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
