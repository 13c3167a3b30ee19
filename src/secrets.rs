// src/secrets.rs

//! Secret resolution and privileged environment variables.
//!
//! Secret references in a configuration tree use a key suffix: an entry
//! `password_secret: db.password` is replaced by `password: <value of secret
//! db.password>`. Privileged variables are task-scoped name/value pairs that
//! are merged into the environment of launched commands, winning over the
//! inherited process environment.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fmt::Debug;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

use crate::errors::{Result, TaskExecError};

/// Suffix marking a mapping key whose value names a secret.
pub const SECRET_KEY_SUFFIX: &str = "_secret";

static ENV_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
        .unwrap_or_else(|e| unreachable!("invalid env name pattern: {e}"))
});

/// Source of secret values.
pub trait SecretProvider: Send + Sync + Debug {
    fn get_secret(&self, key: &str) -> Option<String>;
}

/// Task-scoped variables exported to launched commands.
pub trait PrivilegedVariables: Send + Sync + Debug {
    fn keys(&self) -> Vec<String>;
    fn get(&self, key: &str) -> Option<String>;
}

/// In-memory secret store and variable scope.
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
    values: BTreeMap<String, String>,
}

impl StaticSecrets {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl SecretProvider for StaticSecrets {
    fn get_secret(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

impl PrivilegedVariables for StaticSecrets {
    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Return a copy of `value` with every `<name>_secret` entry replaced by
/// `<name>` holding the resolved secret.
///
/// Recurses through mappings and sequences. A secret reference that is not a
/// string, or names an unknown secret, is a configuration error.
pub fn resolve_secrets(value: &Value, secrets: &dyn SecretProvider) -> Result<Value> {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, child) in map {
                match key.strip_suffix(SECRET_KEY_SUFFIX) {
                    Some(name) if !name.is_empty() => {
                        let secret_key = child.as_str().ok_or_else(|| {
                            TaskExecError::ConfigError(format!(
                                "secret reference '{}' must be a string",
                                key
                            ))
                        })?;
                        let resolved = secrets.get_secret(secret_key).ok_or_else(|| {
                            TaskExecError::ConfigError(format!(
                                "secret '{}' referenced by '{}' is not defined",
                                secret_key, key
                            ))
                        })?;
                        out.insert(name.to_string(), Value::String(resolved));
                    }
                    _ => {
                        out.insert(key.clone(), resolve_secrets(child, secrets)?);
                    }
                }
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_secrets(item, secrets))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

/// Merge privileged variables into `env`, overriding existing entries.
///
/// Variable names must be valid shell identifiers.
pub fn collect_environment_variables(
    env: &mut HashMap<String, String>,
    variables: &dyn PrivilegedVariables,
) -> Result<()> {
    for key in variables.keys() {
        if !is_valid_env_name(&key) {
            return Err(TaskExecError::ConfigError(format!(
                "invalid environment variable name: '{}'",
                key
            )));
        }
        if let Some(value) = variables.get(&key) {
            env.insert(key, value);
        }
    }
    Ok(())
}

/// Inherited process environment overlaid with privileged variables.
pub fn build_environment(variables: &dyn PrivilegedVariables) -> Result<HashMap<String, String>> {
    let mut env = utf8_environment(std::env::vars_os());
    collect_environment_variables(&mut env, variables)?;
    Ok(env)
}

/// Keep the entries whose name and value are both UTF-8.
///
/// The child still inherits the skipped ones from this process; they just
/// cannot be carried in a request.
fn utf8_environment(
    vars: impl IntoIterator<Item = (OsString, OsString)>,
) -> HashMap<String, String> {
    let mut env = HashMap::new();
    for (name, value) in vars {
        match (name.into_string(), value.into_string()) {
            (Ok(name), Ok(value)) => {
                env.insert(name, value);
            }
            (name, _) => {
                let name = match name {
                    Ok(name) => name,
                    Err(raw) => raw.to_string_lossy().into_owned(),
                };
                warn!(variable = %name, "skipping environment variable that is not valid UTF-8");
            }
        }
    }
    env
}

pub(crate) fn is_valid_env_name(name: &str) -> bool {
    ENV_NAME.is_match(name)
}
