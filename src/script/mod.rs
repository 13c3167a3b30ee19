// src/script/mod.rs

//! Synchronous interpreter scripts exchanging JSON through temp files.

use serde::Serialize;
use serde_json::Value;

use crate::errors::{Result, TaskExecError};
use crate::params::{Params, type_name};

pub mod interpreter;
pub mod runner;

pub use interpreter::{Interpreter, RUNNER_SCRIPT};
pub use runner::SyncSubprocessRunner;

/// Structured result read back from the output exchange file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScriptResult {
    pub subtask_config: Params,
    pub export_params: Params,
    pub store_params: Params,
}

impl ScriptResult {
    /// Parse output file contents. Missing sections are empty; a section
    /// that is present but not a mapping is an exchange error.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| TaskExecError::Exchange(format!("invalid output file: {}", e)))?;
        let map = match value {
            Value::Object(map) => map,
            other => {
                return Err(TaskExecError::Exchange(format!(
                    "output file must hold a mapping, got {}",
                    type_name(&other)
                )));
            }
        };
        let section = |key: &str| -> Result<Params> {
            match map.get(key) {
                None | Some(Value::Null) => Ok(Params::new()),
                Some(Value::Object(inner)) => Ok(Params::from(inner.clone())),
                Some(other) => Err(TaskExecError::Exchange(format!(
                    "'{}' in output file must be a mapping, got {}",
                    key,
                    type_name(other)
                ))),
            }
        };
        Ok(Self {
            subtask_config: section("subtask_config")?,
            export_params: section("export_params")?,
            store_params: section("store_params")?,
        })
    }
}
