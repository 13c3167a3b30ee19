// src/state.rs

//! Durable per-attempt task state.
//!
//! The orchestrator hands a `TaskState` to each attempt and stores whatever
//! comes back. Batch tasks write [`COMMAND_STATUS_KEY`]; its presence is what
//! distinguishes "resume polling" from "start a command". Script tasks keep
//! their `store_params` under [`STORED_PARAMS_KEY`], so neither kind sees the
//! other's entries when both share a state file.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Result;
use crate::params::Params;

/// Key under which the serialized command status handle is persisted.
pub const COMMAND_STATUS_KEY: &str = "commandStatus";

/// Key under which script tasks keep the params they asked to store.
pub const STORED_PARAMS_KEY: &str = "storedParams";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskState {
    params: Params,
}

impl TaskState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_params(params: Params) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn has(&self, key: &str) -> bool {
        self.params.has(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.params.set(key, value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.params.remove(key)
    }

    /// Params stored by earlier script attempts.
    pub fn stored_params(&self) -> Result<Params> {
        Params::from_value(self.get(STORED_PARAMS_KEY).cloned().unwrap_or(Value::Null))
    }

    /// Merge `params` over the stored ones.
    pub fn store_params(&mut self, params: &Params) -> Result<()> {
        let merged = self.stored_params()?.merge(params);
        self.set(STORED_PARAMS_KEY, merged.into_value());
        Ok(())
    }

    /// Load state from a JSON file. A missing file is an empty state (first
    /// attempt).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading task state {:?}", path))?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let params: Params = serde_json::from_str(&contents)?;
        Ok(Self { params })
    }

    /// Persist state as pretty JSON, replacing the file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).with_context(|| format!("creating dir {:?}", dir))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temp state file in {:?}", dir))?;
        serde_json::to_writer_pretty(&mut tmp, &self.params)?;
        tmp.persist(path)
            .with_context(|| format!("persisting task state {:?}", path))?;
        Ok(())
    }
}
