// src/exec/request.rs

//! Execution requests handed to a [`CommandLauncher`](super::CommandLauncher).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::workspace::relativize;

/// Identity of the task attempt that owns a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskIdentity {
    pub id: u64,
    pub name: String,
}

impl TaskIdentity {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Per-call context for a launcher. Rebuilt on every call, never persisted.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub local_project_path: PathBuf,
    pub task: TaskIdentity,
}

impl ExecutionContext {
    pub fn new(local_project_path: impl Into<PathBuf>, task: TaskIdentity) -> Self {
        Self {
            local_project_path: local_project_path.into(),
            task,
        }
    }

    /// Resolve a request-relative path against the project root.
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.local_project_path.join(relative)
    }
}

/// A command to run, with every path relative to the project root so the
/// same request can be rebuilt after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub working_directory: PathBuf,
    pub io_directory: PathBuf,
    pub command: Vec<String>,
    pub environment: HashMap<String, String>,
}

impl ExecutionRequest {
    /// Build a request from absolute paths, relativizing them against the
    /// context's project root.
    pub fn build(
        context: &ExecutionContext,
        working_directory: &Path,
        io_directory: &Path,
        environment: HashMap<String, String>,
        command: Vec<String>,
    ) -> Result<Self> {
        let project = &context.local_project_path;
        Ok(Self {
            working_directory: relativize(project, working_directory)?,
            io_directory: relativize(project, io_directory)?,
            command,
            environment,
        })
    }
}
