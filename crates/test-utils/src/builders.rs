#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use serde_json::Value;
use taskexec::config::{ConfigFile, RawConfigFile};
use taskexec::params::Params;
use taskexec::types::{LaunchMode, ScriptDelivery};
use tempfile::TempDir;

/// Builder for `Params` from JSON values.
#[derive(Default)]
pub struct ParamsBuilder {
    params: Params,
}

impl ParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.params.set(key, value);
        self
    }

    pub fn build(self) -> Params {
        self.params
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_project_path(mut self, path: &Path) -> Self {
        self.config.executor.project_path = path.to_path_buf();
        self
    }

    pub fn with_poll_interval(mut self, interval: &str) -> Self {
        self.config.executor.poll_interval = interval.to_string();
        self
    }

    pub fn with_mode(mut self, mode: LaunchMode) -> Self {
        self.config.executor.mode = mode;
        self
    }

    pub fn with_task(mut self, id: u64, name: &str) -> Self {
        self.config.executor.task_id = id;
        self.config.executor.task_name = name.to_string();
        self
    }

    pub fn with_batch_program(mut self, program: &str, args: &[&str]) -> Self {
        self.config.batch.program = program.to_string();
        self.config.batch.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Use `sh` as the interpreter, reading the program from stdin.
    pub fn with_shell_interpreter(mut self) -> Self {
        self.config.script.interpreter = "sh".to_string();
        self.config.script.include_flag = String::new();
        self.config.script.require_flag = String::new();
        self.config.script.stdin_args = vec!["-s".to_string(), "--".to_string()];
        self.config.script.file_args = Vec::new();
        self
    }

    pub fn with_delivery(mut self, delivery: ScriptDelivery) -> Self {
        self.config.script.delivery = delivery;
        self
    }

    pub fn with_secret(mut self, key: &str, value: &str) -> Self {
        self.config.secrets.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_privileged(mut self, name: &str, value: &str) -> Self {
        self.config.privileged.insert(name.to_string(), value.to_string());
        self
    }

    /// Set a task parameter from a JSON value (converted to TOML).
    pub fn with_param(mut self, key: &str, value: Value) -> Self {
        let value = toml::Value::try_from(value).expect("param not representable as TOML");
        self.config.params.insert(key.to_string(), value);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Temporary project directory with helpers for writing files into it.
pub struct TempProject {
    dir: TempDir,
}

impl TempProject {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp project"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, rel: &str, contents: &str) -> std::path::PathBuf {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::fs::write(&path, contents).expect("write project file");
        path
    }
}

impl Default for TempProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Short poll interval for tests that drive the batch loop.
pub const FAST_POLL: Duration = Duration::from_millis(10);
