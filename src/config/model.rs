// src/config/model.rs

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::batch::BatchSettings;
use crate::errors::Result;
use crate::exec::TaskIdentity;
use crate::params::Params;
use crate::script::Interpreter;
use crate::secrets::StaticSecrets;
use crate::types::{LaunchMode, ScriptDelivery};
use crate::workspace::Workspace;

/// Task definition file as read from TOML, before validation.
///
/// ```toml
/// [executor]
/// poll_interval = "3s"
/// mode = "detached"
///
/// [batch]
/// program = "embulk"
///
/// [script]
/// interpreter = "ruby"
///
/// [secrets]
/// "db.password" = "..."
///
/// [privileged]
/// API_TOKEN = "..."
///
/// [params]
/// config = { in = { type = "file" } }
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub executor: ExecutorSection,

    #[serde(default)]
    pub batch: BatchSection,

    #[serde(default)]
    pub script: ScriptSection,

    /// Static secret store used for `*_secret` references.
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,

    /// Privileged variables exported to launched commands.
    #[serde(default)]
    pub privileged: BTreeMap<String, String>,

    /// Task parameters.
    #[serde(default)]
    pub params: toml::Table,
}

/// `[executor]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSection {
    /// Interval returned with a pending batch step, e.g. `"3s"`.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    /// `"detached"` (resumable) or `"blocking"`.
    #[serde(default)]
    pub mode: LaunchMode,

    /// Stable project root. Relative paths are resolved against the
    /// directory holding the config file.
    #[serde(default = "default_dot")]
    pub project_path: PathBuf,

    /// Task working directory, relative to `project_path`.
    #[serde(default = "default_dot")]
    pub working_dir: PathBuf,

    /// Where the CLI keeps task state between invocations, relative to
    /// `project_path`.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    #[serde(default = "default_task_name")]
    pub task_name: String,

    #[serde(default)]
    pub task_id: u64,
}

fn default_poll_interval() -> String {
    "3s".to_string()
}

fn default_dot() -> PathBuf {
    PathBuf::from(".")
}

fn default_state_file() -> PathBuf {
    PathBuf::from(".taskexec/state.json")
}

fn default_task_name() -> String {
    "task".to_string()
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            mode: LaunchMode::default(),
            project_path: default_dot(),
            working_dir: default_dot(),
            state_file: default_state_file(),
            task_name: default_task_name(),
            task_id: 0,
        }
    }
}

/// `[batch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSection {
    #[serde(default = "default_batch_program")]
    pub program: String,

    #[serde(default = "default_batch_args")]
    pub args: Vec<String>,

    #[serde(default = "default_config_file_name")]
    pub config_file_name: String,
}

fn default_batch_program() -> String {
    "embulk".to_string()
}

fn default_batch_args() -> Vec<String> {
    vec!["run".to_string()]
}

fn default_config_file_name() -> String {
    "load.yml".to_string()
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            program: default_batch_program(),
            args: default_batch_args(),
            config_file_name: default_config_file_name(),
        }
    }
}

/// `[script]` section.
///
/// Flags set to `""` are left off the command line.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptSection {
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    #[serde(default)]
    pub delivery: ScriptDelivery,

    #[serde(default = "default_include_flag")]
    pub include_flag: String,

    #[serde(default = "default_require_flag")]
    pub require_flag: String,

    #[serde(default = "default_stdin_args")]
    pub stdin_args: Vec<String>,

    #[serde(default = "default_file_args")]
    pub file_args: Vec<String>,

    /// Replacement for the bundled runner shim, relative to the config file.
    #[serde(default)]
    pub runner_script: Option<PathBuf>,
}

fn default_interpreter() -> String {
    "ruby".to_string()
}

fn default_include_flag() -> String {
    "-I".to_string()
}

fn default_require_flag() -> String {
    "-r".to_string()
}

fn default_stdin_args() -> Vec<String> {
    vec!["--".to_string(), "-".to_string()]
}

fn default_file_args() -> Vec<String> {
    vec!["--".to_string()]
}

impl Default for ScriptSection {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            delivery: ScriptDelivery::default(),
            include_flag: default_include_flag(),
            require_flag: default_require_flag(),
            stdin_args: default_stdin_args(),
            file_args: default_file_args(),
            runner_script: None,
        }
    }
}

/// Validated configuration.
///
/// Only constructed through `TryFrom<RawConfigFile>` (see `validate.rs`),
/// so the fields below always hold usable values.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub executor: ExecutorSection,
    pub poll_interval: Duration,
    pub batch: BatchSection,
    pub script: ScriptSection,
    pub secrets: BTreeMap<String, String>,
    pub privileged: BTreeMap<String, String>,
    pub params: Params,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile, poll_interval: Duration, params: Params) -> Self {
        Self {
            executor: raw.executor,
            poll_interval,
            batch: raw.batch,
            script: raw.script,
            secrets: raw.secrets,
            privileged: raw.privileged,
            params,
        }
    }

    /// Resolve relative `project_path` and `runner_script` against `base`.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        if self.executor.project_path.is_relative() {
            self.executor.project_path = base.join(&self.executor.project_path);
        }
        if let Some(script) = &self.script.runner_script {
            if script.is_relative() {
                self.script.runner_script = Some(base.join(script));
            }
        }
    }

    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            program: self.batch.program.clone(),
            args: self.batch.args.clone(),
            config_file_name: self.batch.config_file_name.clone(),
            poll_interval: self.poll_interval,
        }
    }

    /// Interpreter conventions, loading a custom runner shim if configured.
    pub fn interpreter(&self) -> Result<Interpreter> {
        let runner_script = match &self.script.runner_script {
            Some(path) => Cow::Owned(
                std::fs::read_to_string(path)
                    .with_context(|| format!("reading runner script {:?}", path))?,
            ),
            None => Cow::Borrowed(crate::script::RUNNER_SCRIPT),
        };
        Ok(Interpreter {
            program: self.script.interpreter.clone(),
            include_flag: non_empty(&self.script.include_flag),
            require_flag: non_empty(&self.script.require_flag),
            stdin_args: self.script.stdin_args.clone(),
            file_args: self.script.file_args.clone(),
            delivery: self.script.delivery,
            runner_script,
        })
    }

    pub fn workspace(&self) -> Result<Workspace> {
        Workspace::new(&self.executor.project_path, &self.executor.working_dir)
    }

    pub fn task_identity(&self) -> TaskIdentity {
        TaskIdentity::new(self.executor.task_id, self.executor.task_name.clone())
    }

    pub fn state_file(&self) -> PathBuf {
        self.executor.project_path.join(&self.executor.state_file)
    }

    pub fn secret_store(&self) -> StaticSecrets {
        StaticSecrets::new(self.secrets.clone())
    }

    pub fn privileged_variables(&self) -> StaticSecrets {
        StaticSecrets::new(self.privileged.clone())
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
