// src/errors.rs

//! Crate-wide error type and helpers.
//!
//! Errors fall into four classes that callers treat differently:
//! - configuration errors (never worth retrying),
//! - runtime failures of the external command (`CommandFailed`),
//! - transport/decoding errors (persisted handle or exchange files),
//! - interruption of the calling task.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskExecError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Command failed with code {code}")]
    CommandFailed { code: i32 },

    #[error("Failed to decode persisted command status: {0}")]
    StatusDecode(String),

    #[error("Exchange file error: {0}")]
    Exchange(String),

    #[error("Interrupted: {0}")]
    Interrupted(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TaskExecError {
    /// Configuration errors reproduce on every attempt, so an orchestrator
    /// should surface them instead of scheduling a retry.
    pub fn is_config_error(&self) -> bool {
        matches!(self, TaskExecError::ConfigError(_))
    }

    /// Exit code of the external command, if this is a runtime failure.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            TaskExecError::CommandFailed { code } => Some(*code),
            _ => None,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskExecError>;
