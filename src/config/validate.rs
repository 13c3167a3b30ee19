// src/config/validate.rs

use std::path::Path;
use std::time::Duration;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, TaskExecError};
use crate::params::Params;
use crate::secrets::is_valid_env_name;
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::TaskExecError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let poll_interval = validate_executor(&raw)?;
        validate_batch(&raw)?;
        validate_script(&raw)?;
        validate_privileged(&raw)?;
        let params = convert_params(&raw)?;
        Ok(ConfigFile::new_unchecked(raw, poll_interval, params))
    }
}

fn validate_executor(cfg: &RawConfigFile) -> Result<Duration> {
    let interval = parse_duration(&cfg.executor.poll_interval).map_err(|e| {
        TaskExecError::ConfigError(format!("[executor].poll_interval: {}", e))
    })?;
    if interval.is_zero() {
        return Err(TaskExecError::ConfigError(
            "[executor].poll_interval must be greater than zero".to_string(),
        ));
    }

    if cfg.executor.working_dir.is_absolute() {
        return Err(TaskExecError::ConfigError(format!(
            "[executor].working_dir must be relative to project_path (got {:?})",
            cfg.executor.working_dir
        )));
    }

    if cfg.executor.task_name.trim().is_empty() {
        return Err(TaskExecError::ConfigError(
            "[executor].task_name must not be empty".to_string(),
        ));
    }

    Ok(interval)
}

fn validate_batch(cfg: &RawConfigFile) -> Result<()> {
    if cfg.batch.program.trim().is_empty() {
        return Err(TaskExecError::ConfigError(
            "[batch].program must not be empty".to_string(),
        ));
    }

    let name = &cfg.batch.config_file_name;
    let is_plain_name = Path::new(name).file_name().is_some_and(|f| f == name.as_str());
    if !is_plain_name {
        return Err(TaskExecError::ConfigError(format!(
            "[batch].config_file_name must be a plain file name (got '{}')",
            name
        )));
    }

    Ok(())
}

fn validate_script(cfg: &RawConfigFile) -> Result<()> {
    if cfg.script.interpreter.trim().is_empty() {
        return Err(TaskExecError::ConfigError(
            "[script].interpreter must not be empty".to_string(),
        ));
    }
    if cfg.script.stdin_args.is_empty() && cfg.script.delivery == crate::types::ScriptDelivery::Stdin {
        return Err(TaskExecError::ConfigError(
            "[script].stdin_args must not be empty when delivery = \"stdin\"".to_string(),
        ));
    }
    Ok(())
}

fn validate_privileged(cfg: &RawConfigFile) -> Result<()> {
    for name in cfg.privileged.keys() {
        if !is_valid_env_name(name) {
            return Err(TaskExecError::ConfigError(format!(
                "[privileged] has invalid environment variable name '{}'",
                name
            )));
        }
    }
    Ok(())
}

fn convert_params(cfg: &RawConfigFile) -> Result<Params> {
    let value = serde_json::to_value(&cfg.params)?;
    Params::from_value(value)
}
