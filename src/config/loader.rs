// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a task definition file and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a task definition file from path and run validation.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks durations, program names and privileged variable names.
/// - Resolves relative paths against the directory of the config file.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let raw_config = load_from_path(path)?;
    let mut config = ConfigFile::try_from(raw_config)?;
    config.resolve_relative_to(&config_root_dir(path));
    Ok(config)
}

/// Default task definition path: `Taskexec.toml` in the current directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Taskexec.toml")
}

/// Directory holding the config file, or `.` for a bare file name.
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_file_name_resolves_to_current_dir() {
        assert_eq!(config_root_dir(Path::new("Taskexec.toml")), PathBuf::from("."));
        assert_eq!(
            config_root_dir(Path::new("jobs/Taskexec.toml")),
            PathBuf::from("jobs")
        );
    }
}
