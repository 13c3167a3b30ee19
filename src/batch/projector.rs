// src/batch/projector.rs

//! Writes the on-disk configuration file a batch tool reads.
//!
//! Two modes, picked by the task parameters:
//! - template mode (`_command` is set): the named file is expanded against
//!   the params, parsed as YAML, secret references are resolved, and the
//!   result is written back out as YAML;
//! - structured mode: the `config` sub-tree of the params is written as is.
//!
//! Output never carries a leading `---` document marker.

use std::path::Path;

use anyhow::Context;
use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, TaskExecError};
use crate::params::{Params, type_name};
use crate::secrets::{SecretProvider, resolve_secrets};
use crate::template::TemplateEngine;
use crate::workspace::Workspace;

/// Parameter naming a template file; selects template mode.
pub const TEMPLATE_PARAM: &str = "_command";
/// Parameter holding the structured configuration tree.
pub const CONFIG_PARAM: &str = "config";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionMode {
    Template,
    Structured,
}

impl ProjectionMode {
    pub fn for_params(params: &Params) -> Self {
        if params.has(TEMPLATE_PARAM) {
            ProjectionMode::Template
        } else {
            ProjectionMode::Structured
        }
    }
}

pub struct ConfigProjector<'a> {
    workspace: &'a Workspace,
    templates: &'a dyn TemplateEngine,
    secrets: &'a dyn SecretProvider,
}

impl<'a> ConfigProjector<'a> {
    pub fn new(
        workspace: &'a Workspace,
        templates: &'a dyn TemplateEngine,
        secrets: &'a dyn SecretProvider,
    ) -> Self {
        Self {
            workspace,
            templates,
            secrets,
        }
    }

    /// Build the configuration tree for `params` without writing it.
    pub fn build(&self, params: &Params) -> Result<Value> {
        match ProjectionMode::for_params(params) {
            ProjectionMode::Template => {
                let file = params.require_str(TEMPLATE_PARAM)?;
                let data = self.workspace.template_file(self.templates, file, params)?;
                let tree = parse_yaml_mapping(&data)?;
                resolve_secrets(&tree, self.secrets)
            }
            ProjectionMode::Structured => Ok(params.nested(CONFIG_PARAM)?.into_value()),
        }
    }

    /// Build the configuration tree and write it to `target` as YAML.
    pub fn project(&self, params: &Params, target: &Path) -> Result<()> {
        let yaml = self.render(params)?;
        write_config(target, &yaml)
    }

    /// Build the configuration tree and serialize it, touching nothing on disk.
    pub fn render(&self, params: &Params) -> Result<String> {
        let tree = self.build(params)?;
        let yaml = to_yaml(&tree)?;
        debug!(mode = ?ProjectionMode::for_params(params), "rendered configuration file");
        Ok(yaml)
    }
}

pub fn write_config(target: &Path, yaml: &str) -> Result<()> {
    std::fs::write(target, yaml)
        .with_context(|| format!("writing configuration file {:?}", target))?;
    debug!(path = ?target, "wrote configuration file");
    Ok(())
}

/// Parse expanded template text. Anything other than a YAML mapping is a
/// configuration error.
pub fn parse_yaml_mapping(data: &str) -> Result<Value> {
    let value: Value = serde_yaml::from_str(data).map_err(|e| {
        TaskExecError::ConfigError(format!("Failed to parse yaml file: {}", e))
    })?;
    match value {
        Value::Object(_) => Ok(value),
        other => Err(TaskExecError::ConfigError(format!(
            "Failed to parse yaml file: expected a mapping at the top level, got {}",
            type_name(&other)
        ))),
    }
}

/// Serialize as YAML without a leading document marker.
pub fn to_yaml(tree: &Value) -> Result<String> {
    let text = serde_yaml::to_string(tree)?;
    Ok(match text.strip_prefix("---\n") {
        Some(rest) => rest.to_string(),
        None => text,
    })
}
