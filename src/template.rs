// src/template.rs

//! Template expansion of textual configuration.
//!
//! The expansion engine is pluggable; [`ParamTemplateEngine`] is the built-in
//! implementation that substitutes `${name}` and `${nested.name}` references
//! from the task parameters.

use std::fmt::Debug;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::errors::{Result, TaskExecError};
use crate::params::Params;

pub trait TemplateEngine: Send + Sync + Debug {
    /// Expand `content` against `params`.
    fn render(&self, content: &str, params: &Params) -> Result<String>;
}

/// `${path}` substitution from task parameters.
///
/// - strings are inserted verbatim,
/// - numbers and booleans use their JSON rendering,
/// - mappings and sequences are inserted as inline JSON (which is valid
///   YAML flow syntax),
/// - an unknown reference is a configuration error.
#[derive(Debug, Clone)]
pub struct ParamTemplateEngine {
    pattern: Regex,
}

impl ParamTemplateEngine {
    pub fn new() -> Self {
        // The pattern is a literal and always compiles.
        let pattern = Regex::new(r"\$\{\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}")
            .unwrap_or_else(|e| unreachable!("invalid template pattern: {e}"));
        Self { pattern }
    }
}

impl Default for ParamTemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for ParamTemplateEngine {
    fn render(&self, content: &str, params: &Params) -> Result<String> {
        let mut missing: Option<String> = None;

        let rendered = self.pattern.replace_all(content, |caps: &Captures<'_>| {
            let name = &caps[1];
            match params.lookup(name) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) => String::new(),
                Some(other) => other.to_string(),
                None => {
                    missing.get_or_insert_with(|| name.to_string());
                    String::new()
                }
            }
        });

        if let Some(name) = missing {
            return Err(TaskExecError::ConfigError(format!(
                "template references unknown parameter '{}'",
                name
            )));
        }

        Ok(rendered.into_owned())
    }
}
