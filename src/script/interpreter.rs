// src/script/interpreter.rs

//! Interpreter invocation conventions.
//!
//! The command line has the shape
//! `<program> [<include> <workspace>] [<require> <feature>] <delivery args> <args...>`
//! where the delivery args either tell the interpreter to read its program
//! from stdin (`-- -` for Ruby) or name a script file.

use std::borrow::Cow;
use std::path::Path;

use crate::types::ScriptDelivery;

/// Generic runner shim used for inline `_command` scripts.
pub const RUNNER_SCRIPT: &str = include_str!("runner.rb");

#[derive(Debug, Clone, PartialEq)]
pub struct Interpreter {
    pub program: String,
    /// Flag adding the workspace to the library search path (`-I`).
    pub include_flag: Option<String>,
    /// Flag loading a named feature before the script (`-r`).
    pub require_flag: Option<String>,
    /// Arguments selecting "program on stdin" (`-- -`).
    pub stdin_args: Vec<String>,
    /// Arguments placed before a script file path (`--`).
    pub file_args: Vec<String>,
    pub delivery: ScriptDelivery,
    /// Shim fed to the interpreter for inline commands.
    pub runner_script: Cow<'static, str>,
}

impl Interpreter {
    pub fn ruby() -> Self {
        Self {
            program: "ruby".to_string(),
            include_flag: Some("-I".to_string()),
            require_flag: Some("-r".to_string()),
            stdin_args: vec!["--".to_string(), "-".to_string()],
            file_args: vec!["--".to_string()],
            delivery: ScriptDelivery::Stdin,
            runner_script: Cow::Borrowed(RUNNER_SCRIPT),
        }
    }

    /// Arguments after the program name.
    ///
    /// `script_file` is only used with [`ScriptDelivery::TempFile`].
    pub fn arguments(
        &self,
        workspace: &Path,
        feature: Option<&str>,
        script_file: Option<&Path>,
        args: &[String],
    ) -> Vec<String> {
        let mut out = Vec::new();

        if let Some(flag) = &self.include_flag {
            out.push(flag.clone());
            out.push(workspace.to_string_lossy().into_owned());
        }

        if let (Some(flag), Some(feature)) = (&self.require_flag, feature) {
            out.push(flag.clone());
            out.push(feature.to_string());
        }

        match (self.delivery, script_file) {
            (ScriptDelivery::TempFile, Some(file)) => {
                out.extend(self.file_args.iter().cloned());
                out.push(file.to_string_lossy().into_owned());
            }
            _ => out.extend(self.stdin_args.iter().cloned()),
        }

        out.extend(args.iter().cloned());
        out
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::ruby()
    }
}
