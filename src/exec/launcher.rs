// src/exec/launcher.rs

//! Pluggable command launcher abstraction.
//!
//! The batch controller and the script runner talk to a `CommandLauncher`
//! instead of spawning processes themselves. Production code uses
//! [`LocalCommandLauncher`](super::LocalCommandLauncher); tests provide fakes
//! that hand out scripted status handles.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tokio::process::Child;

use crate::errors::Result;

use super::request::{ExecutionContext, ExecutionRequest};
use super::status::CommandStatus;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Description of an interactive process for the synchronous style.
#[derive(Debug, Clone, Default)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Variables set on top of the inherited environment.
    pub env: HashMap<String, String>,
    /// Whether the child gets a stdin pipe (closed immediately otherwise).
    pub pipe_stdin: bool,
}

impl ProcessSpec {
    /// `program args...` as one line, for logging.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub trait CommandLauncher: Send + Sync {
    /// Submit a command. The returned handle may already be finished.
    fn run<'a>(
        &'a self,
        context: &'a ExecutionContext,
        request: &'a ExecutionRequest,
    ) -> BoxFuture<'a, Result<CommandStatus>>;

    /// Refresh a previously returned handle. Must never resubmit.
    fn poll<'a>(
        &'a self,
        context: &'a ExecutionContext,
        previous: &'a CommandStatus,
    ) -> BoxFuture<'a, Result<CommandStatus>>;

    /// Spawn an interactive process in `cwd` with stdout and stderr piped.
    fn start(&self, cwd: PathBuf, context: &ExecutionContext, spec: ProcessSpec) -> Result<Child>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_joins_program_and_args() {
        let spec = ProcessSpec {
            program: "ruby".into(),
            args: vec!["-I".into(), "/ws".into(), "--".into(), "-".into()],
            ..ProcessSpec::default()
        };
        assert_eq!(spec.command_line(), "ruby -I /ws -- -");
    }
}
