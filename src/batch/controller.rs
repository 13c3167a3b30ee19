// src/batch/controller.rs

//! Resumable batch execution.
//!
//! Each call to [`ResumableExecutionController::advance`] either submits a
//! new command (no handle in the task state) or polls the persisted one. An
//! unfinished handle is written back and the caller is told to come back
//! after the poll interval; a finished handle is removed and reported.
//!
//! A command is submitted at most once per absent-handle transition. That
//! is the property that makes the controller safe to resume from another
//! process: a pending handle is only ever polled.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::exec::{CommandLauncher, CommandStatus, ExecutionContext, ExecutionRequest, TaskIdentity};
use crate::params::Params;
use crate::secrets::{PrivilegedVariables, SecretProvider, build_environment};
use crate::state::{COMMAND_STATUS_KEY, TaskState};
use crate::template::TemplateEngine;
use crate::workspace::Workspace;

use super::projector::{ConfigProjector, write_config};
use super::{Advance, TaskOutcome};

/// Parameter section whose entries act as defaults for batch tasks.
pub const BATCH_SECTION: &str = "batch";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// How batch commands are built.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSettings {
    /// Executable, e.g. `embulk`.
    pub program: String,
    /// Arguments placed before the configuration file path.
    pub args: Vec<String>,
    /// Name of the configuration file inside the io directory.
    pub config_file_name: String,
    /// Returned with [`Advance::Pending`].
    pub poll_interval: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            program: "embulk".to_string(),
            args: vec!["run".to_string()],
            config_file_name: "load.yml".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

pub struct ResumableExecutionController<L: CommandLauncher> {
    launcher: L,
    settings: BatchSettings,
    templates: Arc<dyn TemplateEngine>,
    secrets: Arc<dyn SecretProvider>,
    variables: Arc<dyn PrivilegedVariables>,
}

impl<L: CommandLauncher> ResumableExecutionController<L> {
    pub fn new(
        launcher: L,
        settings: BatchSettings,
        templates: Arc<dyn TemplateEngine>,
        secrets: Arc<dyn SecretProvider>,
        variables: Arc<dyn PrivilegedVariables>,
    ) -> Self {
        Self {
            launcher,
            settings,
            templates,
            secrets,
            variables,
        }
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// Run one step of the batch state machine.
    ///
    /// Errors (configuration, decoding, launcher transport) leave the task
    /// state untouched.
    pub async fn advance(
        &self,
        state: &mut TaskState,
        params: &Params,
        workspace: &Workspace,
        task: &TaskIdentity,
    ) -> Result<Advance> {
        let params = params.merge_default(&params.nested_or_empty(BATCH_SECTION));
        let context = ExecutionContext::new(workspace.project_path(), task.clone());

        let status = match state.get(COMMAND_STATUS_KEY) {
            None => {
                debug!(task = %task.name, "no command status; submitting command");
                self.submit(&params, workspace, &context).await?
            }
            Some(persisted) => {
                // A handle we cannot read may belong to a live job, so this
                // must fail rather than fall through to a resubmission.
                let previous = CommandStatus::from_value(persisted)?;
                debug!(task = %task.name, "polling persisted command status");
                self.launcher.poll(&context, &previous).await?
            }
        };

        match status.exit_code() {
            None => {
                state.set(COMMAND_STATUS_KEY, status.to_value()?);
                debug!(
                    task = %task.name,
                    retry_after = ?self.settings.poll_interval,
                    "command still running"
                );
                Ok(Advance::Pending {
                    retry_after: self.settings.poll_interval,
                })
            }
            Some(code) => {
                // Clear first so a retry after a failure resubmits instead of
                // re-polling a dead handle.
                state.remove(COMMAND_STATUS_KEY);
                if code == 0 {
                    info!(task = %task.name, "command succeeded");
                    Ok(Advance::Completed(TaskOutcome::Success))
                } else {
                    warn!(task = %task.name, exit_code = code, "command failed");
                    Ok(Advance::Completed(TaskOutcome::Failed(code)))
                }
            }
        }
    }

    async fn submit(
        &self,
        params: &Params,
        workspace: &Workspace,
        context: &ExecutionContext,
    ) -> Result<CommandStatus> {
        let request = self.build_request(params, workspace, context)?;
        info!(
            task = %context.task.name,
            cmd = %request.command.join(" "),
            io_directory = ?request.io_directory,
            "submitting command"
        );
        self.launcher.run(context, &request).await
    }

    /// Project the configuration file and assemble the request.
    pub fn build_request(
        &self,
        params: &Params,
        workspace: &Workspace,
        context: &ExecutionContext,
    ) -> Result<ExecutionRequest> {
        let yaml = ConfigProjector::new(workspace, self.templates.as_ref(), self.secrets.as_ref())
            .render(params)?;
        let environment = build_environment(self.variables.as_ref())?;

        // Nothing is created on disk until the params and environment check out.
        let temp_dir =
            workspace.create_temp_dir(&format!("taskexec-batch-{}-", context.task.id))?;
        self.assemble(workspace, context, &temp_dir, &yaml, environment)
            .inspect_err(|_| {
                if let Err(e) = std::fs::remove_dir_all(&temp_dir) {
                    warn!(path = ?temp_dir, error = %e, "failed to remove temp dir");
                }
            })
    }

    fn assemble(
        &self,
        workspace: &Workspace,
        context: &ExecutionContext,
        temp_dir: &Path,
        yaml: &str,
        environment: HashMap<String, String>,
    ) -> Result<ExecutionRequest> {
        let config_path = temp_dir.join(&self.settings.config_file_name);
        write_config(&config_path, yaml)?;

        let mut command = Vec::with_capacity(self.settings.args.len() + 2);
        command.push(self.settings.program.clone());
        command.extend(self.settings.args.iter().cloned());
        command.push(relative_arg(workspace.relativize(&config_path)?));

        ExecutionRequest::build(context, workspace.path(), temp_dir, environment, command)
    }
}

fn relative_arg(path: PathBuf) -> String {
    path.to_string_lossy().into_owned()
}
