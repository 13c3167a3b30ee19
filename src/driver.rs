// src/driver.rs

//! Drives controllers from the command line.
//!
//! The task state lives in a JSON file between invocations, so a killed
//! `taskexec batch` can be restarted and picks up the command it submitted
//! earlier instead of launching a second one.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::batch::{Advance, ResumableExecutionController, TaskOutcome};
use crate::config::ConfigFile;
use crate::errors::{Result, TaskExecError};
use crate::exec::{CommandLauncher, LocalCommandLauncher, TaskIdentity};
use crate::params::Params;
use crate::script::{ScriptResult, SyncSubprocessRunner};
use crate::state::TaskState;
use crate::template::ParamTemplateEngine;
use crate::workspace::Workspace;

/// How a batch drive ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    Completed,
    /// Only returned in single-step mode.
    Pending { retry_after: Duration },
}

/// Everything a controller step needs besides the controller itself.
#[derive(Debug, Clone)]
pub struct TaskRun<'a> {
    pub params: &'a Params,
    pub workspace: &'a Workspace,
    pub task: &'a TaskIdentity,
    pub state_file: &'a Path,
}

/// Advance the batch task until it completes, sleeping `retry_after`
/// between steps. State is saved after every step.
///
/// With `once`, a single step is taken. When `shutdown` fires while
/// waiting, the saved state is left in place and
/// [`TaskExecError::Interrupted`] is returned.
pub async fn drive_batch<L, S>(
    controller: &ResumableExecutionController<L>,
    run: TaskRun<'_>,
    once: bool,
    shutdown: S,
) -> Result<DriveOutcome>
where
    L: CommandLauncher,
    S: Future<Output = ()>,
{
    let mut state = TaskState::load(run.state_file)?;
    tokio::pin!(shutdown);

    loop {
        let step = controller
            .advance(&mut state, run.params, run.workspace, run.task)
            .await?;
        state.save(run.state_file)?;

        match step {
            Advance::Completed(TaskOutcome::Success) => return Ok(DriveOutcome::Completed),
            Advance::Completed(TaskOutcome::Failed(code)) => {
                return Err(TaskExecError::CommandFailed { code });
            }
            Advance::Pending { retry_after } if once => {
                return Ok(DriveOutcome::Pending { retry_after });
            }
            Advance::Pending { retry_after } => {
                debug!(task = %run.task.name, ?retry_after, "waiting before next poll");
                tokio::select! {
                    _ = tokio::time::sleep(retry_after) => {}
                    _ = &mut shutdown => {
                        warn!(
                            task = %run.task.name,
                            state = ?run.state_file,
                            "interrupted; command keeps running and will be resumed from the state file"
                        );
                        return Err(TaskExecError::Interrupted(format!(
                            "batch task '{}' stopped while waiting",
                            run.task.name
                        )));
                    }
                }
            }
        }
    }
}

/// Run the script task once, feeding it the stored state and saving its
/// `store_params` back for the next attempt.
pub async fn drive_script<L, S>(
    runner: &SyncSubprocessRunner<L>,
    run: TaskRun<'_>,
    shutdown: S,
) -> Result<ScriptResult>
where
    L: CommandLauncher,
    S: Future<Output = ()>,
{
    let mut state = TaskState::load(run.state_file)?;
    let last_state = state.stored_params()?;
    let result = runner
        .run_until(run.params, &last_state, run.workspace, run.task, shutdown)
        .await?;

    if !result.store_params.is_empty() {
        state.store_params(&result.store_params)?;
        state.save(run.state_file)?;
        debug!(task = %run.task.name, state = ?run.state_file, "stored script parameters");
    }

    Ok(result)
}

/// Resolves once Ctrl-C is received. Never resolves if the signal handler
/// cannot be installed.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}

/// `taskexec batch`: local launcher and shared services from the config.
pub async fn run_batch(cfg: &ConfigFile, state_file: &Path, once: bool) -> Result<DriveOutcome> {
    let workspace = cfg.workspace()?;
    let task = cfg.task_identity();
    let controller = ResumableExecutionController::new(
        LocalCommandLauncher::new(cfg.executor.mode),
        cfg.batch_settings(),
        Arc::new(ParamTemplateEngine::new()),
        Arc::new(cfg.secret_store()),
        Arc::new(cfg.privileged_variables()),
    );

    info!(
        task = %task.name,
        mode = ?cfg.executor.mode,
        state = ?state_file,
        "running batch task"
    );
    let run = TaskRun {
        params: &cfg.params,
        workspace: &workspace,
        task: &task,
        state_file,
    };
    drive_batch(&controller, run, once, ctrl_c()).await
}

/// `taskexec script`: runs with a blocking local launcher.
pub async fn run_script(cfg: &ConfigFile, state_file: &Path) -> Result<ScriptResult> {
    let workspace = cfg.workspace()?;
    let task = cfg.task_identity();
    let runner = SyncSubprocessRunner::new(
        LocalCommandLauncher::default(),
        cfg.interpreter()?,
        Arc::new(cfg.privileged_variables()),
    );

    info!(task = %task.name, state = ?state_file, "running script task");
    let run = TaskRun {
        params: &cfg.params,
        workspace: &workspace,
        task: &task,
        state_file,
    };
    drive_script(&runner, run, ctrl_c()).await
}
