// src/script/runner.rs

//! Synchronous script execution.
//!
//! One call runs one interpreter process to completion:
//! 1. params are written as `{"params": ...}` to a private input file,
//! 2. the script body goes to the interpreter (stdin or a temp file) while
//!    its output is copied to the log sink,
//! 3. a zero exit code means the output file holds the structured result.
//!
//! Nothing survives the call. A crash simply fails the attempt and the retry
//! runs the whole script again.

use std::collections::HashMap;
use std::future::{Future, pending};
use std::io::ErrorKind;
use std::sync::Arc;

use anyhow::Context;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tracing::{debug, info, warn};

use crate::errors::{Result, TaskExecError};
use crate::exec::output::spawn_line_copier;
use crate::exec::{CommandLauncher, ExecutionContext, ProcessSpec, TaskIdentity};
use crate::params::Params;
use crate::secrets::{PrivilegedVariables, collect_environment_variables};
use crate::types::ScriptDelivery;
use crate::workspace::Workspace;

use super::ScriptResult;
use super::interpreter::Interpreter;

/// Parameter section whose entries act as defaults for script tasks.
pub const SCRIPT_SECTION: &str = "script";
/// Inline command run through the runner shim.
pub const COMMAND_PARAM: &str = "_command";
/// Script body.
pub const SCRIPT_PARAM: &str = "script";
/// Script file relative to the working directory.
pub const SCRIPT_FILE_PARAM: &str = "script_file";
/// Feature loaded before the script.
pub const REQUIRE_PARAM: &str = "require";

pub struct SyncSubprocessRunner<L: CommandLauncher> {
    launcher: L,
    interpreter: Interpreter,
    variables: Arc<dyn PrivilegedVariables>,
}

impl<L: CommandLauncher> SyncSubprocessRunner<L> {
    pub fn new(
        launcher: L,
        interpreter: Interpreter,
        variables: Arc<dyn PrivilegedVariables>,
    ) -> Self {
        Self {
            launcher,
            interpreter,
            variables,
        }
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Run the script and block until the interpreter exits.
    ///
    /// `last_state` holds parameters stored by a previous attempt; they
    /// override the task's own parameters.
    pub async fn run(
        &self,
        params: &Params,
        last_state: &Params,
        workspace: &Workspace,
        task: &TaskIdentity,
    ) -> Result<ScriptResult> {
        self.run_until(params, last_state, workspace, task, pending())
            .await
    }

    /// Like [`run`](Self::run), but abort when `cancel` completes.
    ///
    /// On cancellation the child is killed and
    /// [`TaskExecError::Interrupted`] is returned.
    pub async fn run_until<C>(
        &self,
        params: &Params,
        last_state: &Params,
        workspace: &Workspace,
        task: &TaskIdentity,
        cancel: C,
    ) -> Result<ScriptResult>
    where
        C: Future<Output = ()>,
    {
        let params = params
            .merge_default(&params.nested_or_empty(SCRIPT_SECTION))
            .merge(last_state);

        let in_file = workspace.create_temp_file("taskexec-script-in-", ".tmp")?;
        let out_file = workspace.create_temp_file("taskexec-script-out-", ".tmp")?;
        let rel_in = workspace.relativize(&in_file)?.to_string_lossy().into_owned();
        let rel_out = workspace.relativize(&out_file)?.to_string_lossy().into_owned();

        let (script, args) = match params.get_str(COMMAND_PARAM)? {
            Some(command) => (
                self.interpreter.runner_script.to_string(),
                vec![command.to_string(), rel_in, rel_out],
            ),
            None => (load_script(&params, workspace)?, vec![rel_in, rel_out]),
        };

        let input = serde_json::to_vec(&json!({ "params": params }))?;
        std::fs::write(&in_file, input)
            .with_context(|| format!("writing input file {:?}", &*in_file))?;

        // Kept alive until the process exits.
        let script_file = match self.interpreter.delivery {
            ScriptDelivery::TempFile => {
                let file = workspace.create_temp_file("taskexec-script-", ".script")?;
                std::fs::write(&file, &script)
                    .with_context(|| format!("writing script file {:?}", &*file))?;
                Some(file)
            }
            ScriptDelivery::Stdin => None,
        };

        let feature = params.get_str(REQUIRE_PARAM)?;
        let spec = ProcessSpec {
            program: self.interpreter.program.clone(),
            args: self.interpreter.arguments(
                workspace.path(),
                feature,
                script_file.as_deref(),
                &args,
            ),
            env: self.environment()?,
            pipe_stdin: self.interpreter.delivery == ScriptDelivery::Stdin,
        };

        let context = ExecutionContext::new(workspace.project_path(), task.clone());
        info!(task = %task.name, cmd = %spec.command_line(), "starting script");
        let mut child = self
            .launcher
            .start(workspace.path().to_path_buf(), &context, spec)?;

        let stdout = child
            .stdout
            .take()
            .map(|s| spawn_line_copier(s, task.name.clone(), "stdout"));
        let stderr = child
            .stderr
            .take()
            .map(|s| spawn_line_copier(s, task.name.clone(), "stderr"));
        let stdin = child.stdin.take();

        tokio::pin!(cancel);
        let waited = tokio::select! {
            res = feed_and_wait(&mut child, stdin, script.as_bytes(), &task.name) => Some(res),
            _ = &mut cancel => None,
        };

        let code = match waited {
            Some(res) => res?,
            None => {
                warn!(task = %task.name, "script interrupted; killing interpreter");
                if let Err(e) = child.kill().await {
                    warn!(task = %task.name, error = %e, "failed to kill interpreter");
                }
                return Err(TaskExecError::Interrupted(format!(
                    "script for task '{}' was cancelled",
                    task.name
                )));
            }
        };

        for copier in [stdout, stderr].into_iter().flatten() {
            if let Err(e) = copier.await {
                warn!(task = %task.name, error = %e, "output copier task failed");
            }
        }
        drop(script_file);

        info!(task = %task.name, exit_code = code, "script exited");
        if code != 0 {
            return Err(TaskExecError::CommandFailed { code });
        }

        let output = std::fs::read_to_string(&out_file)
            .with_context(|| format!("reading output file {:?}", &*out_file))?;
        ScriptResult::parse(&output)
    }

    fn environment(&self) -> Result<HashMap<String, String>> {
        let mut env = HashMap::new();
        collect_environment_variables(&mut env, self.variables.as_ref())?;
        Ok(env)
    }
}

/// Script body from `script` or the file named by `script_file`.
fn load_script(params: &Params, workspace: &Workspace) -> Result<String> {
    if let Some(body) = params.get_str(SCRIPT_PARAM)? {
        return Ok(body.to_string());
    }
    if let Some(file) = params.get_str(SCRIPT_FILE_PARAM)? {
        let path = workspace.path().join(file);
        let body = std::fs::read_to_string(&path)
            .with_context(|| format!("reading script file {:?}", path))?;
        return Ok(body);
    }
    Err(TaskExecError::ConfigError(format!(
        "one of '{}', '{}' or '{}' is required",
        COMMAND_PARAM, SCRIPT_PARAM, SCRIPT_FILE_PARAM
    )))
}

/// Write the script to stdin, close it, then wait for exit.
///
/// Closing stdin is what tells the interpreter the program is complete;
/// leaving it open would hang the child forever.
async fn feed_and_wait(
    child: &mut Child,
    stdin: Option<ChildStdin>,
    script: &[u8],
    task: &str,
) -> Result<i32> {
    if let Some(mut stdin) = stdin {
        match stdin.write_all(script).await {
            Ok(()) => {}
            // The interpreter exited without reading everything; its exit
            // code tells the rest of the story.
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                debug!(task = %task, "interpreter closed stdin early");
            }
            Err(e) => return Err(e.into()),
        }
        drop(stdin);
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for interpreter of task '{}'", task))?;
    Ok(status.code().unwrap_or(-1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::LocalCommandLauncher;
    use crate::secrets::StaticSecrets;
    use serde_json::Value;
    use std::time::Duration;

    fn sh() -> Interpreter {
        Interpreter {
            program: "sh".into(),
            include_flag: None,
            require_flag: None,
            stdin_args: vec!["-s".into(), "--".into()],
            file_args: Vec::new(),
            delivery: ScriptDelivery::Stdin,
            runner_script: "printf '{\"export_params\":{\"cmd\":\"%s\"}}' \"$1\" > \"$3\"\n".into(),
        }
    }

    fn runner(interpreter: Interpreter) -> SyncSubprocessRunner<LocalCommandLauncher> {
        SyncSubprocessRunner::new(
            LocalCommandLauncher::default(),
            interpreter,
            Arc::new(StaticSecrets::default().with("TASK_TOKEN", "abc")),
        )
    }

    fn params(v: Value) -> Params {
        Params::from_value(v).unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn inline_command_goes_through_runner_shim() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path(), ".").unwrap();
        let result = runner(sh())
            .run(
                &params(json!({"_command": "Job.run"})),
                &Params::new(),
                &ws,
                &TaskIdentity::new(1, "inline"),
            )
            .await
            .unwrap();
        assert_eq!(result.export_params.into_value(), json!({"cmd": "Job.run"}));
        assert!(result.store_params.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn privileged_variables_reach_the_script() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path(), ".").unwrap();
        let script = "printf '{\"store_params\":{\"token\":\"%s\"}}' \"$TASK_TOKEN\" > \"$2\"\n";
        let result = runner(sh())
            .run(
                &params(json!({"script": script})),
                &Params::new(),
                &ws,
                &TaskIdentity::new(1, "env"),
            )
            .await
            .unwrap();
        assert_eq!(result.store_params.into_value(), json!({"token": "abc"}));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn last_state_overrides_params() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path(), ".").unwrap();
        let out_path = dir.path().join("seen.json");
        let script = format!("cp \"$1\" '{}'\necho '{{}}' > \"$2\"\n", out_path.display());
        runner(sh())
            .run(
                &params(json!({"script": script, "n": 1})),
                &params(json!({"n": 2})),
                &ws,
                &TaskIdentity::new(1, "state"),
            )
            .await
            .unwrap();
        let seen: Value = serde_json::from_str(&std::fs::read_to_string(out_path).unwrap()).unwrap();
        assert_eq!(seen["params"]["n"], json!(2));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancellation_kills_the_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path(), ".").unwrap();
        let started = std::time::Instant::now();
        let err = runner(sh())
            .run_until(
                &params(json!({"script": "sleep 30\n"})),
                &Params::new(),
                &ws,
                &TaskIdentity::new(1, "cancel"),
                tokio::time::sleep(Duration::from_millis(100)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TaskExecError::Interrupted(_)), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn missing_script_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path(), ".").unwrap();
        let err = runner(sh())
            .run(&Params::new(), &Params::new(), &ws, &TaskIdentity::new(1, "none"))
            .await
            .unwrap_err();
        assert!(err.is_config_error());
    }
}
