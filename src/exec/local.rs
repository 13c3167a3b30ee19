// src/exec/local.rs

//! Local process launcher.
//!
//! Two batch modes:
//! - [`LaunchMode::Blocking`]: `run` waits for the command, streaming its
//!   output to the log sink, and returns a finished handle.
//! - [`LaunchMode::Detached`]: `run` starts the command behind a small `sh`
//!   wrapper that records the exit code in `<io dir>/exit_code` and the output
//!   in `<io dir>/command.log`, then returns immediately. `poll` only looks at
//!   those files, so any later process (including a restarted orchestrator)
//!   can observe completion from the persisted handle.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::Context;
use serde_json::{Value, json};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::errors::{Result, TaskExecError};
use crate::types::LaunchMode;

use super::launcher::{BoxFuture, CommandLauncher, ProcessSpec};
use super::output::{copy_log_file, spawn_line_copier};
use super::request::{ExecutionContext, ExecutionRequest};
use super::status::CommandStatus;

pub const EXIT_CODE_FILE: &str = "exit_code";
pub const LOG_FILE: &str = "command.log";

/// `$0` is the io directory, `"$@"` the command.
const DETACHED_WRAPPER: &str = r#"dir="$0"
"$@" >"$dir/command.log" 2>&1
code=$?
echo "$code" >"$dir/exit_code.tmp" && mv "$dir/exit_code.tmp" "$dir/exit_code""#;

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCommandLauncher {
    mode: LaunchMode,
}

impl LocalCommandLauncher {
    pub fn new(mode: LaunchMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> LaunchMode {
        self.mode
    }

    async fn run_blocking(
        &self,
        context: &ExecutionContext,
        request: &ExecutionRequest,
    ) -> Result<CommandStatus> {
        let (program, args) = split_command(request)?;
        let task = context.task.name.clone();

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(context.resolve(&request.working_directory))
            .envs(&request.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(task = %task, cmd = %request.command.join(" "), "starting command");

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for task '{}'", task))?;

        let stdout = child.stdout.take().map(|s| spawn_line_copier(s, task.clone(), "stdout"));
        let stderr = child.stderr.take().map(|s| spawn_line_copier(s, task.clone(), "stderr"));

        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for process of task '{}'", task))?;

        for copier in [stdout, stderr].into_iter().flatten() {
            if let Err(e) = copier.await {
                warn!(task = %task, error = %e, "output copier task failed");
            }
        }

        let code = status.code().unwrap_or(-1);
        info!(task = %task, exit_code = code, success = status.success(), "command exited");

        Ok(CommandStatus::finished(
            code,
            json!({ "io_directory": request.io_directory.to_string_lossy() }),
        ))
    }

    async fn run_detached(
        &self,
        context: &ExecutionContext,
        request: &ExecutionRequest,
    ) -> Result<CommandStatus> {
        if cfg!(windows) {
            return Err(TaskExecError::ConfigError(
                "detached launch mode requires a POSIX shell".to_string(),
            ));
        }
        split_command(request)?;
        let task = &context.task.name;
        let io_dir = context.resolve(&request.io_directory);
        tokio::fs::create_dir_all(&io_dir)
            .await
            .with_context(|| format!("creating io directory {:?}", io_dir))?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(DETACHED_WRAPPER)
            .arg(&io_dir)
            .args(&request.command)
            .current_dir(context.resolve(&request.working_directory))
            .envs(&request.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);
        // Own process group: a terminal Ctrl-C aimed at us must not reach the job.
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd
            .spawn()
            .with_context(|| format!("spawning detached process for task '{}'", task))?;
        let pid = child.id();

        info!(
            task = %task,
            pid = ?pid,
            io_directory = ?request.io_directory,
            cmd = %request.command.join(" "),
            "started detached command"
        );

        // Dropping the handle leaves the process running; tokio reaps it if it
        // exits while we are still alive.
        drop(child);

        Ok(CommandStatus::running(json!({
            "io_directory": request.io_directory.to_string_lossy(),
            "pid": pid,
        })))
    }

    async fn poll_detached(
        &self,
        context: &ExecutionContext,
        previous: &CommandStatus,
    ) -> Result<CommandStatus> {
        let detail = previous.detail();
        let io_dir = io_directory_of(detail)?;
        let io_dir = context.resolve(&io_dir);
        let task = &context.task.name;

        if let Some(code) = read_exit_code(&io_dir).await? {
            info!(task = %task, exit_code = code, "detached command finished");
            copy_log_file(&io_dir.join(LOG_FILE), task).await;
            return Ok(CommandStatus::finished(code, detail.clone()));
        }

        if let Some(pid) = detail.get("pid").and_then(Value::as_u64) {
            if !process_alive(pid).await {
                // It may have finished between the two checks.
                if let Some(code) = read_exit_code(&io_dir).await? {
                    copy_log_file(&io_dir.join(LOG_FILE), task).await;
                    return Ok(CommandStatus::finished(code, detail.clone()));
                }
                warn!(task = %task, pid, "detached command vanished without an exit code");
                copy_log_file(&io_dir.join(LOG_FILE), task).await;
                return Ok(CommandStatus::finished(-1, detail.clone()));
            }
        }

        debug!(task = %task, "detached command still running");
        Ok(previous.clone())
    }
}

impl CommandLauncher for LocalCommandLauncher {
    fn run<'a>(
        &'a self,
        context: &'a ExecutionContext,
        request: &'a ExecutionRequest,
    ) -> BoxFuture<'a, Result<CommandStatus>> {
        Box::pin(async move {
            match self.mode {
                LaunchMode::Blocking => self.run_blocking(context, request).await,
                LaunchMode::Detached => self.run_detached(context, request).await,
            }
        })
    }

    fn poll<'a>(
        &'a self,
        context: &'a ExecutionContext,
        previous: &'a CommandStatus,
    ) -> BoxFuture<'a, Result<CommandStatus>> {
        Box::pin(async move {
            if previous.is_finished() {
                return Ok(previous.clone());
            }
            self.poll_detached(context, previous).await
        })
    }

    fn start(&self, cwd: PathBuf, context: &ExecutionContext, spec: ProcessSpec) -> Result<Child> {
        let stdin = if spec.pipe_stdin {
            Stdio::piped()
        } else {
            Stdio::null()
        };

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&cwd)
            .envs(&spec.env)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(task = %context.task.name, cmd = %spec.command_line(), cwd = ?cwd, "spawning process");

        let child = cmd.spawn().with_context(|| {
            format!(
                "spawning '{}' for task '{}'",
                spec.program, context.task.name
            )
        })?;
        Ok(child)
    }
}

fn split_command(request: &ExecutionRequest) -> Result<(&str, &[String])> {
    match request.command.split_first() {
        Some((program, args)) => Ok((program.as_str(), args)),
        None => Err(TaskExecError::ConfigError(
            "execution request has an empty command".to_string(),
        )),
    }
}

fn io_directory_of(detail: &Value) -> Result<PathBuf> {
    detail
        .get("io_directory")
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .ok_or_else(|| {
            TaskExecError::StatusDecode("command status has no io_directory".to_string())
        })
}

async fn read_exit_code(io_dir: &Path) -> Result<Option<i32>> {
    let path = io_dir.join(EXIT_CODE_FILE);
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => {
            let code = contents.trim().parse::<i32>().map_err(|e| {
                TaskExecError::StatusDecode(format!("invalid exit code in {:?}: {}", path, e))
            })?;
            Ok(Some(code))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn process_alive(pid: u64) -> bool {
    match Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        Ok(status) => status.success(),
        // Can't tell; keep waiting for the exit-code file.
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::request::TaskIdentity;
    use std::collections::HashMap;
    use std::time::Duration;

    fn context(root: &Path) -> ExecutionContext {
        ExecutionContext::new(root, TaskIdentity::new(1, "local-test"))
    }

    fn request(cmd: &[&str]) -> ExecutionRequest {
        ExecutionRequest {
            working_directory: PathBuf::new(),
            io_directory: PathBuf::from("io"),
            command: cmd.iter().map(|s| s.to_string()).collect(),
            environment: HashMap::from([("GREETING".to_string(), "hi".to_string())]),
        }
    }

    #[tokio::test]
    async fn blocking_run_returns_finished_status() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = LocalCommandLauncher::new(LaunchMode::Blocking);
        let ctx = context(dir.path());

        let ok = launcher.run(&ctx, &request(&["sh", "-c", "echo $GREETING"])).await.unwrap();
        assert!(ok.is_finished());
        assert_eq!(ok.exit_code(), Some(0));

        let failed = launcher.run(&ctx, &request(&["sh", "-c", "exit 4"])).await.unwrap();
        assert_eq!(failed.exit_code(), Some(4));
    }

    #[tokio::test]
    async fn empty_command_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = LocalCommandLauncher::new(LaunchMode::Blocking);
        let err = launcher.run(&context(dir.path()), &request(&[])).await.unwrap_err();
        assert!(err.is_config_error());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn detached_run_is_observed_through_poll() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = LocalCommandLauncher::new(LaunchMode::Detached);
        let ctx = context(dir.path());

        let status = launcher
            .run(&ctx, &request(&["sh", "-c", "sleep 0.2; echo $GREETING; exit 3"]))
            .await
            .unwrap();
        assert!(!status.is_finished());

        // A fresh launcher stands in for a restarted orchestrator.
        let resumed = LocalCommandLauncher::new(LaunchMode::Detached);
        let persisted = CommandStatus::from_value(&status.to_value().unwrap()).unwrap();

        let mut current = persisted;
        for _ in 0..100 {
            current = resumed.poll(&ctx, &current).await.unwrap();
            if current.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        assert!(current.is_finished());
        assert_eq!(current.exit_code(), Some(3));
        let log = std::fs::read_to_string(dir.path().join("io").join(LOG_FILE)).unwrap();
        assert_eq!(log.trim(), "hi");
    }

    #[cfg(unix)]
    async fn pgid_of(pid: u32) -> String {
        let out = Command::new("ps")
            .args(["-o", "pgid=", "-p", &pid.to_string()])
            .output()
            .await
            .unwrap();
        String::from_utf8_lossy(&out.stdout).trim().to_string()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn detached_command_runs_in_its_own_process_group() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = LocalCommandLauncher::new(LaunchMode::Detached);
        let ctx = context(dir.path());

        let status = launcher.run(&ctx, &request(&["sleep", "5"])).await.unwrap();
        let pid = status.detail()["pid"].as_u64().unwrap() as u32;

        let child_group = pgid_of(pid).await;
        let own_group = pgid_of(std::process::id()).await;
        let _ = Command::new("kill")
            .args(["-TERM", "--", &format!("-{pid}")])
            .status()
            .await;

        assert_eq!(child_group, pid.to_string());
        assert_ne!(child_group, own_group);
    }

    #[tokio::test]
    async fn poll_of_finished_status_is_identity() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = LocalCommandLauncher::default();
        let done = CommandStatus::finished(0, json!({"io_directory": "io"}));
        let polled = launcher.poll(&context(dir.path()), &done).await.unwrap();
        assert_eq!(polled, done);
    }

    #[tokio::test]
    async fn poll_without_io_directory_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = LocalCommandLauncher::default();
        let err = launcher
            .poll(&context(dir.path()), &CommandStatus::running(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskExecError::StatusDecode(_)));
    }
}
