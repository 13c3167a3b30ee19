use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::json;
use taskexec::errors::{Result, TaskExecError};
use taskexec::exec::{
    BoxFuture, CommandLauncher, CommandStatus, ExecutionContext, ExecutionRequest,
    LocalCommandLauncher, ProcessSpec,
};
use tokio::process::Child;

/// A fake launcher for the batch style that:
/// - records every submitted request and every poll,
/// - reports a job as running for `polls_until_finished` polls, then
///   finished with `exit_code`.
///
/// The remaining poll count travels inside the status handle, so a fresh
/// `FakeLauncher` picks up a job submitted by another instance the same way
/// a restarted process would.
///
/// `start` delegates to a real [`LocalCommandLauncher`] and records the spec.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    inner: Arc<Mutex<FakeState>>,
}

#[derive(Default)]
struct FakeState {
    polls_until_finished: u64,
    exit_code: i32,
    fail_poll: bool,
    submitted: Vec<ExecutionRequest>,
    polls: usize,
    started: Vec<ProcessSpec>,
}

impl FakeLauncher {
    pub fn new(polls_until_finished: u64, exit_code: i32) -> Self {
        let launcher = Self::default();
        {
            let mut state = launcher.inner.lock().unwrap();
            state.polls_until_finished = polls_until_finished;
            state.exit_code = exit_code;
        }
        launcher
    }

    /// Make every poll fail with a transport error.
    pub fn failing_polls(self) -> Self {
        self.inner.lock().unwrap().fail_poll = true;
        self
    }

    pub fn submitted(&self) -> Vec<ExecutionRequest> {
        self.inner.lock().unwrap().submitted.clone()
    }

    pub fn submit_count(&self) -> usize {
        self.inner.lock().unwrap().submitted.len()
    }

    pub fn poll_count(&self) -> usize {
        self.inner.lock().unwrap().polls
    }

    pub fn started(&self) -> Vec<ProcessSpec> {
        self.inner.lock().unwrap().started.clone()
    }
}

impl CommandLauncher for FakeLauncher {
    fn run<'a>(
        &'a self,
        _context: &'a ExecutionContext,
        request: &'a ExecutionRequest,
    ) -> BoxFuture<'a, Result<CommandStatus>> {
        Box::pin(async move {
            let mut state = self.inner.lock().unwrap();
            state.submitted.push(request.clone());
            let job = state.submitted.len();
            if state.polls_until_finished == 0 {
                Ok(CommandStatus::finished(state.exit_code, json!({ "job": job })))
            } else {
                Ok(CommandStatus::running(json!({
                    "job": job,
                    "remaining": state.polls_until_finished,
                })))
            }
        })
    }

    fn poll<'a>(
        &'a self,
        _context: &'a ExecutionContext,
        previous: &'a CommandStatus,
    ) -> BoxFuture<'a, Result<CommandStatus>> {
        Box::pin(async move {
            let mut state = self.inner.lock().unwrap();
            state.polls += 1;
            if state.fail_poll {
                return Err(TaskExecError::Other(anyhow::anyhow!("launcher unreachable")));
            }
            if previous.is_finished() {
                return Ok(previous.clone());
            }

            let detail = previous.detail();
            let job = detail.get("job").cloned().unwrap_or(json!(null));
            let remaining = detail
                .get("remaining")
                .and_then(|v| v.as_u64())
                .ok_or_else(|| TaskExecError::StatusDecode("missing 'remaining'".into()))?;

            if remaining <= 1 {
                Ok(CommandStatus::finished(state.exit_code, json!({ "job": job })))
            } else {
                Ok(CommandStatus::running(json!({
                    "job": job,
                    "remaining": remaining - 1,
                })))
            }
        })
    }

    fn start(
        &self,
        cwd: PathBuf,
        context: &ExecutionContext,
        spec: ProcessSpec,
    ) -> Result<Child> {
        self.inner.lock().unwrap().started.push(spec.clone());
        LocalCommandLauncher::default().start(cwd, context, spec)
    }
}
