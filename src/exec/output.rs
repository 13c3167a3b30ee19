// src/exec/output.rs

//! Copying command output into the log sink.
//!
//! Command stdout/stderr lines are re-emitted as `tracing` events under the
//! `taskexec::command` target, so they share the orchestrator's log stream
//! while the process's own stdout stays free.

use std::path::Path;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Spawn a task that forwards every line from `reader` to the log sink.
///
/// The task ends when the stream reaches EOF, i.e. when the process closes
/// its end of the pipe. Returns the number of lines copied.
pub fn spawn_line_copier<R>(reader: R, task: String, stream: &'static str) -> JoinHandle<usize>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut count = 0usize;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    count += 1;
                    info!(target: "taskexec::command", task = %task, stream, "{}", line);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(task = %task, stream, error = %e, "failed reading command output");
                    break;
                }
            }
        }
        count
    })
}

/// Forward the contents of a finished command's log file to the log sink.
pub async fn copy_log_file(path: &Path, task: &str) {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => {
            for line in contents.lines() {
                info!(target: "taskexec::command", task = %task, stream = "log", "{}", line);
            }
        }
        Err(e) => {
            warn!(task = %task, path = ?path, error = %e, "could not read command log");
        }
    }
}
