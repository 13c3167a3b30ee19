// src/batch/mod.rs

//! Asynchronous, crash-resumable batch execution.
//!
//! - [`projector`] writes the configuration file the batch tool reads.
//! - [`controller`] owns the submit-or-poll state machine.

use std::time::Duration;

use crate::errors::{Result, TaskExecError};

pub mod controller;
pub mod projector;

pub use controller::{BatchSettings, DEFAULT_POLL_INTERVAL, ResumableExecutionController};
pub use projector::{ConfigProjector, ProjectionMode};

/// Final outcome of an external command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed(i32),
}

/// Result of one [`ResumableExecutionController::advance`] step.
///
/// `Pending` is not an error: the orchestrator is expected to call
/// `advance` again with the returned task state after `retry_after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Completed(TaskOutcome),
    Pending { retry_after: Duration },
}

impl Advance {
    pub fn is_pending(&self) -> bool {
        matches!(self, Advance::Pending { .. })
    }

    /// Collapse a completed step into the usual error style: a failed
    /// command becomes [`TaskExecError::CommandFailed`]. Returns
    /// `Ok(Some(retry_after))` while pending.
    pub fn into_result(self) -> Result<Option<Duration>> {
        match self {
            Advance::Completed(TaskOutcome::Success) => Ok(None),
            Advance::Completed(TaskOutcome::Failed(code)) => {
                Err(TaskExecError::CommandFailed { code })
            }
            Advance::Pending { retry_after } => Ok(Some(retry_after)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_result_maps_each_state() {
        assert_eq!(Advance::Completed(TaskOutcome::Success).into_result().unwrap(), None);
        assert_eq!(
            Advance::Pending { retry_after: Duration::from_secs(3) }
                .into_result()
                .unwrap(),
            Some(Duration::from_secs(3))
        );
        let err = Advance::Completed(TaskOutcome::Failed(9)).into_result().unwrap_err();
        assert_eq!(err.exit_code(), Some(9));
    }
}
