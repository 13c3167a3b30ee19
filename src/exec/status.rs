// src/exec/status.rs

//! Command status handle: a serializable resumption token.
//!
//! A launcher produces a `CommandStatus` from `run` or `poll`. The caller
//! persists it between attempts and only ever asks two questions of it:
//! [`CommandStatus::is_finished`] and [`CommandStatus::exit_code`]. The
//! `detail` payload belongs to the launcher and is carried through
//! unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Result, TaskExecError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandStatus {
    finished: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    detail: Value,
}

impl CommandStatus {
    pub fn running(detail: Value) -> Self {
        Self {
            finished: false,
            status_code: None,
            detail,
        }
    }

    pub fn finished(status_code: i32, detail: Value) -> Self {
        Self {
            finished: true,
            status_code: Some(status_code),
            detail,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Exit code of a finished command; `None` while running.
    pub fn exit_code(&self) -> Option<i32> {
        if self.finished { self.status_code } else { None }
    }

    /// Launcher-specific payload.
    pub fn detail(&self) -> &Value {
        &self.detail
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode a persisted handle.
    ///
    /// Any shape problem is reported as [`TaskExecError::StatusDecode`]: the
    /// command behind a corrupt handle may still be running, so callers must
    /// not treat this like an absent handle.
    pub fn from_value(value: &Value) -> Result<Self> {
        let status: CommandStatus = serde_json::from_value(value.clone())
            .map_err(|e| TaskExecError::StatusDecode(e.to_string()))?;
        if status.finished && status.status_code.is_none() {
            return Err(TaskExecError::StatusDecode(
                "finished command status has no status_code".to_string(),
            ));
        }
        Ok(status)
    }
}
