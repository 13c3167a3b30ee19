// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`request`] defines the portable execution request and per-call context.
//! - [`status`] defines the serializable command status handle.
//! - [`launcher`] provides the `CommandLauncher` trait both execution styles
//!   go through, so tests can swap in a fake.
//! - [`local`] is the production launcher backed by `tokio::process`.
//! - [`output`] forwards command output to the log sink.

pub mod launcher;
pub mod local;
pub mod output;
pub mod request;
pub mod status;

pub use launcher::{BoxFuture, CommandLauncher, ProcessSpec};
pub use local::LocalCommandLauncher;
pub use request::{ExecutionContext, ExecutionRequest, TaskIdentity};
pub use status::CommandStatus;
