// src/lib.rs

pub mod batch;
pub mod cli;
pub mod config;
pub mod driver;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod params;
pub mod script;
pub mod secrets;
pub mod state;
pub mod template;
pub mod types;
pub mod workspace;

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use crate::batch::ProjectionMode;
use crate::cli::{CliArgs, Command};
use crate::config::loader::{default_config_path, load_and_validate};
use crate::config::model::ConfigFile;
use crate::driver::DriveOutcome;

/// Process exit code while a `--once` batch step is still running.
pub const EXIT_PENDING: i32 = 2;

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the task definition, then dispatches to the
/// subcommand. Returns the process exit code on success.
pub async fn run(args: CliArgs) -> Result<i32> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let cfg = load_and_validate(&config_path)?;

    match args.command {
        Command::Check => {
            print_check(&cfg);
            Ok(0)
        }
        Command::Batch { state, once } => {
            let state_file = state_file(&cfg, state.as_deref());
            match driver::run_batch(&cfg, &state_file, once).await? {
                DriveOutcome::Completed => Ok(0),
                DriveOutcome::Pending { retry_after } => {
                    println!("pending: poll again in {:?}", retry_after);
                    Ok(EXIT_PENDING)
                }
            }
        }
        Command::Script { state } => {
            let state_file = state_file(&cfg, state.as_deref());
            let result = driver::run_script(&cfg, &state_file).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(0)
        }
    }
}

fn state_file(cfg: &ConfigFile, cli_state: Option<&Path>) -> PathBuf {
    cli_state
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cfg.state_file())
}

/// Print the resolved task definition without launching anything.
fn print_check(cfg: &ConfigFile) {
    println!("taskexec check");
    println!("  task = {} (id {})", cfg.executor.task_name, cfg.executor.task_id);
    println!("  project_path = {}", cfg.executor.project_path.display());
    println!("  working_dir = {}", cfg.executor.working_dir.display());
    println!("  state_file = {}", cfg.state_file().display());
    println!("  mode = {:?}", cfg.executor.mode);
    println!("  poll_interval = {:?}", cfg.poll_interval);
    println!();

    let mut batch_cmd = vec![cfg.batch.program.clone()];
    batch_cmd.extend(cfg.batch.args.iter().cloned());
    batch_cmd.push(format!("<temp dir>/{}", cfg.batch.config_file_name));
    println!("batch:");
    println!("  cmd: {}", batch_cmd.join(" "));
    println!("  projection: {:?}", ProjectionMode::for_params(&cfg.params));
    println!();

    println!("script:");
    println!("  interpreter: {}", cfg.script.interpreter);
    println!("  delivery: {:?}", cfg.script.delivery);
    if !cfg.privileged.is_empty() {
        let names: Vec<&str> = cfg.privileged.keys().map(String::as_str).collect();
        println!("  privileged: {:?}", names);
    }
    if !cfg.secrets.is_empty() {
        println!("  secrets: {} defined", cfg.secrets.len());
    }

    debug!("check complete (no execution)");
}
