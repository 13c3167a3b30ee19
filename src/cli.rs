// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `taskexec`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskexec",
    version,
    about = "Run external batch tools and interpreter scripts as resumable tasks.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the task definition (TOML).
    ///
    /// Default: `Taskexec.toml` in the current working directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKEXEC_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Submit or poll the batch command, persisting progress to the state file.
    Batch {
        /// State file. Defaults to `[executor].state_file`.
        #[arg(long, value_name = "PATH")]
        state: Option<PathBuf>,

        /// Perform a single step and exit (code 2 while still running).
        #[arg(long)]
        once: bool,
    },

    /// Run the interpreter script to completion and print its result as JSON.
    Script {
        /// State file. Defaults to `[executor].state_file`.
        #[arg(long, value_name = "PATH")]
        state: Option<PathBuf>,
    },

    /// Validate the task definition and print what would run.
    Check,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_batch_once_with_state() {
        let args = CliArgs::try_parse_from([
            "taskexec", "--config", "job.toml", "batch", "--once", "--state", "s.json",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("job.toml")));
        match args.command {
            Command::Batch { state, once } => {
                assert!(once);
                assert_eq!(state, Some(PathBuf::from("s.json")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn config_defaults_and_subcommand_required() {
        let args = CliArgs::try_parse_from(["taskexec", "check"]).unwrap();
        assert_eq!(args.config, None);
        assert!(CliArgs::try_parse_from(["taskexec"]).is_err());
    }
}
