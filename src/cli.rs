// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `taskship`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskship",
    version,
    about = "Launch dependent shell tasks on a remote host and track them.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Taskship.toml` in the current working directory, if present.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKSHIP_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Host to connect to, overriding `[ssh].host`.
    #[arg(long, global = true, value_name = "HOST")]
    pub host: Option<String>,

    /// Run tasks on this machine instead of over ssh.
    #[arg(long, global = true)]
    pub local: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Resolve, bundle and launch tasks (plus their dependencies).
    Run {
        /// Task names to run.
        #[arg(value_name = "TASK")]
        tasks: Vec<String>,

        /// Print the launch plan without touching the host.
        #[arg(long)]
        dry_run: bool,

        /// Wait for the launched tasks to finish.
        #[arg(long)]
        wait: bool,

        /// Extra packages to install, comma or space separated.
        #[arg(long, value_name = "PKGS")]
        install: Option<String>,
    },

    /// Show the status of tasks on the host (all tasks if none given).
    Status {
        #[arg(value_name = "TASK")]
        tasks: Vec<String>,
    },

    /// Wait for one task to finish.
    Wait {
        #[arg(value_name = "TASK")]
        task: String,
    },

    /// Wait for tasks to finish (all tasks on the host if none given).
    Join {
        #[arg(value_name = "TASK")]
        tasks: Vec<String>,
    },

    /// Show a task's source, dependencies and normalised script.
    Info {
        #[arg(value_name = "TASK")]
        task: String,
    },

    /// List available tasks.
    List,
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
