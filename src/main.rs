// src/main.rs

//! `taskship` binary.
//!
//! Flags are parsed and logging is installed before anything touches the
//! task directories, so config and resolution errors are logged too. Each
//! subcommand then runs to completion in [`taskship::run`]:
//!
//! - `list` / `info` / `run --dry-run` only read local task scripts;
//! - `run` resolves, bundles and launches, and with `--wait` joins;
//! - `status` / `wait` / `join` only read state files on the host.
//!
//! Any error ends the process with exit code 1.

use taskship::{cli, logging, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("taskship error: {err:#}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
