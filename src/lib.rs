// src/lib.rs

pub mod bundle;
pub mod cli;
pub mod config;
pub mod dag;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod plan;
pub mod remote;
pub mod status;
pub mod task;
pub mod types;

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::bundle::FileBundler;
use crate::cli::{CliArgs, Command};
use crate::config::{ConfigFile, default_config_path, load_or_default};
use crate::errors::TaskshipError;
use crate::plan::{TaskPlan, register_install_task, split_packages};
use crate::remote::{
    LaunchOptions, Launcher, LocalTransport, RemoteLayout, SshTransport, Transport,
};
use crate::task::TaskLoader;
use crate::types::TaskName;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - task loading and resolution
/// - bundling and launch over the selected transport
/// - status queries against the remote state files
pub async fn run(args: CliArgs) -> Result<()> {
    let (config_path, explicit) = match &args.config {
        Some(path) => (PathBuf::from(path), true),
        None => (default_config_path(), false),
    };
    let cfg = load_or_default(&config_path, explicit)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    debug!(dirs = ?cfg.tasks.dirs, remote_dir = %cfg.tasks.remote_dir, "configuration loaded");

    let loader = TaskLoader::new(cfg.tasks.dirs.clone());
    let layout = RemoteLayout::new(cfg.tasks.remote_dir.clone());

    match &args.command {
        Command::List => {
            for name in loader.list()? {
                println!("{name}");
            }
            Ok(())
        }

        Command::Info { task } => {
            print!("{}", render_info(&loader, task)?);
            Ok(())
        }

        Command::Run {
            tasks,
            dry_run,
            wait,
            install,
        } => {
            let mut packages = cfg.profile.install.clone();
            if let Some(extra) = install {
                packages.extend(split_packages(extra));
            }

            let mut requested: Vec<TaskName> = tasks.clone();
            if let Some(name) = register_install_task(&loader, &packages) {
                requested.push(name);
            }

            let plan = TaskPlan::resolve(&loader, &requested, &cfg.profile.tasks)?;
            if *dry_run || !plan.has_tasks() {
                print!("{}", plan.dry_run());
                return Ok(());
            }

            let transport = build_transport(&args, &cfg)?;
            let bundler = FileBundler::new(cfg.tasks.cache_dir.clone(), cfg.tasks.workers);
            let launcher = Launcher::new(
                Arc::clone(&transport),
                layout.clone(),
                LaunchOptions {
                    timeout: cfg.tasks.timeout,
                    poll_interval: cfg.tasks.poll_interval,
                    workers: cfg.tasks.workers,
                    ..LaunchOptions::default()
                },
            );

            let report = plan.launch(&bundler, &launcher).await?;
            for (task, outcome) in &report.outcomes {
                println!("{task}: {outcome}");
            }

            let mut errors = report.errors();
            if *wait {
                let statuses = plan
                    .join(&report, transport.as_ref(), &layout, cfg.tasks.poll_interval)
                    .await?;
                print!("{}", status::render_status_table(&statuses));
                errors.extend(status::failures(&statuses));
            }

            report_failures(errors)
        }

        Command::Status { tasks } => {
            let transport = build_transport(&args, &cfg)?;
            let statuses = status::query_status(transport.as_ref(), &layout, tasks).await?;
            if statuses.is_empty() {
                println!("No tasks found under {}", layout.base());
            } else {
                print!("{}", status::render_status_table(&statuses));
            }
            Ok(())
        }

        Command::Wait { task } => {
            let transport = build_transport(&args, &cfg)?;
            let statuses = status::join(
                transport.as_ref(),
                &layout,
                std::slice::from_ref(task),
                cfg.tasks.poll_interval,
            )
            .await?;
            print!("{}", status::render_status_table(&statuses));
            report_failures(status::failures(&statuses))
        }

        Command::Join { tasks } => {
            let transport = build_transport(&args, &cfg)?;
            let statuses =
                status::join(transport.as_ref(), &layout, tasks, cfg.tasks.poll_interval).await?;
            print!("{}", status::render_status_table(&statuses));
            report_failures(status::failures(&statuses))
        }
    }
}

/// Pick the transport: `--local`, else ssh to `--host` or `[ssh].host`.
fn build_transport(args: &CliArgs, cfg: &ConfigFile) -> Result<Arc<dyn Transport>> {
    if args.local {
        info!("using local transport");
        return Ok(Arc::new(LocalTransport::new()));
    }

    let host = args
        .host
        .clone()
        .or_else(|| cfg.ssh.host.clone())
        .ok_or_else(|| {
            TaskshipError::Config("no host given; pass --host, --local or set [ssh].host".into())
        })?;

    let mut ssh = SshTransport::new(host);
    if let Some(user) = &cfg.ssh.user {
        ssh = ssh.with_user(user.clone());
    }
    if let Some(port) = cfg.ssh.port {
        ssh = ssh.with_port(port);
    }
    if let Some(key) = &cfg.ssh.private_key {
        ssh = ssh.with_private_key(fs::expand_home(key));
    }
    let ssh = ssh.with_args(cfg.ssh.args.clone())?;

    info!(host = %ssh.target(), "using ssh transport");
    Ok(Arc::new(ssh))
}

/// Source path, dependencies, conflicts and normalised body of one task.
fn render_info(loader: &TaskLoader, name: &str) -> Result<String> {
    let desc = loader.load(name)?;

    let path = desc
        .path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(generated)".to_string());

    let mut out = format!("Task: {}\nSource: {path}\n", desc.name);
    let lists: [(&str, &[TaskName]); 4] = [
        ("Depends on", &desc.required_deps),
        ("Maybe depends on", &desc.optional_deps),
        ("Conflicts with", &desc.conflicts),
        ("Prerequisite for", &desc.successors),
    ];
    for (label, names) in lists {
        if !names.is_empty() {
            let _ = writeln!(out, "{label}: {}", names.join(", "));
        }
    }
    if desc.run_once {
        out.push_str("Runs once\n");
    }
    out.push('\n');
    out.push_str(&desc.body);
    if !desc.body.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

fn report_failures(errors: Vec<TaskshipError>) -> Result<()> {
    if errors.len() > 1 {
        for err in &errors {
            eprintln!("{err}");
        }
        bail!("{} tasks did not complete successfully", errors.len());
    }
    match errors.into_iter().next() {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}
