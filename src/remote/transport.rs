// src/remote/transport.rs

//! Remote execution transport abstraction.
//!
//! The launcher and the status coordinator only need three capabilities
//! from a host: copy files into a directory, run a short shell script (which
//! may detach long-running work and return immediately), and read files
//! back. Production code uses [`super::ssh::SshTransport`]; the same
//! protocol also runs on the local machine via
//! [`super::local::LocalTransport`], and tests provide in-memory fakes.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;

use crate::remote::state::{RemoteTaskState, parse_state_listing, state_listing_script};
use crate::types::TaskName;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Captured result of a script run on the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ScriptOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Trait abstracting how the orchestrator talks to a host.
///
/// Errors are reserved for the transport itself failing (connection refused,
/// binary missing); a script that runs and exits non-zero is reported
/// through [`ScriptOutput::code`].
pub trait Transport: Send + Sync {
    /// Human-readable target, used in logs.
    fn describe(&self) -> String;

    /// Copy local `files` into `remote_dir`, which already exists.
    fn copy_files<'a>(
        &'a self,
        files: &'a [PathBuf],
        remote_dir: &'a str,
    ) -> BoxFuture<'a, Result<()>>;

    /// Run `script` with bash on the host and wait for it to exit.
    fn run_script<'a>(&'a self, script: &'a str) -> BoxFuture<'a, Result<ScriptOutput>>;

    /// Read a file from the host. `Ok(None)` if it does not exist.
    fn read_file<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Option<String>>>;

    /// Read the `pid`/`status`/`wait` files of every task under `base_dir`
    /// in one round trip.
    fn read_states<'a>(
        &'a self,
        base_dir: &'a str,
    ) -> BoxFuture<'a, Result<BTreeMap<TaskName, RemoteTaskState>>> {
        Box::pin(async move {
            let out = self.run_script(&state_listing_script(base_dir)).await?;
            if !out.success() {
                anyhow::bail!(
                    "listing task state under {base_dir} failed (code {}): {}",
                    out.code,
                    out.stderr.trim()
                );
            }
            parse_state_listing(&out.stdout)
        })
    }
}

/// Spawn `cmd`, feed `script` on stdin and collect its output.
pub(crate) async fn run_with_stdin(
    mut cmd: tokio::process::Command,
    script: &str,
) -> Result<ScriptOutput> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let program = format!("{:?}", cmd.as_std().get_program());
    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning {program}"))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(script.as_bytes())
            .await
            .with_context(|| format!("writing script to {program}"))?;
        // Dropping stdin closes the pipe so bash sees EOF.
    }

    let output = child
        .wait_with_output()
        .await
        .with_context(|| format!("waiting for {program}"))?;

    Ok(ScriptOutput {
        code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
