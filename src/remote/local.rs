// src/remote/local.rs

//! Transport that runs the remote protocol on this machine.
//!
//! Useful for single-host provisioning and for exercising the full launch
//! and wait protocol in tests with a real shell.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tokio::process::Command;

use crate::remote::transport::{BoxFuture, ScriptOutput, Transport, run_with_stdin};

#[derive(Debug, Clone, Default)]
pub struct LocalTransport {
    /// `HOME` for launched scripts; user archives extract here.
    home: Option<PathBuf>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: Some(home.into()),
        }
    }
}

impl Transport for LocalTransport {
    fn describe(&self) -> String {
        "localhost".to_string()
    }

    fn copy_files<'a>(
        &'a self,
        files: &'a [PathBuf],
        remote_dir: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let dir = Path::new(remote_dir);
            for file in files {
                let name = file
                    .file_name()
                    .ok_or_else(|| anyhow!("cannot copy {:?}: no file name", file))?;
                tokio::fs::copy(file, dir.join(name))
                    .await
                    .with_context(|| format!("copying {:?} into {remote_dir}", file))?;
            }
            Ok(())
        })
    }

    fn run_script<'a>(&'a self, script: &'a str) -> BoxFuture<'a, Result<ScriptOutput>> {
        Box::pin(async move {
            let mut cmd = Command::new("bash");
            cmd.arg("-s");
            if let Some(home) = &self.home {
                cmd.env("HOME", home);
            }
            run_with_stdin(cmd, script).await
        })
    }

    fn read_file<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            match tokio::fs::read_to_string(path).await {
                Ok(text) => Ok(Some(text)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e).with_context(|| format!("reading {path}")),
            }
        })
    }
}
