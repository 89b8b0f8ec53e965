// src/remote/ssh.rs

//! Transport over the system `ssh` and `scp` binaries.

use std::path::PathBuf;

use anyhow::{Result, anyhow, bail};
use shell_escape::unix::escape;
use tokio::process::Command;
use tracing::debug;

use crate::remote::transport::{BoxFuture, ScriptOutput, Transport, run_with_stdin};

/// Options applied to every connection.
///
/// Cloud instances recycle addresses, so host key checking would only ever
/// produce prompts or spurious verification failures. Everything runs
/// non-interactively.
pub const SSH_OPTIONS: &[&str] = &[
    "-oBatchMode=yes",
    "-oCheckHostIP=no",
    "-oStrictHostKeyChecking=no",
    "-oUpdateHostKeys=no",
    "-oUserKnownHostsFile=/dev/null",
    "-oLogLevel=ERROR",
    "-oServerAliveInterval=60",
    "-oTCPKeepAlive=yes",
];

/// Exit status ssh itself uses for connection-level failures.
const SSH_FAILURE_CODE: i32 = 255;

/// Exit status of the read-file helper when the file does not exist.
const ABSENT_FILE_CODE: i32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTransport {
    host: String,
    user: Option<String>,
    port: Option<u16>,
    private_key: Option<PathBuf>,
    extra_args: Vec<String>,
}

impl SshTransport {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: None,
            port: None,
            private_key: None,
            extra_args: Vec::new(),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_private_key(mut self, key: impl Into<PathBuf>) -> Self {
        self.private_key = Some(key.into());
        self
    }

    /// Extra options passed to both ssh and scp.
    ///
    /// `-i` is rejected here: the key comes from [`Self::with_private_key`].
    pub fn with_args(mut self, args: Vec<String>) -> Result<Self> {
        if args.iter().any(|a| a == "-i" || a.starts_with("-i")) {
            bail!("ssh args must not contain -i; configure the private key instead");
        }
        self.extra_args = args;
        Ok(self)
    }

    pub fn target(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }

    fn common_args(&self) -> Vec<String> {
        let mut args: Vec<String> = SSH_OPTIONS.iter().map(|s| s.to_string()).collect();
        args.extend(self.extra_args.iter().cloned());
        if let Some(key) = &self.private_key {
            args.push("-i".into());
            args.push(key.display().to_string());
        }
        args
    }

    /// Argument vector for running a script read from stdin.
    pub fn ssh_argv(&self) -> Vec<String> {
        let mut argv = vec!["ssh".to_string()];
        argv.extend(self.common_args());
        if let Some(port) = self.port {
            argv.push("-p".into());
            argv.push(port.to_string());
        }
        argv.push("-q".into());
        argv.push(self.target());
        argv.push("bash -s".into());
        argv
    }

    /// Argument vector for copying `files` into `remote_dir`.
    pub fn scp_argv(&self, files: &[PathBuf], remote_dir: &str) -> Vec<String> {
        let mut argv = vec!["scp".to_string()];
        argv.extend(self.common_args());
        if let Some(port) = self.port {
            argv.push("-P".into());
            argv.push(port.to_string());
        }
        argv.push("-q".into());
        argv.extend(files.iter().map(|f| f.display().to_string()));
        argv.push(format!("{}:{}/", self.target(), remote_dir));
        argv
    }

    fn command(argv: &[String]) -> Result<Command> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("empty command line"))?;
        let mut cmd = Command::new(program);
        cmd.args(args);
        Ok(cmd)
    }
}

impl Transport for SshTransport {
    fn describe(&self) -> String {
        format!("ssh {}", self.target())
    }

    fn copy_files<'a>(
        &'a self,
        files: &'a [PathBuf],
        remote_dir: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if files.is_empty() {
                return Ok(());
            }
            let argv = self.scp_argv(files, remote_dir);
            debug!(host = %self.target(), files = files.len(), remote_dir, "copying payload");
            let out = run_with_stdin(Self::command(&argv)?, "").await?;
            if !out.success() {
                bail!(
                    "scp to {}:{} failed (code {}): {}",
                    self.target(),
                    remote_dir,
                    out.code,
                    out.stderr.trim()
                );
            }
            Ok(())
        })
    }

    fn run_script<'a>(&'a self, script: &'a str) -> BoxFuture<'a, Result<ScriptOutput>> {
        Box::pin(async move {
            let argv = self.ssh_argv();
            let out = run_with_stdin(Self::command(&argv)?, script).await?;
            if out.code == SSH_FAILURE_CODE {
                bail!(
                    "ssh to {} failed: {}",
                    self.target(),
                    out.stderr.trim()
                );
            }
            Ok(out)
        })
    }

    fn read_file<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            let quoted = escape(path.into());
            let script = format!("[ -f {quoted} ] || exit {ABSENT_FILE_CODE}\ncat {quoted}\n");
            let out = self.run_script(&script).await?;
            match out.code {
                0 => Ok(Some(out.stdout)),
                ABSENT_FILE_CODE => Ok(None),
                code => bail!("reading {path} failed (code {code}): {}", out.stderr.trim()),
            }
        })
    }
}
