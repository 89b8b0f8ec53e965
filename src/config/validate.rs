// src/config/validate.rs

use std::path::PathBuf;
use std::time::Duration;

use crate::config::model::{ConfigFile, RawConfigFile, TaskSettings, TasksSection};
use crate::errors::{Result, TaskshipError};
use crate::fs::expand_home;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = TaskshipError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let tasks = validate_tasks_section(&raw.tasks)?;
        validate_ssh_section(&raw)?;
        Ok(ConfigFile::new_unchecked(tasks, raw.profile, raw.ssh))
    }
}

fn validate_tasks_section(section: &TasksSection) -> Result<TaskSettings> {
    if section.dirs.is_empty() {
        return Err(TaskshipError::Config(
            "[tasks].dirs must list at least one task directory".to_string(),
        ));
    }

    if !section.remote_dir.starts_with('/') {
        return Err(TaskshipError::Config(format!(
            "[tasks].remote_dir must be an absolute path (got {:?})",
            section.remote_dir
        )));
    }

    if section.remote_dir.chars().any(char::is_whitespace) {
        return Err(TaskshipError::Config(format!(
            "[tasks].remote_dir must not contain whitespace (got {:?})",
            section.remote_dir
        )));
    }

    if section.timeout_secs == 0 {
        return Err(TaskshipError::Config(
            "[tasks].timeout_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    if section.poll_interval_ms == 0 {
        return Err(TaskshipError::Config(
            "[tasks].poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    if section.workers == 0 {
        return Err(TaskshipError::Config(
            "[tasks].workers must be >= 1 (got 0)".to_string(),
        ));
    }

    let cache_dir = match &section.cache_dir {
        Some(dir) => expand_home(dir),
        None => default_cache_dir(),
    };

    Ok(TaskSettings {
        dirs: section.dirs.iter().map(|d| expand_home(d)).collect(),
        remote_dir: section.remote_dir.clone(),
        cache_dir,
        timeout: Duration::from_secs(section.timeout_secs),
        poll_interval: Duration::from_millis(section.poll_interval_ms),
        workers: section.workers,
    })
}

fn validate_ssh_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.ssh.args.iter().any(|a| a.starts_with("-i")) {
        return Err(TaskshipError::Config(
            "[ssh].args must not contain -i; set [ssh].private_key instead".to_string(),
        ));
    }
    if matches!(&cfg.ssh.host, Some(h) if h.trim().is_empty()) {
        return Err(TaskshipError::Config("[ssh].host must not be empty".to_string()));
    }
    Ok(())
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| expand_home("~/.cache"))
        .join("taskship")
        .join("task-files")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(text)?;
        ConfigFile::try_from(raw)
    }

    #[test]
    fn empty_file_gets_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.tasks.remote_dir, "/tmp/tasks");
        assert_eq!(cfg.tasks.timeout, Duration::from_secs(600));
        assert_eq!(cfg.tasks.poll_interval, Duration::from_secs(1));
        assert_eq!(cfg.tasks.workers, 4);
        assert_eq!(cfg.tasks.dirs.len(), 2);
        assert!(cfg.tasks.cache_dir.ends_with("taskship/task-files"));
        assert!(cfg.profile.tasks.is_empty());
        assert!(cfg.ssh.host.is_none());
    }

    #[test]
    fn sections_are_read() {
        let cfg = parse(
            r#"
            [tasks]
            dirs = ["/srv/tasks"]
            remote_dir = "/var/tmp/ts"
            cache_dir = "/var/cache/ts"
            timeout_secs = 30
            poll_interval_ms = 200
            workers = 2

            [profile]
            tasks = ["ocid"]
            install = ["git"]

            [ssh]
            host = "10.0.0.5"
            user = "opc"
            port = 2222
            args = ["-oProxyJump=bastion"]
            "#,
        )
        .unwrap();

        assert_eq!(cfg.tasks.dirs, vec![PathBuf::from("/srv/tasks")]);
        assert_eq!(cfg.tasks.cache_dir, PathBuf::from("/var/cache/ts"));
        assert_eq!(cfg.tasks.poll_interval, Duration::from_millis(200));
        assert_eq!(cfg.profile.tasks, vec!["ocid"]);
        assert_eq!(cfg.ssh.port, Some(2222));
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for text in [
            "[tasks]\ndirs = []",
            "[tasks]\nremote_dir = \"tmp/tasks\"",
            "[tasks]\ntimeout_secs = 0",
            "[tasks]\npoll_interval_ms = 0",
            "[tasks]\nworkers = 0",
            "[ssh]\nargs = [\"-i\", \"key\"]",
        ] {
            assert!(
                matches!(parse(text), Err(TaskshipError::Config(_))),
                "expected config error for {text:?}"
            );
        }
    }

    #[test]
    fn bad_toml_is_a_toml_error() {
        assert!(matches!(parse("[tasks"), Err(TaskshipError::Toml(_))));
    }
}
