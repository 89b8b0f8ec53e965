// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Resolution-phase variants (`Parse`, `TaskNotFound`, `MissingDependency`,
//! `TaskConflict`, `DependencyCycle`) are always raised before any remote
//! action. Launch-phase variants (`Bundle`, `Transport`) are reported per
//! task.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskshipError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task {task}, line {line}: {message}")]
    Parse {
        task: String,
        line: usize,
        message: String,
    },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("task '{task}' depends on '{dependency}', which could not be found")]
    MissingDependency { task: String, dependency: String },

    #[error("task '{task}' conflicts with '{other}'")]
    TaskConflict { task: String, other: String },

    #[error("Tasks express a circular dependency: {0}")]
    DependencyCycle(String),

    #[error("task '{task}': {message}")]
    Bundle { task: String, message: String },

    #[error("transport error for task '{task}': {message}")]
    Transport { task: String, message: String },

    #[error("task '{task}' failed with status {code}")]
    RemoteTaskFailure { task: String, code: i32 },

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TaskshipError {
    /// True for errors raised while resolving the task set, i.e. before any
    /// file was bundled or copied.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            TaskshipError::Parse { .. }
                | TaskshipError::TaskNotFound(_)
                | TaskshipError::MissingDependency { .. }
                | TaskshipError::TaskConflict { .. }
                | TaskshipError::DependencyCycle(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskshipError>;
