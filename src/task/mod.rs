// src/task/mod.rs

//! Task sources and their descriptors.
//!
//! - [`macros`] parses a script's macro lines into a [`TaskDescriptor`].
//! - [`descriptor`] defines the descriptor itself.
//! - [`loader`] finds scripts across the task directories and caches the
//!   parsed descriptors for the duration of one invocation.

pub mod descriptor;
pub mod loader;
pub mod macros;

pub use descriptor::{IncludeFile, TaskDescriptor};
pub use loader::TaskLoader;
pub use macros::{resolve_script, TaskLookup};
