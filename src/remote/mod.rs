// src/remote/mod.rs

//! Everything that touches the host.
//!
//! - [`transport`]: the capability the host must offer (copy, run, read),
//!   with [`ssh`] and [`local`] implementations.
//! - [`state`]: the per-task directory layout and the client-side state
//!   machine over its files.
//! - [`script`]: the runtime library and the launch stub.
//! - [`launcher`]: pushes a resolved graph to the host and starts it.

pub mod launcher;
pub mod local;
pub mod script;
pub mod ssh;
pub mod state;
pub mod transport;

pub use launcher::{LaunchOptions, LaunchOutcome, LaunchReport, Launcher};
pub use local::LocalTransport;
pub use ssh::SshTransport;
pub use state::{RemoteLayout, RemoteTaskState};
pub use transport::{BoxFuture, ScriptOutput, Transport};
