#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use taskship::remote::{LaunchOptions, Launcher, RemoteLayout, Transport};

pub use taskship_test_utils::builders::TaskDirBuilder;
pub use taskship_test_utils::fake_transport::FakeTransport;
pub use taskship_test_utils::{init_tracing, with_timeout};

/// Poll interval short enough to keep end-to-end tests fast.
pub const FAST_POLL: Duration = Duration::from_millis(50);

pub fn launcher(transport: Arc<dyn Transport>, remote_dir: &str) -> Launcher {
    Launcher::new(
        transport,
        RemoteLayout::new(remote_dir),
        LaunchOptions {
            timeout: Duration::from_secs(30),
            kill_after: Duration::from_secs(1),
            poll_interval: FAST_POLL,
            workers: 2,
        },
    )
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
