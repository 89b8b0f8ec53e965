pub mod builders;
pub mod fake_transport;

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Filter used when `RUST_LOG` is unset: launcher and status transitions
/// from `taskship` are shown for failing tests, everything else only when
/// it warns.
pub const DEFAULT_TEST_FILTER: &str = "warn,taskship=debug";

/// Initialise tracing for tests.
///
/// Logs go through `with_test_writer()`, so only failing tests print them
/// (unless run with `-- --nocapture`). Override with e.g.
/// `RUST_LOG=taskship::remote=trace`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_TEST_FILTER));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 20-second timeout.
///
/// End-to-end tests start real `bash` processes that poll the host's state
/// files, and a timed-out task gets a SIGKILL grace period on top of its
/// limit, so this is more generous than an in-memory test needs.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(20), f)
        .await
        .expect("Test timed out after 20 seconds")
}
