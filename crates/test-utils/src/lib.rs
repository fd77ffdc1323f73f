pub mod builders;
pub mod fakes;

use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Install a test subscriber once per test binary.
///
/// Output goes through `with_test_writer()`, so engine logs only show up
/// for failing tests. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Await `f`, failing the test if it takes longer than five seconds.
/// Guards tests that wait on other builds or blocking workers.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}
