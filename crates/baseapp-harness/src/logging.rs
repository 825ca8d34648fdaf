#![forbid(unsafe_code)]

//! Tracing subscriber for tests.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "baseapp_paging=debug,baseapp_feed=debug,baseapp_harness=info";

/// Install a test-writer subscriber once per process. Later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
