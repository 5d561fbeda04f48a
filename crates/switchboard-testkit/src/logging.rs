//! Test log output

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber writing through the test harness.
///
/// Honors `RUST_LOG`, defaulting to `debug` for the switchboard crates.
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("switchboard_hub=debug,switchboard_endpoint=debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .with_target(false)
        .try_init();
}
