use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Default filter used when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "evalnet=info";

/// Installs a global fmt subscriber filtered by `RUST_LOG`.
///
/// Safe to call more than once; only the first call has an effect, and a
/// subscriber installed by the host beforehand is left in place.
pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}

/// Installs a test-writer subscriber so log output is captured per test.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("evalnet=trace"))
        .with_test_writer()
        .try_init();
}
