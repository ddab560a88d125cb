/// Shared test helpers for the workspace crates.
use std::sync::Once;

use crate::config::Config;

static TRACING: Once = Once::new();

/// Installs a test-friendly tracing subscriber once per test binary.
///
/// Honours `RUST_LOG`; output goes through the test writer so it is only
/// shown for failing tests.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Default configuration with a label threshold small enough for fixtures.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.scoring.min_training_labels = 10;
    config.processor.sleep_ms = 5;
    config
}
