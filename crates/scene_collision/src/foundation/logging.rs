//! Logger setup for binaries and tests
//!
//! The library itself only emits through the `log` facade: scene builds at
//! info, skipped instances and octree rebuilds at debug, per-collider and
//! per-actor detail at trace.

use log::LevelFilter;

/// Initialize env_logger, `RUST_LOG` overriding `default_level`
pub fn init(default_level: LevelFilter) {
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .init();
}

/// Initialize logging for tests, ignoring repeated initialization
pub fn init_for_tests() {
    let _ = env_logger::builder().is_test(true).try_init();
}
