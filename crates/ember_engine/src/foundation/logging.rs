//! Logging utilities and structured logging support

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system.
///
/// Reads the filter from `RUST_LOG`, falling back to `info`. Calling this more
/// than once is harmless; later calls are ignored.
pub fn init() {
    init_with_level(log::LevelFilter::Info);
}

/// Initialize the logging system with an explicit default level.
///
/// `RUST_LOG` still takes precedence when it is set.
pub fn init_with_level(level: log::LevelFilter) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if let Ok(filter) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filter);
    }
    // A logger may already be installed (tests, embedding applications).
    let _ = builder.try_init();
}
