//! Process-wide tracing setup shared by every binary.

pub mod tracing;

pub use self::tracing::{LogFormat, LogSettings};

/// JSON logs filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    tracing::init(&LogSettings::default());
}

pub fn init_with(settings: &LogSettings) {
    tracing::init(settings);
}
