//! Verbosity-driven logging to stderr.
//!
//! Stdout belongs to the remote-helper protocol, so every user-facing
//! message goes through tracing to stderr. Git delivers `option verbosity N`
//! after startup, hence the reloadable filter.

use std::io;
use std::sync::OnceLock;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, registry::Registry, reload};

static VERBOSITY: OnceLock<reload::Handle<LevelFilter, Registry>> = OnceLock::new();

/// Install the stderr logger. Starts at INFO until git tells us otherwise.
pub fn init() {
    let (filter, handle) = reload::Layer::new(LevelFilter::INFO);
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .without_time(),
        )
        .init();
    let _ = VERBOSITY.set(handle);
}

/// Map the remote-helper verbosity level onto tracing levels.
/// 0 is errors only, 1 the default, 2 and up debug output.
pub fn set_verbosity(level: u64) {
    let filter = match level {
        0 => LevelFilter::ERROR,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    if let Some(handle) = VERBOSITY.get() {
        let _ = handle.reload(filter);
    }
}
