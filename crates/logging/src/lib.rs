//! HopLink Logging
//!
//! Installs the global `tracing` subscriber. `RUST_LOG` wins over the
//! filter passed in; if neither parses, `info,hoplink=debug` is used.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when nothing else is configured
pub const DEFAULT_FILTER: &str = "info,hoplink=debug";

fn build_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Panics if one is already set.
pub fn init_logging(default_filter: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(build_filter(default_filter))
        .init();
}

/// Like [`init_logging`], but returns `false` instead of panicking when a
/// subscriber is already installed. Writes to stdout like [`init_logging`].
pub fn try_init_logging(default_filter: &str) -> bool {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(build_filter(default_filter))
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_filter_falls_back() {
        // Must not panic on an unparseable directive
        let _ = build_filter("hoplink=[[[");
    }

    #[test]
    fn test_try_init_twice() {
        let _first = try_init_logging("debug");
        assert!(!try_init_logging("debug"));
    }
}
