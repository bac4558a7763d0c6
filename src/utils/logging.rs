//! Diagnostic output for the binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! `cli::main` so embedders keep control of their own output.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const QUIET_FILTER: &str = "warn";
const VERBOSE_FILTER: &str = "warn,parlance=debug";

/// The filter used when `RUST_LOG` is not set.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        VERBOSE_FILTER
    } else {
        QUIET_FILTER
    }
}

/// Install a stderr subscriber. `RUST_LOG` wins over `verbose`. Calling this
/// twice is harmless; the second call leaves the first subscriber in place.
pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true),
    );

    let _ = tracing::subscriber::set_global_default(subscriber);
}
