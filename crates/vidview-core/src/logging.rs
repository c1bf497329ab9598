//! Logging setup shared by the bridge and the demo.
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to the embedding process (or to `vv_init_logging` over the C ABI).

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Prefix carried by every log line the bridge emits.
pub const PREFIX: &str = "[vidview]";

static INIT: Once = Once::new();

/// Initialize tracing with the default `info` filter.
///
/// The level can be controlled via `RUST_LOG`, e.g. `RUST_LOG=vidview_core=debug`.
pub fn init() {
    init_with_filter("info");
}

/// Initialize tracing with a custom default filter.
///
/// Safe to call more than once; only the first call installs a subscriber, and a
/// subscriber installed by the host process is left untouched.
pub fn init_with_filter(default_filter: &str) {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init()
            .is_ok();

        if installed {
            tracing::debug!("{} logging initialized", PREFIX);
        }
    });
}
