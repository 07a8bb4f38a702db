//! Logging initialization
//!
//! The bridge logs through `tracing`; the embedder may install its own
//! subscriber before constructing a bridge, in which case this module
//! does nothing. Otherwise a plain fmt subscriber is installed once,
//! defaulting to DEBUG when the bridge was built with the debug flag
//! and WARN otherwise. `RUST_LOG` overrides the default filter.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install the global subscriber. Safe to call any number of times;
/// only the first call has an effect.
pub fn init(debug: bool) {
    INIT.call_once(|| {
        let default_filter = if debug { "debug" } else { "warn" };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter));
        // try_init: the embedder may already have a subscriber
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}
