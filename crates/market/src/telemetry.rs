//! Tracing subscriber setup for binaries built on this library.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing with `EnvFilter` and a formatting layer.
///
/// Defaults to info level for this crate if `RUST_LOG` is not set. Call once
/// from the process entry point; calling twice panics in the subscriber, so
/// the library itself never calls this.
pub fn init() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "bazaar_market=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
