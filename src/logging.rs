//! Logging setup.

use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence; `fallback_filter` is used when it is unset or
/// invalid. Calling this more than once is harmless.
pub fn init_logging(fallback_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_filter));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
