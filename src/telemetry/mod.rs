//! Tracing subscriber setup for the binary.

use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "geocache=info";

/// Installs the global fmt subscriber.
///
/// `RUST_LOG` takes precedence over [`DEFAULT_FILTER`].
///
/// # Errors
///
/// Fails if a global subscriber has already been installed.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
}
