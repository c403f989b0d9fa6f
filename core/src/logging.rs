//! Logging setup for hosts that do not install their own subscriber.

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`, defaulting to `info`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init() -> bool {
    init_with_default("info")
}

/// Like [`init`] with a custom default filter, e.g. `"sheen_core=debug"`.
pub fn init_with_default(default_filter: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .try_init()
        .is_ok()
}
