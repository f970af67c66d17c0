//! Logging setup for hosts embedding the core.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a global `fmt` subscriber filtered by `filter` (e.g. `"info"`,
/// `"clinic_queue_core=debug"`).
///
/// Returns `false` if a global subscriber was already installed; the existing
/// one is kept.
pub fn init_logging(filter: &str) -> bool {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).try_init().is_ok()
}
