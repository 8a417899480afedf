//! Tracing setup for embedding programs.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Installs a plain fmt subscriber filtered by `STAGEFS_LOG`, falling back
/// to `info`.
///
/// Embedders that bring their own subscriber just skip this; `try_init`
/// keeps a second call (or a test harness race) from panicking.
pub fn init() -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_env("STAGEFS_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}
