//! Log subscriber setup.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Default directive when `RUST_LOG` is unset or invalid.
const DEFAULT_FILTER: &str = "info";

/// Install a formatting subscriber filtered by `RUST_LOG`.
///
/// Returns false if a global subscriber was already set; calling this more
/// than once is harmless.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).is_ok()
}
