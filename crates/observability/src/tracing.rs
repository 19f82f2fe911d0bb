//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Default directives when `RUST_LOG` is unset: ledger and catalog at
/// debug so every guarded append and audited mutation is visible, sqlx
/// down to warnings.
const DEFAULT_DIRECTIVES: &str = "info,bodega_ledger=debug,bodega_catalog=debug,sqlx=warn";

/// Install the process-wide subscriber: JSON lines with timestamps,
/// filter overridable via `RUST_LOG`.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    init_with(DEFAULT_DIRECTIVES);
}

/// Like [`init`], with explicit fallback directives. Benchmarks use this
/// to keep the subscriber quiet unless `RUST_LOG` says otherwise.
pub fn init_with(directives: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
