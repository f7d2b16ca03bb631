// Tracing setup with a log level that can be changed while running.
use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

static FILTER_HANDLE: OnceLock<FilterHandle> = OnceLock::new();

pub fn init_tracing() {
    init_tracing_with_level("info");
}

/// Install the global subscriber. `RUST_LOG`, when set and valid, wins over
/// `level`.
pub fn init_tracing_with_level(level: &str) {
    let filter = std::env::var_os("RUST_LOG")
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let (filter_layer, handle) = reload::Layer::new(filter);
    let installed = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer())
        .try_init();

    match installed {
        Ok(()) => {
            if FILTER_HANDLE.set(handle).is_err() {
                tracing::debug!("log filter handle already registered");
            }
        }
        // Another subscriber (tests, an embedding binary) owns the output.
        Err(e) => tracing::debug!(error = %e, "tracing subscriber already installed"),
    }
}

/// Apply a new logging level at runtime. `RUST_LOG`, when set, keeps precedence.
pub fn apply_logging_level(level: &str) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    let Some(handle) = FILTER_HANDLE.get() else {
        tracing::debug!(level, "no reloadable log filter installed");
        return;
    };
    if let Err(e) = handle.modify(|filter| *filter = EnvFilter::new(level)) {
        tracing::debug!(error = %e, level, "failed to reload log filter");
    }
}
