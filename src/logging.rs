//! Logging initialization and configuration.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Level used when none is configured.
pub const DEFAULT_LEVEL: &str = "error";

/// Build the filter for a configured log level.
///
/// Plain level names (`trace`, `debug`, `info`, `warn`, `error`) are scoped
/// to this crate. Anything else is treated as a full `EnvFilter` directive,
/// so a `RUST_LOG`-style value passes through unchanged. Unparseable values
/// fall back to [`DEFAULT_LEVEL`].
pub fn filter_for(level: &str) -> EnvFilter {
    let level = level.trim().to_ascii_lowercase();
    let directive = match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => format!("lightsshd={level}"),
        "" => format!("lightsshd={DEFAULT_LEVEL}"),
        _ => level,
    };

    EnvFilter::try_new(&directive)
        .unwrap_or_else(|_| EnvFilter::new(format!("lightsshd={DEFAULT_LEVEL}")))
}

/// Initialize the logging system.
///
/// # Panics
///
/// Panics if called more than once, or if another tracing subscriber
/// has already been set.
pub fn init(level: &str) {
    tracing_subscriber::registry()
        .with(filter_for(level))
        .with(tracing_subscriber::fmt::layer().compact())
        .init();
}

/// Try to initialize the logging system.
///
/// Returns `Err` if logging has already been initialized.
pub fn try_init(level: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(filter_for(level))
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init()
}
