//! Logging setup for the `mnemo` binary
//!
//! All engine logs go through `tracing`. The binary installs one subscriber
//! at startup; library users are free to install their own instead.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// `log_level` applies to the engine's own targets; dependencies stay at
/// `warn`. A `RUST_LOG` value replaces the whole filter. Output goes to
/// stderr so that command output on stdout stays machine-readable: pretty
/// in debug builds, one JSON object per event in release builds.
///
/// Calling this twice is harmless; the second call is ignored.
pub fn init_telemetry_with_level(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,mnemo_engine={}", log_level)));

    let registry = tracing_subscriber::registry().with(filter);

    #[cfg(debug_assertions)]
    let installed = registry
        .with(
            fmt::layer()
                .pretty()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();

    #[cfg(not(debug_assertions))]
    let installed = registry
        .with(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(std::io::stderr),
        )
        .try_init();

    if installed.is_err() {
        tracing::debug!("Subscriber already installed, keeping it");
    }
}
