//! Logging setup for the `lens` binary
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the host. The CLI installs one here, always writing to stderr so stdout
//! carries nothing but result JSON.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Registry,
};

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable, multi-line
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Initialize the global subscriber.
///
/// `RUST_LOG` takes precedence over `log_level` when set.
pub fn init_tracing(log_level: &str, format: LogFormat) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("session_lens={0},lens={0}", log_level)));

    match format {
        LogFormat::Json => {
            let formatting_layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_span_events(FmtSpan::CLOSE)
                .with_current_span(true);

            Registry::default()
                .with(env_filter)
                .with(formatting_layer)
                .try_init()?;
        }
        LogFormat::Pretty => {
            let formatting_layer = fmt::layer()
                .pretty()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(false)
                .with_line_number(false);

            Registry::default()
                .with(env_filter)
                .with(formatting_layer)
                .try_init()?;
        }
    }

    tracing::debug!(log_level, ?format, "Logging initialized");
    Ok(())
}
