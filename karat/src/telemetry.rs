//! Tracing subscriber setup.
//!
//! Log verbosity follows `RUST_LOG` (default `info`). The output format is chosen by the
//! `log_format` config field:
//!
//! ```yaml
//! log_format: json   # one JSON object per event, for log shippers
//! ```

use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LogFormat;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global tracing subscriber.
///
/// Fails if a subscriber has already been installed.
pub fn init_telemetry(format: LogFormat) -> anyhow::Result<()> {
    match format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(tracing_subscriber::fmt::layer())
                .try_init()?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
                .try_init()?;
        }
    }

    info!("Telemetry initialized ({:?} log format)", format);
    Ok(())
}
