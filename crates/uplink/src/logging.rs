//! Logging setup for the uplink binary.
//!
//! `RUST_LOG` wins when set. Otherwise the configured level applies to the
//! server and the codec is held at `warn` unless the level asks for debug
//! output, since the codec traces every field of every frame.

use crate::config::{AppConfig, LoggingSettings};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directives for a configured level.
fn filter_directives(level: &str) -> String {
    match level {
        "trace" | "debug" => level.to_string(),
        _ => format!("{level},replica_codec=warn"),
    }
}

/// Installs the global subscriber.
///
/// JSON output flattens event fields into the top-level object so dropped
/// frame and fault lines can be filtered on `target` directly.
pub fn setup_logging(
    config: &LoggingSettings,
    json_format: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(filter_directives(&config.level))?,
    };
    let registry = tracing_subscriber::registry().with(filter);

    if json_format || config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_span_list(false)
                    .with_target(true),
            )
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(true).compact())
            .try_init()?;
    }

    info!("🔧 Logging initialized ({})", filter_directives(&config.level));
    Ok(())
}

/// Logs what this process is about to host.
pub fn display_banner(config: &AppConfig) {
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
    info!("🛰️ Uplink world server v{}", version);
    info!(
        "🗺️ Hosting zones {:?} on {} (default zone {})",
        config.zones.ids, config.server.bind_address, config.zones.default_zone
    );
}
