//! # Uplink - World Server Entry Point
//!
//! Command-line front end for the world server. This crate parses
//! arguments, loads and validates the TOML configuration, installs logging
//! and signal handling, and runs the server until it is told to stop.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! uplink
//!
//! # Specify custom configuration
//! uplink --config production.toml
//!
//! # Override specific settings
//! uplink --bind 0.0.0.0:2001 --zones-file zones.toml --log-level debug
//!
//! # JSON logging for production
//! uplink --json-logs
//! ```
//!
//! ## Configuration
//!
//! The server loads configuration from a TOML file (default: `uplink.toml`).
//! If the file doesn't exist, a default configuration will be created.
//!
//! ## Signal Handling
//!
//! The server handles graceful shutdown on:
//! - SIGINT (Ctrl+C)
//! - SIGTERM (Unix systems)
//!
//! A second signal during shutdown exits immediately.

use tracing::error;

mod app;
mod cli;
mod config;
mod logging;
mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Main entry point for the uplink server.
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Logging settings come from the file before overrides are merged.
    let mut config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    if let Err(e) = logging::setup_logging(&config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

pub use config::{LoggingSettings, MonitoringSettings, ServerSettings, ZoneSettings};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_survives_toml() {
        let config = AppConfig::default();
        let rendered = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);

        let server_config = parsed.to_server_config().unwrap();
        assert_eq!(server_config.default_zone, 1000);
        assert_eq!(server_config.bind_address.port(), 2001);
    }
}
