//! Main application logic and lifecycle management.
//!
//! [`Application`] loads and validates configuration, builds the world
//! server, runs it alongside the statistics monitor and the operator
//! console, and drives the shutdown sequence once a signal arrives.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{setup_signal_handlers, wait_for_signal},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use world_server::{ShutdownState, StatsSnapshot, WorldServer};

/// How long the server task gets to save characters and tear zones down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(8);

/// Main application struct.
///
/// Owns the merged configuration and the world server for the lifetime of
/// the process.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// World server instance
    server: Arc<WorldServer>,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// # Arguments
    ///
    /// * `args` - Parsed command-line arguments
    ///
    /// # Returns
    ///
    /// A configured `Application` instance ready to run, or an error if the
    /// configuration could not be loaded or is invalid.
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Build the world server and its handler registry
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;
        apply_overrides(&mut config, &args);

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner(&config);

        let server = WorldServer::new(config.to_server_config()?)?;
        info!(
            "📂 Config: {} | Zones: {:?} | Metadata: {}",
            args.config_path.display(),
            config.zones.ids,
            config.zones.metadata_file.as_deref().unwrap_or("none (empty zones)")
        );

        Ok(Self {
            config,
            server: Arc::new(server),
        })
    }

    /// Runs the server until a termination signal, then shuts down in
    /// phases.
    ///
    /// # Returns
    ///
    /// `Ok(())` after a graceful shutdown, or an error if signal handling
    /// could not be installed.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting uplink world server");
        self.log_configuration_summary();

        let shutdown = ShutdownState::new();

        let server_handle = {
            let server = self.server.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                match server.start_with_shutdown_state(shutdown).await {
                    Ok(()) => info!("✅ Server completed successfully"),
                    Err(e) => {
                        error!("❌ Server error: {}", e);
                        std::process::exit(1);
                    }
                }
            })
        };

        let monitoring_handle = match self.config.monitoring.stats_interval_secs {
            0 => None,
            secs => Some(self.spawn_monitoring(Duration::from_secs(secs))),
        };
        let console_handle = self
            .config
            .monitoring
            .console
            .then(|| spawn_console(self.server.clone(), shutdown.clone()));

        info!("✅ Uplink is now running!");
        info!("🎮 Listening for clients on {}", self.config.server.bind_address);
        if console_handle.is_some() {
            info!("🖥️ Console ready - type 'help' for commands");
        }
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        setup_signal_handlers(&shutdown).await?;

        // A second signal skips the graceful path.
        tokio::spawn(async move {
            if let Err(e) = wait_for_signal().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }
            warn!("Shutdown signal received again! Exiting immediately.");
            std::process::exit(1);
        });

        info!("📡 Phase 1: Stopping monitoring and console...");
        if let Some(handle) = monitoring_handle {
            handle.abort();
        }
        if let Some(handle) = console_handle {
            handle.abort();
        }

        info!("💾 Phase 2: Disconnecting sessions and saving characters...");
        match tokio::time::timeout(SHUTDOWN_GRACE, server_handle).await {
            Ok(Ok(())) => info!("✅ Server task completed gracefully"),
            Ok(Err(e)) => error!("❌ Server task failed: {}", e),
            Err(_) => warn!(
                "⏰ Server task did not finish within {:?}, proceeding with exit",
                SHUTDOWN_GRACE
            ),
        }

        log_final_statistics(&self.server.context().stats.snapshot());
        info!("✅ Uplink shutdown complete");
        Ok(())
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        let server = &self.config.server;
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", server.bind_address);
        info!(
            "  🗺️ Zones: {:?} (default {})",
            self.config.zones.ids, self.config.zones.default_zone
        );
        info!("  👥 Max connections: {}", server.max_connections);
        info!("  ⏱️ Connection timeout: {}s", server.connection_timeout);
        info!("  🕒 Tick interval: {}ms", server.tick_interval_ms);
        info!("  📦 Max frame size: {} bytes", server.max_frame_size);
    }

    fn spawn_monitoring(&self, period: Duration) -> JoinHandle<()> {
        let server = self.server.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            let mut last = server.context().stats.snapshot();

            loop {
                interval.tick().await;
                let ctx = server.context();
                let stats = ctx.stats.snapshot();
                let received = stats.received - last.received;
                info!(
                    "📊 System Health - {} frames | {} handled | {} dropped | {} faults | {} sessions | {} live zones",
                    received,
                    stats.handled - last.handled,
                    stats.dropped() - last.dropped(),
                    stats.faults - last.faults,
                    ctx.sessions.len(),
                    ctx.zones.len()
                );
                if stats.faults > last.faults {
                    warn!("💥 {} handler fault(s) this period", stats.faults - last.faults);
                }
                match serde_json::to_string(&stats) {
                    Ok(json) => debug!("📊 Dispatch stats: {}", json),
                    Err(e) => debug!("📊 Could not render dispatch stats: {}", e),
                }
                last = stats;
            }
        })
    }
}

/// Applies command-line overrides on top of the file configuration.
fn apply_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(bind_address) = &args.bind_address {
        config.server.bind_address = bind_address.clone();
    }
    if let Some(zones_file) = &args.zones_file {
        config.zones.metadata_file = Some(zones_file.to_string_lossy().to_string());
    }
    if let Some(log_level) = &args.log_level {
        config.logging.level = log_level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
}

/// Runs stdin lines as console commands until shutdown.
fn spawn_console(server: Arc<WorldServer>, shutdown: ShutdownState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                _ = shutdown.initiated() => break,
                line = lines.next_line() => line,
            };
            match line {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    for output in server.execute_console(&line).lines() {
                        info!("🖥️ {}", output);
                    }
                }
                Ok(None) => {
                    debug!("Console input closed");
                    break;
                }
                Err(e) => {
                    warn!("🖥️ Console read failed: {}", e);
                    break;
                }
            }
        }
    })
}

/// Logs final statistics during shutdown.
fn log_final_statistics(stats: &StatsSnapshot) {
    info!("📊 Final Statistics:");
    info!("  - Uptime: {}s", stats.uptime_seconds);
    info!("  - Frames received: {}", stats.received);
    info!("  - Frames handled: {}", stats.handled);
    info!(
        "  - Frames dropped: {} (protocol {}, routing {}, other {})",
        stats.dropped(),
        stats.dropped_protocol,
        stats.dropped_routing,
        stats.dropped_other
    );
    info!("  - Handler faults: {}", stats.faults);
    if let Ok(json) = serde_json::to_string_pretty(stats) {
        debug!("📊 Final dispatch stats:\n{}", json);
    }
}
