//! Configuration management for the uplink world server.
//!
//! This module handles loading, validation, and conversion of server
//! configuration from TOML files and command-line arguments.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;
use world_server::ServerConfig;

/// Smallest datagram limit that still fits a game message header.
const MIN_FRAME_SIZE: usize = 64;

/// Longest replication tick interval accepted, in milliseconds.
const MAX_TICK_INTERVAL_MS: u64 = 10_000;

fn default_max_connections() -> usize {
    1000
}

pub fn default_connection_timeout() -> u64 {
    60
}

fn default_tick_interval() -> u64 {
    50 // 20 ticks per second
}

fn default_max_frame_size() -> usize {
    8 * 1024
}

fn default_stats_interval() -> u64 {
    60
}

fn default_console() -> bool {
    true
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Network and session settings
    pub server: ServerSettings,
    /// Which zones this process hosts
    pub zones: ZoneSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
    /// Statistics and operator console
    #[serde(default)]
    pub monitoring: MonitoringSettings,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// UDP address to bind the server to (e.g., "127.0.0.1:2001")
    pub bind_address: String,
    /// Maximum number of concurrent sessions
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Idle time in seconds before a session is dropped (0 to disable)
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
    /// Replication tick interval in milliseconds (0 to disable)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Datagrams larger than this are dropped unread
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    /// Privilege level given to new sessions
    #[serde(default)]
    pub default_privilege: u8,
}

/// Zone hosting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneSettings {
    /// Zone ids this server may instantiate
    pub ids: Vec<u16>,
    /// Zone a session belongs to before its client reports a load
    pub default_zone: u16,
    /// TOML file with each zone's spawn list; zones start empty when unset
    #[serde(default)]
    pub metadata_file: Option<String>,
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

/// Runtime monitoring configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSettings {
    /// Seconds between dispatch statistics reports (0 to disable)
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
    /// Whether lines typed on stdin run as console commands
    #[serde(default = "default_console")]
    pub console: bool,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            stats_interval_secs: default_stats_interval(),
            console: default_console(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind_address: "127.0.0.1:2001".to_string(),
                max_connections: default_max_connections(),
                connection_timeout: default_connection_timeout(),
                tick_interval_ms: default_tick_interval(),
                max_frame_size: default_max_frame_size(),
                default_privilege: 0,
            },
            zones: ZoneSettings {
                ids: vec![1000],
                default_zone: 1000,
                metadata_file: None,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
            monitoring: MonitoringSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the
    /// specified path and returns the default configuration.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// The loaded or default configuration, or an error if loading/creation failed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts the application configuration to the world server's
    /// configuration.
    ///
    /// # Returns
    ///
    /// A `ServerConfig` ready for `WorldServer::new`, or an error if the bind
    /// address does not parse.
    pub fn to_server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        Ok(ServerConfig {
            bind_address: self.server.bind_address.parse()?,
            zone_ids: self.zones.ids.clone(),
            default_zone: self.zones.default_zone,
            zones_file: self.zones.metadata_file.as_ref().map(PathBuf::from),
            max_connections: self.server.max_connections,
            connection_timeout: self.server.connection_timeout,
            tick_interval_ms: self.server.tick_interval_ms,
            max_frame_size: self.server.max_frame_size,
            default_privilege: self.server.default_privilege,
        })
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<SocketAddr>().is_err() {
            return Err(format!("Invalid bind address: {}", &self.server.bind_address));
        }

        if self.server.max_connections == 0 {
            return Err("server.max_connections must be greater than 0".to_string());
        }

        if self.server.tick_interval_ms > MAX_TICK_INTERVAL_MS {
            return Err(format!(
                "server.tick_interval_ms must be at most {MAX_TICK_INTERVAL_MS} (0 disables the tick)"
            ));
        }

        if self.server.max_frame_size < MIN_FRAME_SIZE {
            return Err(format!(
                "server.max_frame_size must be at least {MIN_FRAME_SIZE} bytes"
            ));
        }

        if self.zones.ids.is_empty() {
            return Err("zones.ids must list at least one zone".to_string());
        }

        let mut seen = HashSet::new();
        if let Some(duplicate) = self.zones.ids.iter().find(|id| !seen.insert(**id)) {
            return Err(format!("zones.ids lists zone {duplicate} more than once"));
        }

        if !self.zones.ids.contains(&self.zones.default_zone) {
            return Err(format!(
                "zones.default_zone {} is not in zones.ids {:?}",
                self.zones.default_zone, self.zones.ids
            ));
        }

        if let Some(file) = &self.zones.metadata_file {
            if file.trim().is_empty() {
                return Err("zones.metadata_file cannot be empty when set".to_string());
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
