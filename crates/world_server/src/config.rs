//! Server configuration types and defaults.
//!
//! This module contains the server configuration structure and default values
//! used to initialize and customize the world server behavior.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Configuration structure for the world server.
///
/// Contains the network settings, the set of zones this server may host,
/// where zone metadata comes from, and the timing of the replication tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The UDP socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Zone ids this server is allowed to instantiate
    pub zone_ids: Vec<u16>,

    /// Zone assigned to a session before the client reports its load
    pub default_zone: u16,

    /// TOML file describing each zone's spawn list; every configured zone
    /// starts empty when unset
    pub zones_file: Option<PathBuf>,

    /// Maximum number of concurrent sessions allowed
    pub max_connections: usize,

    /// Idle time in seconds after which a session is disconnected
    pub connection_timeout: u64,

    /// Replication tick interval in milliseconds (0 to disable)
    pub tick_interval_ms: u64,

    /// Datagrams larger than this are dropped unread
    pub max_frame_size: usize,

    /// Privilege level given to new sessions
    pub default_privilege: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 2001)),
            zone_ids: vec![1000],
            default_zone: 1000,
            zones_file: None,
            max_connections: 1000,
            connection_timeout: 60,
            tick_interval_ms: 50, // 20 ticks per second by default
            max_frame_size: 8 * 1024,
            default_privilege: 0,
        }
    }
}
