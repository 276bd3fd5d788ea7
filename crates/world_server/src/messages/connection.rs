//! Connection-level packets exchanged before and around gameplay.

use replica_codec::frame::Direction;
use replica_codec::{schema, Compressed, ObjectId, Quaternion, Vector3};

use super::{Message, MessageKind};

/// Protocol version this server speaks.
pub const PROTOCOL_VERSION: u32 = 171_022;

/// Service id the server announces in its handshake reply.
pub const WORLD_SERVICE: u32 = 4;

schema! {
    /// Version exchange; the server echoes it back with its own values.
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct Handshake {
        pub version: u32,
        pub reserved: u32 = 0,
        pub service: u32,
        pub process_id: u32,
        pub port: u16,
    }
}

impl Message for Handshake {
    const ROUTE: MessageKind = MessageKind::Packet {
        direction: Direction::General,
        packet_id: 0,
    };
}

schema! {
    /// Sent by the client once the zone has finished loading; the server
    /// then creates the player object and starts replicating to the client.
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct ClientLoadComplete {
        pub zone_id: u16,
        pub instance: u16,
        pub clone_id: Compressed<u32> = Compressed(0),
        pub character_id: ObjectId,
    }
}

impl Message for ClientLoadComplete {
    const ROUTE: MessageKind = MessageKind::Packet {
        direction: Direction::Server,
        packet_id: 19,
    };
}

schema! {
    /// Periodic movement report for the client's own player.
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct PositionUpdate {
        pub position: Vector3,
        pub rotation: Quaternion,
        pub on_ground: bool,
        pub velocity: Option<Vector3>,
        pub angular_velocity: Option<Vector3>,
    }
}

impl Message for PositionUpdate {
    const ROUTE: MessageKind = MessageKind::Packet {
        direction: Direction::Server,
        packet_id: 22,
    };
}

schema! {
    /// Tells a client the server is dropping it.
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct DisconnectNotify {
        pub reason: u32,
    }
}

impl Message for DisconnectNotify {
    const ROUTE: MessageKind = MessageKind::Packet {
        direction: Direction::General,
        packet_id: 1,
    };
}

/// Reason codes carried by [`DisconnectNotify`].
pub mod disconnect_reason {
    pub const UNKNOWN: u32 = 0;
    pub const KICKED: u32 = 7;
    pub const TIMED_OUT: u32 = 9;
    pub const SERVER_SHUTDOWN: u32 = 10;
}
