//! Fixed frame headers and classification of inbound datagrams.
//!
//! Every user packet starts with an 8-byte header:
//!
//! ```text
//! [0]     0x53 user packet marker
//! [1..3]  u16 connection direction
//! [3..7]  u32 packet id
//! [7]     padding
//! ```
//!
//! Game messages are user packets with a fixed packet id per direction and
//! continue with an i64 target object id and a u16 message id, so their
//! property payload starts at byte 18. Frames starting with any other byte
//! are transport-level control frames (e.g. disconnection notifications).

use std::fmt;

use crate::bits::{BitReader, BitWriter};
use crate::error::{CodecError, Result};
use crate::types::ObjectId;

pub const USER_PACKET: u8 = 0x53;
pub const DISCONNECTION_NOTIFICATION: u8 = 0x13;
pub const REPLICA_CONSTRUCTION: u8 = 0x24;
pub const REPLICA_DESTRUCTION: u8 = 0x25;
pub const REPLICA_SERIALIZE: u8 = 0x27;

pub const HEADER_LEN: usize = 8;
pub const GAME_MESSAGE_PAYLOAD_OFFSET: usize = 18;

/// Packet id of a game message sent by a client.
pub const CLIENT_GAME_MESSAGE: u32 = 5;
/// Packet id of a game message sent by the server.
pub const SERVER_GAME_MESSAGE: u32 = 12;

/// Connection direction carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum Direction {
    General = 0,
    Auth = 1,
    Chat = 2,
    /// Client to world server
    Server = 4,
    /// World server to client
    Client = 5,
}

impl TryFrom<u16> for Direction {
    type Error = CodecError;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Direction::General),
            1 => Ok(Direction::Auth),
            2 => Ok(Direction::Chat),
            4 => Ok(Direction::Server),
            5 => Ok(Direction::Client),
            other => Err(CodecError::InvalidHeader(format!("unknown direction {other}"))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The 8-byte header of a user packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub direction: Direction,
    pub packet_id: u32,
}

impl PacketHeader {
    pub fn new(direction: Direction, packet_id: u32) -> Self {
        Self { direction, packet_id }
    }

    pub fn write(&self, writer: &mut BitWriter) {
        writer.write_u8(USER_PACKET);
        writer.write_u16(self.direction as u16);
        writer.write_u32(self.packet_id);
        writer.write_u8(0);
    }

    pub fn read(reader: &mut BitReader<'_>) -> Result<Self> {
        let marker = reader.read_u8()?;
        if marker != USER_PACKET {
            return Err(CodecError::InvalidHeader(format!(
                "expected user packet marker, found {marker:#04x}"
            )));
        }
        let direction = Direction::try_from(reader.read_u16()?)?;
        let packet_id = reader.read_u32()?;
        reader.read_u8()?;
        Ok(Self { direction, packet_id })
    }

    /// True for the packet id that carries client game messages.
    pub fn is_game_message(&self) -> bool {
        self.direction == Direction::Server && self.packet_id == CLIENT_GAME_MESSAGE
    }
}

/// Object id and message id following a game message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameMessageHeader {
    pub object_id: ObjectId,
    pub message_id: u16,
}

/// What an inbound datagram turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// Connection-level packet, body starts at [`HEADER_LEN`]
    Packet(PacketHeader),
    /// Object-addressed game message, body starts at
    /// [`GAME_MESSAGE_PAYLOAD_OFFSET`]
    GameMessage(GameMessageHeader),
    /// Transport control frame identified by its first byte
    Control(u8),
}

impl Frame {
    /// Classifies a datagram from its fixed header.
    pub fn classify(bytes: &[u8]) -> Result<Self> {
        let first = *bytes
            .first()
            .ok_or_else(|| CodecError::InvalidHeader("empty frame".to_string()))?;
        if first != USER_PACKET {
            return Ok(Frame::Control(first));
        }

        let mut reader = BitReader::new(bytes);
        let header = PacketHeader::read(&mut reader)?;
        if !header.is_game_message() {
            return Ok(Frame::Packet(header));
        }

        let object_id = ObjectId(reader.read_i64()?);
        let message_id = reader.read_u16()?;
        Ok(Frame::GameMessage(GameMessageHeader { object_id, message_id }))
    }

    /// Byte offset at which the body of this frame begins.
    pub fn payload_offset(&self) -> usize {
        match self {
            Frame::Packet(_) => HEADER_LEN,
            Frame::GameMessage(_) => GAME_MESSAGE_PAYLOAD_OFFSET,
            Frame::Control(_) => 1,
        }
    }
}

/// Starts an outbound user packet.
pub fn packet(direction: Direction, packet_id: u32) -> BitWriter {
    let mut writer = BitWriter::with_capacity(64);
    PacketHeader::new(direction, packet_id).write(&mut writer);
    writer
}

/// Starts an outbound game message addressed to `object_id`.
pub fn server_game_message(object_id: ObjectId, message_id: u16) -> BitWriter {
    let mut writer = packet(Direction::Client, SERVER_GAME_MESSAGE);
    writer.write_i64(object_id.0);
    writer.write_u16(message_id);
    writer
}

/// Starts a client game message; used by tools and tests that act as a client.
pub fn client_game_message(object_id: ObjectId, message_id: u16) -> BitWriter {
    let mut writer = packet(Direction::Server, CLIENT_GAME_MESSAGE);
    writer.write_i64(object_id.0);
    writer.write_u16(message_id);
    writer
}

/// Starts a replica frame (construction, serialize or destruction).
pub fn replica(kind: u8, network_id: u16) -> BitWriter {
    let mut writer = BitWriter::with_capacity(64);
    writer.write_u8(kind);
    if kind == REPLICA_CONSTRUCTION {
        // Construction carries an "object is new" flag ahead of the id.
        writer.write_bit(true);
    }
    writer.write_u16(network_id);
    writer
}
