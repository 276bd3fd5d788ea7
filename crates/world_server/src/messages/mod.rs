//! Typed messages and their routing keys.
//!
//! A message is any [`Schema`] type tagged with a [`MessageKind`]: either a
//! connection-level packet addressed by `(direction, packet id)`, or a game
//! message addressed by its message id and targeted at a game object. The
//! kind decides which routing table a handler lands in and where the
//! message's payload starts inside a frame.

pub mod connection;
pub mod gameplay;

use replica_codec::frame::{self, Direction, GAME_MESSAGE_PAYLOAD_OFFSET, HEADER_LEN};
use replica_codec::{codec, ObjectId, Schema};

/// Routing key category of a message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Raw packet keyed by direction and packet id
    Packet { direction: Direction, packet_id: u32 },
    /// Object-addressed game message keyed by message id
    Game { message_id: u16 },
}

impl MessageKind {
    /// Byte offset at which this kind's property payload begins.
    pub fn payload_offset(&self) -> usize {
        match self {
            MessageKind::Packet { .. } => HEADER_LEN,
            MessageKind::Game { .. } => GAME_MESSAGE_PAYLOAD_OFFSET,
        }
    }
}

/// A schema type that can be routed.
pub trait Message: Schema + Send + 'static {
    const ROUTE: MessageKind;
}

/// Encodes a packet message including its frame header.
///
/// Game message types are framed as server game messages addressed to
/// object id 0; use [`encode_game_message`] to target an object.
pub fn encode_packet<M: Message>(message: &M) -> Vec<u8> {
    let mut writer = match M::ROUTE {
        MessageKind::Packet { direction, packet_id } => frame::packet(direction, packet_id),
        MessageKind::Game { message_id } => frame::server_game_message(ObjectId(0), message_id),
    };
    codec::encode_into(message, &mut writer);
    writer.into_bytes()
}

/// Encodes a server-to-client game message addressed to `object_id`.
pub fn encode_game_message<M: Message>(object_id: ObjectId, message: &M) -> Vec<u8> {
    let message_id = match M::ROUTE {
        MessageKind::Game { message_id } => message_id,
        MessageKind::Packet { .. } => return encode_packet(message),
    };
    let mut writer = frame::server_game_message(object_id, message_id);
    codec::encode_into(message, &mut writer);
    writer.into_bytes()
}

/// Encodes a client-to-server game message; used by test clients and tools.
pub fn encode_client_game_message<M: Message>(object_id: ObjectId, message: &M) -> Vec<u8> {
    let message_id = match M::ROUTE {
        MessageKind::Game { message_id } => message_id,
        MessageKind::Packet { .. } => return encode_packet(message),
    };
    let mut writer = frame::client_game_message(object_id, message_id);
    codec::encode_into(message, &mut writer);
    writer.into_bytes()
}
