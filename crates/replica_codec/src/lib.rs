//! # Replica Codec
//!
//! Schema-driven, reflection-free binary codec shared by the world server and
//! its tools. Packets, game messages and component replica payloads are all
//! written through the same [`BitWriter`] and read back through the same
//! [`BitReader`], which keeps field order and default suppression symmetric
//! between the two directions.
//!
//! ## Building blocks
//!
//! * [`bits`] - MSB-first bit stream with little-endian primitives
//! * [`wire`] - the [`WireValue`] trait and its primitive implementations
//! * [`types`] - object ids, wide strings, compressed integers, vectors
//! * [`descriptor`] - per-field [`PropertyDescriptor`]s and the [`Schema`] trait
//! * [`schema!`] - declares a struct together with its descriptors
//! * [`cache`] - memoizes descriptor lists once per concrete type
//! * [`codec`] - encode and decode driven by descriptor lists
//! * [`ldf`] - typed key/value metadata dictionary with a zlib blob form
//! * [`frame`] - fixed frame headers, direction codes and frame classification
//!
//! ## Example
//!
//! ```rust
//! use replica_codec::{codec, frame, schema, Frame, ObjectId};
//!
//! schema! {
//!     #[derive(Debug, Default, PartialEq)]
//!     pub struct RequestUse {
//!         pub multi_interact: bool,
//!         pub target: ObjectId,
//!     }
//! }
//!
//! let mut writer = frame::client_game_message(ObjectId(42), 364);
//! codec::encode_into(&RequestUse { multi_interact: false, target: ObjectId(7) }, &mut writer);
//! let bytes = writer.into_bytes();
//!
//! let Frame::GameMessage(header) = Frame::classify(&bytes).unwrap() else { unreachable!() };
//! assert_eq!(header.message_id, 364);
//! let message: RequestUse = codec::decode_at(&bytes, frame::GAME_MESSAGE_PAYLOAD_OFFSET).unwrap();
//! assert_eq!(message.target, ObjectId(7));
//! ```

pub mod bits;
pub mod cache;
pub mod codec;
pub mod descriptor;
pub mod error;
pub mod frame;
pub mod ldf;
pub mod macros;
pub mod types;
pub mod wire;

pub use bits::{BitReader, BitWriter};
pub use cache::DescriptorCache;
pub use descriptor::{Descriptors, PropertyDescriptor, Schema, Suppression};
pub use error::{CodecError, Result};
pub use frame::{Direction, Frame, GameMessageHeader, PacketHeader};
pub use ldf::{LdfDictionary, LdfValue};
pub use types::{Compressed, ObjectId, Quaternion, Vector3, WString};
pub use wire::{FieldKind, WireValue};
