//! # World Server - Zone-Hosting Game Server Core
//!
//! The world server terminates the game's UDP protocol, owns the live zones
//! and their game objects, and routes every inbound frame to the handler
//! registered for it. Game behavior lives in handler groups; the core only
//! provides the infrastructure those groups run on.
//!
//! ## Architecture Overview
//!
//! ### Core Components
//!
//! * **Handler Registry** - typed handlers keyed by packet route or game
//!   message id, plus console and chat commands, frozen after startup
//! * **Dispatcher** - classifies frames, resolves session, zone and target
//!   object, then runs the handler inline or off the receive path
//! * **Zone Directory** - lazily instantiates configured zones exactly once
//! * **Zones** - live object sets with construct, serialize and destruction
//!   replication to observers
//! * **Game Objects** - ordered component collections with dependency checks
//!   and destroy listeners
//!
//! ### Frame Flow
//!
//! 1. A datagram arrives and its endpoint is mapped to a session
//! 2. The frame header is classified as a packet, game message or control byte
//! 3. Game messages are resolved to the target object in the session's zone
//! 4. The payload is decoded into the handler's message type
//! 5. The handler runs with a [`HandlerContext`] and replies through the sink
//!
//! ### Handler Groups
//!
//! ```rust
//! use std::sync::Arc;
//! use world_server::messages::gameplay::PlayEmote;
//! use world_server::{HandlerGroup, RegistryBuilder};
//!
//! struct Emotes;
//!
//! impl HandlerGroup for Emotes {
//!     fn name(&self) -> &'static str {
//!         "emotes"
//!     }
//!
//!     fn register(self: Arc<Self>, builder: &mut RegistryBuilder) {
//!         builder.on::<PlayEmote, _>(|emote, ctx| {
//!             tracing::info!("{} played emote {}", ctx.endpoint(), emote.emote_id);
//!             Ok(())
//!         });
//!     }
//! }
//! ```
//!
//! ## Error Handling
//!
//! Failures are reported as [`ServerError`] and classified by [`ErrorKind`].
//! A bad frame, a missing object or a failing handler never takes the
//! server down: the frame is dropped, logged and counted in the dispatch
//! statistics.

pub use config::ServerConfig;
pub use context::{HandlerContext, ServerContext};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::{ErrorKind, ServerError};
pub use messages::{Message, MessageKind};
pub use network::{FrameSink, MemorySink};
pub use objects::{Component, ComponentKind, GameObject};
pub use persistence::{CharacterRecord, CharacterStore, MemoryStore};
pub use registry::{HandlerGroup, HandlerRegistry, InvocationMode, RegistryBuilder};
pub use server::{WorldServer, WorldServerBuilder};
pub use shutdown::ShutdownState;
pub use stats::StatsSnapshot;
pub use zone::{Zone, ZoneDirectory, ZoneMetadataSource};

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod groups;
pub mod messages;
pub mod network;
pub mod objects;
pub mod persistence;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod stats;
pub mod zone;
