//! Contexts handed to handlers and commands.
//!
//! [`ServerContext`] is the cheap-to-clone bundle of shared server state.
//! [`HandlerContext`] adds what the dispatcher resolved for one frame: the
//! sending endpoint, its session, and for game messages the addressed object
//! (the associate) and the zone it lives in.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context as _};
use replica_codec::ObjectId;
use tracing::{debug, error, warn};

use crate::config::ServerConfig;
use crate::messages::{self, Message};
use crate::network::FrameSink;
use crate::objects::GameObject;
use crate::persistence::CharacterStore;
use crate::registry::HandlerRegistry;
use crate::session::{Session, SessionTable};
use crate::stats::DispatchStats;
use crate::zone::{Zone, ZoneDirectory};

/// Shared server state.
#[derive(Clone)]
pub struct ServerContext {
    pub zones: Arc<ZoneDirectory>,
    pub sessions: Arc<SessionTable>,
    pub sink: Arc<dyn FrameSink>,
    pub store: Arc<dyn CharacterStore>,
    pub registry: Arc<HandlerRegistry>,
    pub config: Arc<ServerConfig>,
    pub stats: Arc<DispatchStats>,
}

impl ServerContext {
    pub fn send(&self, endpoint: SocketAddr, frame: Vec<u8>) {
        self.sink.send(endpoint, frame);
    }

    /// Sends an encoded packet message to `endpoint`.
    pub fn send_message<M: Message>(&self, endpoint: SocketAddr, message: &M) {
        self.sink.send(endpoint, messages::encode_packet(message));
    }

    /// Tears down everything tied to `endpoint`.
    ///
    /// The session is removed, the player (if any) is destroyed in its zone,
    /// and its captured state is saved in the background when a runtime is
    /// available.
    ///
    /// # Returns
    ///
    /// `true` if a session existed for the endpoint.
    pub fn disconnect(&self, endpoint: SocketAddr, reason: &str) -> bool {
        let session = self.sessions.remove(&endpoint);
        let record = self.zones.on_disconnect(endpoint, reason);

        if let Some(record) = record {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let store = self.store.clone();
                    handle.spawn(async move {
                        let id = record.object_id;
                        if let Err(e) = store.save_character(record).await {
                            error!("💾 Failed to save character {}: {}", id, e);
                        }
                    });
                }
                Err(_) => warn!(
                    "💾 No runtime available, character {} was not saved",
                    record.object_id
                ),
            }
        }

        if session.is_some() {
            debug!("🔌 {} disconnected: {}", endpoint, reason);
        }
        session.is_some()
    }

    /// The player object controlled from `endpoint`, if it has loaded in.
    pub fn player_for(&self, endpoint: SocketAddr) -> Option<Arc<GameObject>> {
        self.sessions.get(&endpoint).and_then(|session| session.player())
    }

    /// Finds a player by object id across all live zones.
    pub fn find_player(&self, id: ObjectId) -> Option<Arc<GameObject>> {
        self.zones
            .zones()
            .iter()
            .find_map(|zone| zone.find(id).filter(|object| object.is_player()))
    }

    /// Finds any live object by id, with the zone holding it.
    pub fn find_object(&self, id: ObjectId) -> Option<(Arc<Zone>, Arc<GameObject>)> {
        self.zones
            .zones()
            .into_iter()
            .find_map(|zone| zone.find(id).map(|object| (zone, object)))
    }
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("zones", &self.zones)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

/// Per-frame context passed to handlers.
#[derive(Clone)]
pub struct HandlerContext {
    endpoint: SocketAddr,
    session: Option<Arc<Session>>,
    associate: Option<Arc<GameObject>>,
    zone: Option<Arc<Zone>>,
    server: ServerContext,
}

impl HandlerContext {
    pub fn new(endpoint: SocketAddr, session: Option<Arc<Session>>, server: ServerContext) -> Self {
        Self {
            endpoint,
            session,
            associate: None,
            zone: None,
            server,
        }
    }

    /// Binds the object a game message was addressed to.
    pub fn with_associate(mut self, zone: Arc<Zone>, associate: Arc<GameObject>) -> Self {
        self.zone = Some(zone);
        self.associate = Some(associate);
        self
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    pub fn server(&self) -> &ServerContext {
        &self.server
    }

    pub fn session(&self) -> anyhow::Result<&Arc<Session>> {
        self.session
            .as_ref()
            .ok_or_else(|| anyhow!("no session for {}", self.endpoint))
    }

    /// The object the game message was addressed to.
    pub fn associate(&self) -> anyhow::Result<&Arc<GameObject>> {
        self.associate
            .as_ref()
            .ok_or_else(|| anyhow!("frame from {} has no associated object", self.endpoint))
    }

    /// The sender's player object.
    pub fn player(&self) -> anyhow::Result<Arc<GameObject>> {
        self.session()?
            .player()
            .with_context(|| format!("{} has not finished loading", self.endpoint))
    }

    /// The zone the frame was resolved in, or the session's current zone.
    pub fn zone(&self) -> anyhow::Result<Arc<Zone>> {
        if let Some(zone) = &self.zone {
            return Ok(zone.clone());
        }
        let zone_id = self.session()?.zone_id();
        self.server
            .zones
            .zone(zone_id)
            .with_context(|| format!("zone {zone_id} is not live"))
    }

    /// Sends a raw frame back to the sender.
    pub fn send(&self, frame: Vec<u8>) {
        self.server.send(self.endpoint, frame);
    }

    /// Replies to the sender with a packet message.
    pub fn reply<M: Message>(&self, message: &M) {
        self.server.send_message(self.endpoint, message);
    }

    /// Sends a game message from `object_id` to the sender only.
    pub fn reply_game_message<M: Message>(&self, object_id: ObjectId, message: &M) {
        self.send(messages::encode_game_message(object_id, message));
    }

    /// Sends a game message from `object_id` to every observer of the zone.
    pub fn broadcast_game_message<M: Message>(&self, object_id: ObjectId, message: &M) -> anyhow::Result<()> {
        let frame = messages::encode_game_message(object_id, message);
        self.zone()?.broadcast(&frame);
        Ok(())
    }
}

impl std::fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("endpoint", &self.endpoint)
            .field("session", &self.session.as_ref().map(|s| s.id()))
            .field("associate", &self.associate.as_ref().map(|o| o.id()))
            .finish()
    }
}
