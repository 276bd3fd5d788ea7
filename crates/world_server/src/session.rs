//! Per-endpoint session tracking.
//!
//! A [`Session`] is created the first time a datagram arrives from an
//! endpoint and lives until that endpoint disconnects or idles out. Once the
//! client finishes loading a zone the session is bound to its player object.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ServerError;
use crate::objects::GameObject;

/// State of one connected client.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    endpoint: SocketAddr,
    zone_id: AtomicU16,
    privilege: u8,
    player: RwLock<Option<Arc<GameObject>>>,
    connected_at: Instant,
    last_seen: Mutex<Instant>,
}

impl Session {
    pub fn new(endpoint: SocketAddr, zone_id: u16, privilege: u8) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            endpoint,
            zone_id: AtomicU16::new(zone_id),
            privilege,
            player: RwLock::new(None),
            connected_at: now,
            last_seen: Mutex::new(now),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    /// Zone whose live objects game messages from this session address.
    pub fn zone_id(&self) -> u16 {
        self.zone_id.load(Ordering::Acquire)
    }

    pub fn set_zone_id(&self, zone_id: u16) {
        self.zone_id.store(zone_id, Ordering::Release);
    }

    pub fn privilege(&self) -> u8 {
        self.privilege
    }

    pub fn player(&self) -> Option<Arc<GameObject>> {
        self.player.read().clone()
    }

    /// Binds the player object, returning any previous one.
    pub fn set_player(&self, player: Arc<GameObject>) -> Option<Arc<GameObject>> {
        self.player.write().replace(player)
    }

    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }

    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }
}

/// Serializable view of a session for console output.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub endpoint: SocketAddr,
    pub zone_id: u16,
    pub player: Option<i64>,
    pub connected_secs: u64,
}

/// All live sessions keyed by endpoint.
///
/// Keying by endpoint keeps endpoints unique server-wide, which the zone
/// disconnect path relies on.
#[derive(Debug)]
pub struct SessionTable {
    sessions: DashMap<SocketAddr, Arc<Session>>,
    max_connections: usize,
}

impl SessionTable {
    pub fn new(max_connections: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_connections,
        }
    }

    /// Creates a session for `endpoint`.
    ///
    /// # Returns
    ///
    /// The new session, or a `Network` error if the table is full or the
    /// endpoint already has one.
    pub fn create(
        &self,
        endpoint: SocketAddr,
        zone_id: u16,
        privilege: u8,
    ) -> Result<Arc<Session>, ServerError> {
        if self.sessions.len() >= self.max_connections {
            return Err(ServerError::Network(format!(
                "connection limit of {} reached, refusing {}",
                self.max_connections, endpoint
            )));
        }
        match self.sessions.entry(endpoint) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ServerError::Network(format!(
                "endpoint {endpoint} already has a session"
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let session = Arc::new(Session::new(endpoint, zone_id, privilege));
                slot.insert(session.clone());
                info!("🔗 Session {} opened for {}", session.id(), endpoint);
                Ok(session)
            }
        }
    }

    pub fn get(&self, endpoint: &SocketAddr) -> Option<Arc<Session>> {
        self.sessions.get(endpoint).map(|entry| entry.value().clone())
    }

    /// Returns the existing session or opens a new one.
    pub fn get_or_create(
        &self,
        endpoint: SocketAddr,
        zone_id: u16,
        privilege: u8,
    ) -> Result<Arc<Session>, ServerError> {
        if let Some(session) = self.get(&endpoint) {
            return Ok(session);
        }
        match self.create(endpoint, zone_id, privilege) {
            Ok(session) => Ok(session),
            // Lost a race with another first datagram from the same endpoint.
            Err(_) if self.sessions.contains_key(&endpoint) => self
                .get(&endpoint)
                .ok_or_else(|| ServerError::Internal(format!("session for {endpoint} vanished"))),
            Err(e) => Err(e),
        }
    }

    pub fn remove(&self, endpoint: &SocketAddr) -> Option<Arc<Session>> {
        let removed = self.sessions.remove(endpoint).map(|(_, session)| session);
        if let Some(session) = &removed {
            debug!(
                "❌ Session {} for {} closed after {:?}",
                session.id(),
                endpoint,
                session.connected_for()
            );
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Endpoints that have been silent for at least `timeout`.
    pub fn idle(&self, timeout: Duration) -> Vec<SocketAddr> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().idle_for() >= timeout)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn endpoints(&self) -> Vec<SocketAddr> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    pub fn snapshot(&self) -> Vec<SessionSummary> {
        self.sessions
            .iter()
            .map(|entry| {
                let session = entry.value();
                SessionSummary {
                    id: session.id(),
                    endpoint: session.endpoint(),
                    zone_id: session.zone_id(),
                    player: session.player().map(|p| p.id().0),
                    connected_secs: session.connected_for().as_secs(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn endpoints_are_unique() {
        let table = SessionTable::new(4);
        let first = table.create(addr(4000), 1000, 0).unwrap();
        assert!(table.create(addr(4000), 1000, 0).is_err());

        let again = table.get_or_create(addr(4000), 1000, 0).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn connection_limit_is_enforced() {
        let table = SessionTable::new(1);
        table.create(addr(4001), 1000, 0).unwrap();
        let refused = table.create(addr(4002), 1000, 0).unwrap_err();
        assert_eq!(refused.kind(), crate::error::ErrorKind::Network);
    }

    #[test]
    fn idle_sessions_are_reported() {
        let table = SessionTable::new(4);
        table.create(addr(4003), 1000, 0).unwrap();
        assert_eq!(table.idle(Duration::ZERO), vec![addr(4003)]);
        assert!(table.idle(Duration::from_secs(3600)).is_empty());

        assert!(table.remove(&addr(4003)).is_some());
        assert!(table.is_empty());
    }

    #[test]
    fn zone_follows_load_complete() {
        let session = Session::new(addr(4004), 1000, 2);
        session.set_zone_id(1100);
        assert_eq!(session.zone_id(), 1100);
        assert_eq!(session.privilege(), 2);
        assert!(session.player().is_none());
    }
}
