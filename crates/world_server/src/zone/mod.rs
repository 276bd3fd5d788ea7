//! Zones: live object sets and their replication to observers.
//!
//! A [`Zone`] owns the objects spawned into it and tracks which observers
//! (client endpoints) have received each object's construct. New observers
//! are sent a construct for every live object, dirty objects are serialized
//! to observers on each tick, and destroyed objects are announced with a
//! destruction frame and dropped from the live set.

pub mod directory;
pub mod metadata;

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicU16, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use replica_codec::frame::{self, REPLICA_CONSTRUCTION, REPLICA_DESTRUCTION, REPLICA_SERIALIZE};
use replica_codec::{ObjectId, Vector3};
use tracing::{debug, info, trace, warn};

use crate::error::ServerError;
use crate::network::FrameSink;
use crate::objects::GameObject;

pub use directory::ZoneDirectory;
pub use metadata::{
    FileZoneMetadata, SpawnDescriptor, StaticZoneMetadata, ZoneDescriptor, ZoneMetadataSource,
};

/// Object ids allocated by a zone start here, offset by the zone id.
const ALLOCATED_ID_BASE: i64 = 1 << 40;

/// One instantiated zone.
pub struct Zone {
    descriptor: ZoneDescriptor,
    self_ref: Weak<Zone>,
    sink: Arc<dyn FrameSink>,
    objects: RwLock<Vec<Arc<GameObject>>>,
    network_ids: Mutex<HashMap<ObjectId, u16>>,
    next_network_id: AtomicU16,
    next_object_id: AtomicI64,
    observers: Mutex<HashMap<SocketAddr, HashSet<ObjectId>>>,
}

impl Zone {
    pub fn new(descriptor: ZoneDescriptor, sink: Arc<dyn FrameSink>) -> Arc<Self> {
        let next_object_id = ALLOCATED_ID_BASE + ((descriptor.zone_id as i64) << 24);
        Arc::new_cyclic(|self_ref| Self {
            descriptor,
            self_ref: self_ref.clone(),
            sink,
            objects: RwLock::new(Vec::new()),
            network_ids: Mutex::new(HashMap::new()),
            next_network_id: AtomicU16::new(1),
            next_object_id: AtomicI64::new(next_object_id),
            observers: Mutex::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> u16 {
        self.descriptor.zone_id
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ZoneDescriptor {
        &self.descriptor
    }

    pub fn spawn_point(&self) -> Vector3 {
        self.descriptor.spawn_point()
    }

    /// Spawns every object the descriptor lists.
    ///
    /// Objects that fail to build are logged and skipped; the rest of the
    /// zone still loads.
    ///
    /// # Returns
    ///
    /// The number of objects spawned.
    pub fn initialize(&self) -> usize {
        let mut spawned = 0;
        for spawn in &self.descriptor.objects {
            let id = spawn
                .object_id
                .map(ObjectId)
                .unwrap_or_else(|| self.allocate_object_id());
            let result = spawn.spawn(id).and_then(|object| self.add(object));
            match result {
                Ok(()) => spawned += 1,
                Err(e) => warn!("⚠️ Zone {} skipped object {} (lot {}): {}", self.id(), id, spawn.lot, e),
            }
        }
        info!("🗺️ Zone {} ({}) initialized with {} object(s)", self.id(), self.name(), spawned);
        spawned
    }

    pub fn allocate_object_id(&self) -> ObjectId {
        ObjectId(self.next_object_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Snapshot of the live objects.
    pub fn objects(&self) -> Vec<Arc<GameObject>> {
        self.objects.read().clone()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Looks an object up by id in the live set.
    pub fn find(&self, id: ObjectId) -> Option<Arc<GameObject>> {
        self.objects.read().iter().find(|o| o.id() == id).cloned()
    }

    pub fn player_by_endpoint(&self, endpoint: SocketAddr) -> Option<Arc<GameObject>> {
        self.objects
            .read()
            .iter()
            .find(|o| o.endpoint() == Some(endpoint))
            .cloned()
    }

    pub fn players(&self) -> Vec<Arc<GameObject>> {
        self.objects.read().iter().filter(|o| o.is_player()).cloned().collect()
    }

    pub fn network_id(&self, id: ObjectId) -> Option<u16> {
        self.network_ids.lock().get(&id).copied()
    }

    /// Adds an object to the live set and constructs it for every observer.
    ///
    /// The object leaves the set on its own when destroyed.
    pub fn add(&self, object: Arc<GameObject>) -> Result<(), ServerError> {
        if object.is_destroyed() {
            return Err(ServerError::Routing(format!(
                "object {} was destroyed before joining zone {}",
                object.id(),
                self.id()
            )));
        }
        {
            let mut objects = self.objects.write();
            if objects.iter().any(|o| o.id() == object.id()) {
                return Err(ServerError::Configuration(format!(
                    "object id {} already live in zone {}",
                    object.id(),
                    self.id()
                )));
            }
            objects.push(object.clone());
        }
        let network_id = self.assign_network_id(object.id());

        let zone = self.self_ref.clone();
        object.on_destroy(move |id| {
            if let Some(zone) = zone.upgrade() {
                zone.detach(id);
            }
        });

        let mut observers = self.observers.lock();
        if !observers.is_empty() && !object.is_destroyed() {
            let construct = Self::construction_frame(&object, network_id);
            for (endpoint, constructed) in observers.iter_mut() {
                constructed.insert(object.id());
                self.sink.send(*endpoint, construct.clone());
            }
        }
        trace!("➕ Object {} joined zone {} as #{}", object.id(), self.id(), network_id);
        Ok(())
    }

    /// Destroys a live object. Returns `false` if it was not found.
    pub fn destroy(&self, id: ObjectId) -> bool {
        match self.find(id) {
            Some(object) => object.destroy(),
            None => false,
        }
    }

    /// Starts replicating to `endpoint`, constructing every live object.
    ///
    /// # Returns
    ///
    /// The number of constructs sent.
    pub fn add_observer(&self, endpoint: SocketAddr) -> usize {
        let objects = self.objects();
        let mut observers = self.observers.lock();
        let constructed = observers.entry(endpoint).or_default();
        let mut sent = 0;
        for object in objects {
            if !constructed.insert(object.id()) {
                continue;
            }
            if let Some(network_id) = self.network_id(object.id()) {
                self.sink.send(endpoint, Self::construction_frame(&object, network_id));
                sent += 1;
            }
        }
        debug!("👀 {} observes zone {} ({} construct(s))", endpoint, self.id(), sent);
        sent
    }

    pub fn remove_observer(&self, endpoint: SocketAddr) -> bool {
        self.observers.lock().remove(&endpoint).is_some()
    }

    pub fn observers(&self) -> Vec<SocketAddr> {
        self.observers.lock().keys().copied().collect()
    }

    /// Sends a frame to every observer.
    pub fn broadcast(&self, frame: &[u8]) {
        let observers = self.observers();
        self.sink.broadcast(&observers, frame);
    }

    /// Serializes every dirty object to the observers that hold its
    /// construct.
    ///
    /// # Returns
    ///
    /// The number of frames sent.
    pub fn replicate_tick(&self) -> usize {
        let mut sent = 0;
        for object in self.objects() {
            if !object.is_dirty() {
                continue;
            }
            let Some(network_id) = self.network_id(object.id()) else {
                continue;
            };
            let mut writer = frame::replica(REPLICA_SERIALIZE, network_id);
            object.write_serialize(&mut writer);
            let bytes = writer.into_bytes();

            let observers = self.observers.lock();
            for (endpoint, constructed) in observers.iter() {
                if constructed.contains(&object.id()) {
                    self.sink.send(*endpoint, bytes.clone());
                    sent += 1;
                }
            }
        }
        sent
    }

    /// Destroys every live object.
    pub fn shutdown(&self) {
        let objects = self.objects();
        let count = objects.len();
        for object in objects {
            object.destroy();
        }
        self.observers.lock().clear();
        info!("🛑 Zone {} shut down, {} object(s) destroyed", self.id(), count);
    }

    fn assign_network_id(&self, id: ObjectId) -> u16 {
        let mut network_ids = self.network_ids.lock();
        let mut network_id = self.next_network_id.fetch_add(1, Ordering::Relaxed);
        while network_id == 0 || network_ids.values().any(|n| *n == network_id) {
            network_id = self.next_network_id.fetch_add(1, Ordering::Relaxed);
        }
        network_ids.insert(id, network_id);
        network_id
    }

    fn detach(&self, id: ObjectId) {
        self.objects.write().retain(|o| o.id() != id);
        let Some(network_id) = self.network_ids.lock().remove(&id) else {
            return;
        };

        let destruction = frame::replica(REPLICA_DESTRUCTION, network_id).into_bytes();
        let mut observers = self.observers.lock();
        for (endpoint, constructed) in observers.iter_mut() {
            if constructed.remove(&id) {
                self.sink.send(*endpoint, destruction.clone());
            }
        }
        debug!("➖ Object {} left zone {}", id, self.id());
    }

    fn construction_frame(object: &GameObject, network_id: u16) -> Vec<u8> {
        let mut writer = frame::replica(REPLICA_CONSTRUCTION, network_id);
        object.write_construct(&mut writer);
        writer.into_bytes()
    }
}

impl std::fmt::Debug for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Zone")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("objects", &self.len())
            .finish()
    }
}
