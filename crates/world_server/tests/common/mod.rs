//! Shared fixtures for the world server integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use replica_codec::ObjectId;
use world_server::objects::ComponentKind;
use world_server::registry::HandlerGroup;
use world_server::zone::{SpawnDescriptor, StaticZoneMetadata, ZoneDescriptor};
use world_server::{MemorySink, MemoryStore, ServerConfig, WorldServer};

pub const HUB: u16 = 1000;
pub const ARENA: u16 = 1001;

/// Crate object every hub instance spawns with a fixed id.
pub const CRATE_ID: ObjectId = ObjectId(500);
pub const CRATE_HEALTH: u32 = 10;

pub fn endpoint(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

pub fn config() -> ServerConfig {
    ServerConfig {
        zone_ids: vec![HUB, ARENA],
        default_zone: HUB,
        tick_interval_ms: 0,
        ..ServerConfig::default()
    }
}

pub fn zones() -> StaticZoneMetadata {
    let mut hub = ZoneDescriptor::empty(HUB);
    hub.name = "Hub".to_string();
    hub.spawn_point = [1.0, 2.0, 3.0];

    let mut smashable = SpawnDescriptor::new(6010);
    smashable.name = "Crate".to_string();
    smashable.object_id = Some(CRATE_ID.0);
    smashable.components = vec![ComponentKind::Stats, ComponentKind::Destructible];
    smashable.max_health = Some(CRATE_HEALTH);
    hub.objects.push(smashable);

    let mut arena = ZoneDescriptor::empty(ARENA);
    arena.spawn_point = [-10.0, 0.0, 10.0];

    StaticZoneMetadata::new([hub, arena])
}

pub struct Harness {
    pub server: WorldServer,
    pub sink: Arc<MemorySink>,
    pub store: Arc<MemoryStore>,
}

pub fn harness(groups: Vec<Arc<dyn HandlerGroup>>) -> Harness {
    let sink = Arc::new(MemorySink::new());
    let store = Arc::new(MemoryStore::new());
    let mut builder = WorldServer::builder(config())
        .metadata(Arc::new(zones()))
        .sink(sink.clone())
        .store(store.clone());
    for group in groups {
        builder = builder.group(group);
    }
    Harness {
        server: builder.build().expect("server builds"),
        sink,
        store,
    }
}
