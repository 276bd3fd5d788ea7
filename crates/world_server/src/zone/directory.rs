//! The server-wide zone directory.
//!
//! Zones are created on demand, the first time a client finishes loading
//! into one. The descriptor table behind them is loaded lazily, once, and a
//! creation guard makes sure each configured zone id maps to at most one live
//! [`Zone`] for the lifetime of the directory.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use super::metadata::{ZoneDescriptor, ZoneMetadataSource};
use super::Zone;
use crate::error::ServerError;
use crate::network::FrameSink;
use crate::persistence::CharacterRecord;

pub struct ZoneDirectory {
    configured: HashSet<u16>,
    metadata: Arc<dyn ZoneMetadataSource>,
    table: OnceCell<HashMap<u16, ZoneDescriptor>>,
    zones: RwLock<Vec<Arc<Zone>>>,
    creation: Mutex<()>,
    sink: Arc<dyn FrameSink>,
}

impl ZoneDirectory {
    /// Creates a directory allowed to host `zone_ids`.
    pub fn new(
        zone_ids: impl IntoIterator<Item = u16>,
        metadata: Arc<dyn ZoneMetadataSource>,
        sink: Arc<dyn FrameSink>,
    ) -> Self {
        Self {
            configured: zone_ids.into_iter().collect(),
            metadata,
            table: OnceCell::new(),
            zones: RwLock::new(Vec::new()),
            creation: Mutex::new(()),
            sink,
        }
    }

    pub fn is_configured(&self, zone_id: u16) -> bool {
        self.configured.contains(&zone_id)
    }

    /// Configured zone ids in ascending order.
    pub fn configured_ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.configured.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the live zone for `zone_id`, creating and initializing it on
    /// first use.
    ///
    /// # Arguments
    ///
    /// * `zone_id` - Zone to fetch; must be one of the configured ids
    ///
    /// # Returns
    ///
    /// The single live instance for this id, a `Configuration` error for an
    /// id outside the configured set, or `ZoneLoad` when its metadata is
    /// unavailable.
    pub async fn get_or_create_zone(&self, zone_id: u16) -> Result<Arc<Zone>, ServerError> {
        if !self.is_configured(zone_id) {
            warn!("🚫 Zone {} requested but not configured on this server", zone_id);
            return Err(ServerError::Configuration(format!(
                "zone {zone_id} is not configured on this server"
            )));
        }
        if let Some(zone) = self.zone(zone_id) {
            return Ok(zone);
        }

        let _guard = self.creation.lock().await;
        if let Some(zone) = self.zone(zone_id) {
            return Ok(zone);
        }

        let table = self
            .table
            .get_or_try_init(|| self.metadata.load())
            .await
            .map_err(|e| ServerError::ZoneLoad {
                zone_id,
                reason: e.to_string(),
            })?;
        let descriptor = table.get(&zone_id).cloned().ok_or_else(|| ServerError::ZoneLoad {
            zone_id,
            reason: "no metadata for zone".to_string(),
        })?;

        let zone = Zone::new(descriptor, self.sink.clone());
        self.zones.write().push(zone.clone());
        zone.initialize();
        info!("🌍 Zone {} is live ({} total)", zone_id, self.len());
        Ok(zone)
    }

    /// The live zone for `zone_id`, if it has been created.
    pub fn zone(&self, zone_id: u16) -> Option<Arc<Zone>> {
        self.zones.read().iter().find(|z| z.id() == zone_id).cloned()
    }

    /// Snapshot of the live zones.
    pub fn zones(&self) -> Vec<Arc<Zone>> {
        self.zones.read().clone()
    }

    pub fn len(&self) -> usize {
        self.zones.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.read().is_empty()
    }

    /// Removes the player controlled from `endpoint`.
    ///
    /// Zones are scanned in creation order; the first player found for the
    /// endpoint is captured and destroyed, and scanning stops there.
    ///
    /// # Returns
    ///
    /// The player's state as it was just before destruction.
    pub fn on_disconnect(&self, endpoint: SocketAddr, reason: &str) -> Option<CharacterRecord> {
        for zone in self.zones() {
            zone.remove_observer(endpoint);
            if let Some(player) = zone.player_by_endpoint(endpoint) {
                let record = CharacterRecord::capture(&player, zone.id());
                player.destroy();
                info!(
                    "👋 Player {} left zone {} ({})",
                    player.id(),
                    zone.id(),
                    reason
                );
                return Some(record);
            }
        }
        debug!("No player for {} in any zone ({})", endpoint, reason);
        None
    }

    /// Runs one replication tick over every zone.
    pub fn replicate_tick(&self) -> usize {
        self.zones().iter().map(|zone| zone.replicate_tick()).sum()
    }

    /// Shuts every zone down and forgets them.
    pub fn shutdown(&self) {
        let zones = std::mem::take(&mut *self.zones.write());
        for zone in zones {
            zone.shutdown();
        }
    }
}

impl std::fmt::Debug for ZoneDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneDirectory")
            .field("configured", &self.configured_ids())
            .field("live", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::network::MemorySink;
    use crate::objects::{ControllablePhysicsComponent, GameObject};
    use crate::zone::metadata::StaticZoneMetadata;
    use async_trait::async_trait;
    use replica_codec::{ObjectId, Vector3};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        loads: AtomicUsize,
        inner: StaticZoneMetadata,
    }

    #[async_trait]
    impl ZoneMetadataSource for CountingSource {
        async fn load(&self) -> Result<HashMap<u16, ZoneDescriptor>, ServerError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load().await
        }
    }

    fn directory(ids: &[u16]) -> (ZoneDirectory, Arc<CountingSource>) {
        let source = Arc::new(CountingSource {
            loads: AtomicUsize::new(0),
            inner: StaticZoneMetadata::empty_zones(ids.iter().copied()),
        });
        let directory = ZoneDirectory::new(
            ids.iter().copied(),
            source.clone(),
            Arc::new(MemorySink::new()),
        );
        (directory, source)
    }

    #[tokio::test]
    async fn same_id_yields_the_same_zone() {
        let (directory, source) = directory(&[1000, 1100]);
        let first = directory.get_or_create_zone(1000).await.unwrap();
        let second = directory.get_or_create_zone(1000).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        directory.get_or_create_zone(1100).await.unwrap();
        assert_eq!(directory.len(), 2);
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unconfigured_ids_are_refused() {
        let (directory, _) = directory(&[1000]);
        let error = directory.get_or_create_zone(1200).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Configuration);
        assert!(directory.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creation_makes_one_zone() {
        let (directory, _) = directory(&[1000]);
        let directory = Arc::new(directory);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let directory = directory.clone();
                tokio::spawn(async move { directory.get_or_create_zone(1000).await.unwrap() })
            })
            .collect();
        let zones = futures::future::join_all(tasks).await;

        let first = zones[0].as_ref().unwrap();
        assert!(zones.iter().all(|z| Arc::ptr_eq(first, z.as_ref().unwrap())));
        assert_eq!(directory.len(), 1);
    }

    #[tokio::test]
    async fn configured_zone_without_metadata_fails_to_load() {
        let directory = ZoneDirectory::new(
            [1000, 1300],
            Arc::new(StaticZoneMetadata::empty_zones([1000])),
            Arc::new(MemorySink::new()),
        );
        let error = directory.get_or_create_zone(1300).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ZoneLoad);
        assert!(directory.get_or_create_zone(1000).await.is_ok());
    }

    #[tokio::test]
    async fn disconnect_destroys_the_player() {
        let (directory, _) = directory(&[1000]);
        let zone = directory.get_or_create_zone(1000).await.unwrap();
        let endpoint = SocketAddr::from(([127, 0, 0, 1], 7000));
        let player = GameObject::builder(ObjectId(42), 1)
            .name("Runner")
            .endpoint(endpoint)
            .component(ControllablePhysicsComponent::new(Vector3::new(1.0, 1.0, 1.0)))
            .build()
            .unwrap();
        zone.add(player.clone()).unwrap();
        zone.add_observer(endpoint);

        let record = directory.on_disconnect(endpoint, "test").unwrap();
        assert_eq!(record.object_id, 42);
        assert_eq!(record.position, [1.0, 1.0, 1.0]);
        assert!(player.is_destroyed());
        assert!(zone.find(ObjectId(42)).is_none());
        assert!(zone.observers().is_empty());

        assert!(directory.on_disconnect(endpoint, "again").is_none());
    }
}
