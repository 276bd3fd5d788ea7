//! Static zone descriptors and where they come from.
//!
//! The descriptor table is loaded at most once per server (see
//! [`ZoneDirectory`](super::ZoneDirectory)) and consulted whenever a zone is
//! first instantiated. A zones file looks like:
//!
//! ```toml
//! [[zones]]
//! zone_id = 1000
//! name = "Venture Explorer"
//! spawn_point = [-627.0, 613.0, -47.0]
//!
//! [[zones.objects]]
//! lot = 6010
//! name = "Crate"
//! position = [-600.0, 613.0, -30.0]
//! components = ["stats", "destructible"]
//! config = "respawn=1:10"
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use replica_codec::{LdfDictionary, ObjectId, Vector3};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ServerError;
use crate::objects::{
    Component, ComponentKind, ControllablePhysicsComponent, GameObject, StatsComponent,
};

/// One object a zone spawns when it initializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnDescriptor {
    pub lot: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position: [f32; 3],
    /// LDF text form, one `key=type:value` entry per line
    #[serde(default)]
    pub config: String,
    #[serde(default)]
    pub components: Vec<ComponentKind>,
    /// Fixed object id; allocated by the zone when absent
    #[serde(default)]
    pub object_id: Option<i64>,
    #[serde(default)]
    pub max_health: Option<u32>,
}

impl SpawnDescriptor {
    pub fn new(lot: u32) -> Self {
        Self {
            lot,
            name: String::new(),
            position: [0.0; 3],
            config: String::new(),
            components: Vec::new(),
            object_id: None,
            max_health: None,
        }
    }

    pub fn position(&self) -> Vector3 {
        Vector3::new(self.position[0], self.position[1], self.position[2])
    }

    /// Builds the described object under `id`.
    pub fn spawn(&self, id: ObjectId) -> Result<std::sync::Arc<GameObject>, ServerError> {
        let config = LdfDictionary::from_text(&self.config)?;
        let components = self.components.iter().map(|kind| match kind {
            ComponentKind::ControllablePhysics => {
                Component::from(ControllablePhysicsComponent::new(self.position()))
            }
            ComponentKind::Stats => match self.max_health {
                Some(max_health) => Component::from(StatsComponent::new(max_health, 0, 0)),
                None => kind.default_component(),
            },
            _ => kind.default_component(),
        });

        GameObject::builder(id, self.lot)
            .name(self.name.clone())
            .config(config)
            .components(components)
            .build()
    }
}

/// Static description of one zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDescriptor {
    pub zone_id: u16,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub spawn_point: [f32; 3],
    #[serde(default)]
    pub objects: Vec<SpawnDescriptor>,
}

impl ZoneDescriptor {
    /// A zone with no objects.
    pub fn empty(zone_id: u16) -> Self {
        Self {
            zone_id,
            name: format!("Zone {zone_id}"),
            spawn_point: [0.0; 3],
            objects: Vec::new(),
        }
    }

    pub fn spawn_point(&self) -> Vector3 {
        Vector3::new(self.spawn_point[0], self.spawn_point[1], self.spawn_point[2])
    }
}

/// Provider of the zone descriptor table.
#[async_trait]
pub trait ZoneMetadataSource: Send + Sync {
    async fn load(&self) -> Result<HashMap<u16, ZoneDescriptor>, ServerError>;
}

#[derive(Debug, Deserialize)]
struct ZonesFile {
    #[serde(default)]
    zones: Vec<ZoneDescriptor>,
}

/// Reads descriptors from a TOML zones file.
#[derive(Debug, Clone)]
pub struct FileZoneMetadata {
    path: PathBuf,
}

impl FileZoneMetadata {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parses zones file content.
    pub fn parse(content: &str) -> Result<HashMap<u16, ZoneDescriptor>, ServerError> {
        let file: ZonesFile = toml::from_str(content)
            .map_err(|e| ServerError::Configuration(format!("invalid zones file: {e}")))?;
        let mut table = HashMap::with_capacity(file.zones.len());
        for zone in file.zones {
            if table.contains_key(&zone.zone_id) {
                return Err(ServerError::Configuration(format!(
                    "zone {} is described twice",
                    zone.zone_id
                )));
            }
            table.insert(zone.zone_id, zone);
        }
        Ok(table)
    }
}

#[async_trait]
impl ZoneMetadataSource for FileZoneMetadata {
    async fn load(&self) -> Result<HashMap<u16, ZoneDescriptor>, ServerError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ServerError::Configuration(format!("cannot read {}: {e}", self.path.display()))
        })?;
        let table = Self::parse(&content)?;
        info!(
            "🗺️ Loaded {} zone descriptor(s) from {}",
            table.len(),
            self.path.display()
        );
        Ok(table)
    }
}

/// Descriptor table fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticZoneMetadata {
    zones: HashMap<u16, ZoneDescriptor>,
}

impl StaticZoneMetadata {
    pub fn new(zones: impl IntoIterator<Item = ZoneDescriptor>) -> Self {
        Self {
            zones: zones.into_iter().map(|zone| (zone.zone_id, zone)).collect(),
        }
    }

    /// Empty descriptors for each id.
    pub fn empty_zones(zone_ids: impl IntoIterator<Item = u16>) -> Self {
        Self::new(zone_ids.into_iter().map(ZoneDescriptor::empty))
    }
}

#[async_trait]
impl ZoneMetadataSource for StaticZoneMetadata {
    async fn load(&self) -> Result<HashMap<u16, ZoneDescriptor>, ServerError> {
        Ok(self.zones.clone())
    }
}
