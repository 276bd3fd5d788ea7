//! Character persistence.
//!
//! The world server only needs two scoped operations from its store: load a
//! character when the client finishes loading, and save it when the client
//! leaves. Each call stands alone; there are no cross-call transactions.

use async_trait::async_trait;
use dashmap::DashMap;
use replica_codec::{ObjectId, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ServerError;
use crate::objects::{
    CharacterComponent, ControllablePhysicsComponent, GameObject, InventoryComponent,
    StatsComponent,
};

/// One inventory entry of a stored character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub object_id: i64,
    pub lot: u32,
    pub count: u32,
    pub slot: u32,
}

/// Stored character state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub object_id: i64,
    pub name: String,
    pub level: u32,
    pub zone_id: u16,
    pub position: [f32; 3],
    pub health: u32,
    pub max_health: u32,
    #[serde(default)]
    pub inventory: Vec<ItemRecord>,
}

impl CharacterRecord {
    /// A level 1 character with full health and an empty inventory.
    pub fn new(object_id: ObjectId, name: impl Into<String>, zone_id: u16) -> Self {
        Self {
            object_id: object_id.0,
            name: name.into(),
            level: 1,
            zone_id,
            position: [0.0; 3],
            health: 4,
            max_health: 4,
            inventory: Vec::new(),
        }
    }

    /// Captures the persistent state of a live player object.
    pub fn capture(player: &GameObject, zone_id: u16) -> Self {
        let mut record = CharacterRecord::new(player.id(), player.name(), zone_id);
        if let Some(position) = player.with::<ControllablePhysicsComponent, _>(|p| p.position()) {
            record.position = [position.x, position.y, position.z];
        }
        if let Some((health, max_health)) =
            player.with::<StatsComponent, _>(|s| (s.health(), s.state().max_health))
        {
            record.health = health;
            record.max_health = max_health;
        }
        if let Some(level) = player.with::<CharacterComponent, _>(|c| c.level()) {
            record.level = level;
        }
        if let Some(items) = player.with::<InventoryComponent, _>(|inv| inv.items()) {
            record.inventory = items
                .iter()
                .map(|item| ItemRecord {
                    object_id: item.object.id().0,
                    lot: item.object.lot(),
                    count: item.count,
                    slot: item.slot,
                })
                .collect();
        }
        record
    }

    pub fn position(&self) -> Vector3 {
        Vector3::new(self.position[0], self.position[1], self.position[2])
    }
}

/// Character/inventory store.
#[async_trait]
pub trait CharacterStore: Send + Sync {
    /// Loads a character, `Ok(None)` if it has never been saved.
    async fn load_character(&self, id: ObjectId) -> Result<Option<CharacterRecord>, ServerError>;

    async fn save_character(&self, record: CharacterRecord) -> Result<(), ServerError>;
}

/// In-process store; contents are lost on shutdown.
#[derive(Debug, Default)]
pub struct MemoryStore {
    characters: DashMap<i64, CharacterRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }
}

#[async_trait]
impl CharacterStore for MemoryStore {
    async fn load_character(&self, id: ObjectId) -> Result<Option<CharacterRecord>, ServerError> {
        Ok(self.characters.get(&id.0).map(|entry| entry.value().clone()))
    }

    async fn save_character(&self, record: CharacterRecord) -> Result<(), ServerError> {
        debug!("💾 Saving character {} ({})", record.object_id, record.name);
        self.characters.insert(record.object_id, record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trips_records() {
        let store = MemoryStore::new();
        assert!(store.load_character(ObjectId(7)).await.unwrap().is_none());

        let mut record = CharacterRecord::new(ObjectId(7), "Builder", 1000);
        record.level = 12;
        store.save_character(record.clone()).await.unwrap();

        assert_eq!(store.load_character(ObjectId(7)).await.unwrap(), Some(record));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn capture_reads_component_state() {
        let item = GameObject::builder(ObjectId(90), 1727).build().unwrap();
        let player = GameObject::builder(ObjectId(8), 1)
            .name("Scout")
            .component(ControllablePhysicsComponent::new(Vector3::new(4.0, 5.0, 6.0)))
            .component(StatsComponent::new(10, 0, 0))
            .component(CharacterComponent::new("Scout", 3))
            .component(InventoryComponent::default())
            .build()
            .unwrap();
        player.with::<InventoryComponent, _>(|inv| inv.add_item(item, 2, 1));
        player.with_mut::<StatsComponent, _>(|s| s.damage(4));

        let record = CharacterRecord::capture(&player, 1100);
        assert_eq!(record.position, [4.0, 5.0, 6.0]);
        assert_eq!((record.health, record.max_health), (6, 10));
        assert_eq!(record.level, 3);
        assert_eq!(
            record.inventory,
            vec![ItemRecord { object_id: 90, lot: 1727, count: 2, slot: 1 }]
        );
    }
}
