//! Game objects and their component sets.
//!
//! A [`GameObject`] owns an ordered list of [`Component`]s, validated at
//! build time against each component's declared dependencies. Destroying an
//! object releases its components in reverse order, cascades to any objects
//! they own (inventory items), and fires every destroy listener exactly once.
//! Zones and inventories use those listeners to drop their references, so a
//! destroyed object disappears from every collection that held it.

pub mod components;

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use replica_codec::{codec, schema, BitWriter, LdfDictionary, ObjectId, WString};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::error::ServerError;
pub use components::{
    CharacterComponent, Component, ComponentKind, ComponentVariant, ControllablePhysicsComponent,
    DestructibleComponent, InventoryComponent, InventoryItem, StatsComponent,
};

/// Callback run once when an object is destroyed.
pub type DestroyListener = Box<dyn FnOnce(ObjectId) + Send>;

schema! {
    /// Header written ahead of the component constructs.
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct ConstructHeader {
        pub object_id: ObjectId,
        pub lot: u32,
        pub name: WString,
        pub created_at: u64,
        pub config: Option<LdfDictionary>,
    }
}

/// An in-world entity.
pub struct GameObject {
    id: ObjectId,
    lot: u32,
    name: String,
    created_at: u64,
    config: LdfDictionary,
    endpoint: Option<SocketAddr>,
    components: Mutex<SmallVec<[Component; 4]>>,
    listeners: Mutex<Vec<DestroyListener>>,
    destroyed: AtomicBool,
}

impl GameObject {
    /// Starts building an object with the given id and template (LOT).
    pub fn builder(id: ObjectId, lot: u32) -> GameObjectBuilder {
        GameObjectBuilder {
            id,
            lot,
            name: String::new(),
            config: LdfDictionary::new(),
            endpoint: None,
            components: Vec::new(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn lot(&self) -> u32 {
        self.lot
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &LdfDictionary {
        &self.config
    }

    /// Endpoint of the client controlling this object, for players.
    pub fn endpoint(&self) -> Option<SocketAddr> {
        self.endpoint
    }

    pub fn is_player(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub fn has(&self, kind: ComponentKind) -> bool {
        self.components.lock().iter().any(|c| c.kind() == kind)
    }

    /// Component kinds in construct order.
    pub fn component_kinds(&self) -> Vec<ComponentKind> {
        self.components.lock().iter().map(Component::kind).collect()
    }

    /// Runs `f` against the component of type `C`, if present.
    ///
    /// The component lock is held for the duration of `f`; `f` must not call
    /// back into this object.
    pub fn with<C: ComponentVariant, R>(&self, f: impl FnOnce(&C) -> R) -> Option<R> {
        let components = self.components.lock();
        components.iter().find_map(C::from_component).map(f)
    }

    /// Mutable counterpart of [`GameObject::with`].
    pub fn with_mut<C: ComponentVariant, R>(&self, f: impl FnOnce(&mut C) -> R) -> Option<R> {
        let mut components = self.components.lock();
        components.iter_mut().find_map(C::from_component_mut).map(f)
    }

    /// True when any replicating component has unsent changes.
    pub fn is_dirty(&self) -> bool {
        self.components.lock().iter().any(Component::is_dirty)
    }

    /// Writes the construct header followed by each replicating component's
    /// full state.
    pub fn write_construct(&self, writer: &mut BitWriter) {
        let header = ConstructHeader {
            object_id: self.id,
            lot: self.lot,
            name: WString::from(self.name.as_str()),
            created_at: self.created_at,
            config: (!self.config.is_empty()).then(|| self.config.clone()),
        };
        codec::encode_into(&header, writer);
        for component in self.components.lock().iter() {
            component.construct(writer);
        }
    }

    /// Writes each replicating component's incremental update, clearing
    /// dirty flags.
    pub fn write_serialize(&self, writer: &mut BitWriter) {
        for component in self.components.lock().iter_mut() {
            component.serialize(writer);
        }
    }

    /// Registers a destroy listener. If the object is already destroyed the
    /// listener runs immediately.
    pub fn on_destroy(&self, listener: impl FnOnce(ObjectId) + Send + 'static) {
        {
            let mut listeners = self.listeners.lock();
            if !self.is_destroyed() {
                listeners.push(Box::new(listener));
                return;
            }
        }
        listener(self.id);
    }

    /// Destroys the object. Returns `false` if it was already destroyed.
    pub fn destroy(&self) -> bool {
        // The listener lock orders this flag flip against `on_destroy`.
        {
            let _listeners = self.listeners.lock();
            if self.destroyed.swap(true, Ordering::AcqRel) {
                return false;
            }
        }

        let components = std::mem::take(&mut *self.components.lock());
        let mut owned = Vec::new();
        for component in components.into_iter().rev() {
            trace!("🧹 Releasing {} of object {}", component.kind().name(), self.id);
            owned.extend(component.release());
        }
        for object in owned {
            object.destroy();
        }

        let listeners = std::mem::take(&mut *self.listeners.lock());
        debug!(
            "💥 Object {} destroyed, notifying {} listener(s)",
            self.id,
            listeners.len()
        );
        for listener in listeners {
            listener(self.id);
        }
        true
    }

    /// Smashes an object carrying `Destructible` and `Stats`.
    ///
    /// Returns `Ok(false)` when it is already smashed or not smashable.
    pub fn smash(&self, killer: Option<ObjectId>) -> Result<bool, ServerError> {
        let mut components = self.components.lock();
        let smashable = components
            .iter()
            .find_map(DestructibleComponent::from_component)
            .map(|d| d.smashable && !d.is_smashed())
            .ok_or_else(|| ServerError::Routing(format!("object {} is not destructible", self.id)))?;
        if !smashable {
            return Ok(false);
        }

        if let Some(stats) = components.iter_mut().find_map(StatsComponent::from_component_mut) {
            stats.set_health(0);
        }
        if let Some(destructible) = components
            .iter_mut()
            .find_map(DestructibleComponent::from_component_mut)
        {
            destructible.mark_smashed(killer);
        }
        Ok(true)
    }

    /// Restores a smashed object to full stats. Returns `false` if it was
    /// not smashed.
    pub fn resurrect(&self) -> bool {
        let mut components = self.components.lock();
        let smashed = components
            .iter_mut()
            .find_map(DestructibleComponent::from_component_mut)
            .map(|d| {
                let was = d.is_smashed();
                d.mark_resurrected();
                was
            })
            .unwrap_or(false);
        if smashed {
            if let Some(stats) = components.iter_mut().find_map(StatsComponent::from_component_mut) {
                stats.restore_full();
            }
        }
        smashed
    }
}

impl fmt::Debug for GameObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameObject")
            .field("id", &self.id)
            .field("lot", &self.lot)
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Validating builder for [`GameObject`].
pub struct GameObjectBuilder {
    id: ObjectId,
    lot: u32,
    name: String,
    config: LdfDictionary,
    endpoint: Option<SocketAddr>,
    components: Vec<Component>,
}

impl GameObjectBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(mut self, config: LdfDictionary) -> Self {
        self.config = config;
        self
    }

    /// Marks the object as controlled by the client at `endpoint`.
    pub fn endpoint(mut self, endpoint: SocketAddr) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn component(mut self, component: impl Into<Component>) -> Self {
        self.components.push(component.into());
        self
    }

    pub fn components(mut self, components: impl IntoIterator<Item = Component>) -> Self {
        self.components.extend(components);
        self
    }

    /// Validates dependencies and orders components for construction.
    pub fn build(self) -> Result<Arc<GameObject>, ServerError> {
        let mut components = self.components;
        components.sort_by_key(|c| c.kind().order());

        let kinds: Vec<ComponentKind> = components.iter().map(Component::kind).collect();
        if let Some(pair) = kinds.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(ServerError::Configuration(format!(
                "object {} declares {} more than once",
                self.id,
                pair[0].name()
            )));
        }
        for kind in &kinds {
            if let Some(missing) = kind.dependencies().iter().find(|dep| !kinds.contains(dep)) {
                return Err(ServerError::DependencyViolation {
                    object: self.id,
                    component: kind.name(),
                    missing: missing.name(),
                });
            }
        }

        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        Ok(Arc::new(GameObject {
            id: self.id,
            lot: self.lot,
            name: self.name,
            created_at,
            config: self.config,
            endpoint: self.endpoint,
            components: Mutex::new(components.into_iter().collect()),
            listeners: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replica_codec::{BitReader, LdfValue, Vector3, WireValue};
    use std::sync::atomic::AtomicUsize;

    fn enemy(id: i64) -> Arc<GameObject> {
        GameObject::builder(ObjectId(id), 6010)
            .name("Stromling")
            .component(DestructibleComponent::default())
            .component(StatsComponent::new(8, 2, 0))
            .build()
            .unwrap()
    }

    #[test]
    fn missing_dependency_fails_the_object() {
        let result = GameObject::builder(ObjectId(1), 1)
            .component(DestructibleComponent::default())
            .build();
        match result {
            Err(ServerError::DependencyViolation { component, missing, .. }) => {
                assert_eq!(component, "Destructible");
                assert_eq!(missing, "Stats");
            }
            other => panic!("expected dependency violation, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_components_are_rejected() {
        let result = GameObject::builder(ObjectId(1), 1)
            .component(StatsComponent::new(1, 0, 0))
            .component(StatsComponent::new(2, 0, 0))
            .build();
        assert!(matches!(result, Err(ServerError::Configuration(_))));
    }

    #[test]
    fn components_are_ordered_by_dependency() {
        let object = enemy(1);
        assert_eq!(
            object.component_kinds(),
            vec![ComponentKind::Stats, ComponentKind::Destructible]
        );
    }

    #[test]
    fn listeners_fire_exactly_once() {
        let object = enemy(2);
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let calls = calls.clone();
            object.on_destroy(move |id| {
                assert_eq!(id, ObjectId(2));
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert!(object.destroy());
        assert!(!object.destroy());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(object.with::<StatsComponent, _>(|_| ()).is_none());

        // Late listeners still hear about it, once.
        let late = calls.clone();
        object.on_destroy(move |_| {
            late.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn destroying_an_owner_destroys_its_items() {
        let sword = GameObject::builder(ObjectId(10), 1500).build().unwrap();
        let player = GameObject::builder(ObjectId(11), 1)
            .component(InventoryComponent::default())
            .build()
            .unwrap();
        player.with::<InventoryComponent, _>(|inv| inv.add_item(sword.clone(), 1, 0));

        player.destroy();
        assert!(sword.is_destroyed());
    }

    #[test]
    fn destroyed_items_leave_the_inventory() {
        let potion = GameObject::builder(ObjectId(20), 1727).build().unwrap();
        let player = GameObject::builder(ObjectId(21), 1)
            .component(InventoryComponent::default())
            .build()
            .unwrap();
        player.with::<InventoryComponent, _>(|inv| inv.add_item(potion.clone(), 3, 0));
        assert_eq!(player.with::<InventoryComponent, _>(|inv| inv.len()), Some(1));

        potion.destroy();
        assert_eq!(player.with::<InventoryComponent, _>(|inv| inv.len()), Some(0));
    }

    #[test]
    fn smash_and_resurrect_round_trip_stats() {
        let object = enemy(3);
        assert!(object.smash(Some(ObjectId(99))).unwrap());
        assert!(!object.smash(None).unwrap());
        assert_eq!(object.with::<StatsComponent, _>(|s| s.health()), Some(0));
        assert_eq!(
            object.with::<DestructibleComponent, _>(|d| d.last_killer()),
            Some(Some(ObjectId(99)))
        );

        assert!(object.resurrect());
        assert_eq!(object.with::<StatsComponent, _>(|s| s.health()), Some(8));
        assert!(!object.resurrect());

        let plain = GameObject::builder(ObjectId(4), 1).build().unwrap();
        assert!(plain.smash(None).is_err());
    }

    #[test]
    fn construct_starts_with_the_header() {
        let mut config = LdfDictionary::new();
        config.insert("respawn", LdfValue::I32(5)).unwrap();
        let object = GameObject::builder(ObjectId(500), 6010)
            .name("Crate")
            .config(config.clone())
            .component(ControllablePhysicsComponent::new(Vector3::new(1.0, 0.0, -1.0)))
            .build()
            .unwrap();

        let mut writer = BitWriter::new();
        object.write_construct(&mut writer);
        let bytes = writer.into_bytes();
        let mut reader = BitReader::new(&bytes);
        let header = ConstructHeader::read_from(&mut reader).unwrap();
        assert_eq!(header.object_id, ObjectId(500));
        assert_eq!(header.name.as_str(), "Crate");
        assert_eq!(header.config, Some(config));

        let physics = components::PhysicsState::read_from(&mut reader).unwrap();
        assert_eq!(physics.position, Vector3::new(1.0, 0.0, -1.0));
    }
}
