//! The closed set of components a game object can carry.
//!
//! Replicating components (`ControllablePhysics`, `Stats`, `Character`)
//! write a full construct once per observer and a dirty-flagged serialize on
//! every later tick. Server-only components (`Destructible`, `Inventory`)
//! never reach the wire.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use replica_codec::{codec, schema, BitWriter, ObjectId, Quaternion, Vector3, WString};
use serde::{Deserialize, Serialize};

use super::GameObject;

/// Discriminant of [`Component`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    ControllablePhysics,
    Stats,
    Destructible,
    Character,
    Inventory,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 5] = [
        ComponentKind::ControllablePhysics,
        ComponentKind::Stats,
        ComponentKind::Destructible,
        ComponentKind::Character,
        ComponentKind::Inventory,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ComponentKind::ControllablePhysics => "ControllablePhysics",
            ComponentKind::Stats => "Stats",
            ComponentKind::Destructible => "Destructible",
            ComponentKind::Character => "Character",
            ComponentKind::Inventory => "Inventory",
        }
    }

    /// Sibling components that must be present for this one to be built.
    pub fn dependencies(self) -> &'static [ComponentKind] {
        match self {
            ComponentKind::Destructible => &[ComponentKind::Stats],
            ComponentKind::Character => &[ComponentKind::ControllablePhysics],
            _ => &[],
        }
    }

    /// Position in construct and serialize order. Every dependency sorts
    /// before its dependents.
    pub fn order(self) -> u8 {
        match self {
            ComponentKind::ControllablePhysics => 0,
            ComponentKind::Stats => 1,
            ComponentKind::Destructible => 2,
            ComponentKind::Character => 3,
            ComponentKind::Inventory => 4,
        }
    }

    pub fn is_replicating(self) -> bool {
        matches!(
            self,
            ComponentKind::ControllablePhysics | ComponentKind::Stats | ComponentKind::Character
        )
    }

    /// A component of this kind with neutral starting state.
    pub fn default_component(self) -> Component {
        match self {
            ComponentKind::ControllablePhysics => {
                ControllablePhysicsComponent::new(Vector3::ZERO).into()
            }
            ComponentKind::Stats => StatsComponent::new(4, 0, 0).into(),
            ComponentKind::Destructible => DestructibleComponent::default().into(),
            ComponentKind::Character => CharacterComponent::new("", 1).into(),
            ComponentKind::Inventory => InventoryComponent::default().into(),
        }
    }
}

schema! {
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct PhysicsState {
        pub position: Vector3,
        pub rotation: Quaternion,
        pub on_ground: bool,
        pub velocity: Option<Vector3>,
        pub angular_velocity: Option<Vector3>,
    }
}

#[derive(Debug, Clone)]
pub struct ControllablePhysicsComponent {
    state: PhysicsState,
    dirty: bool,
}

impl ControllablePhysicsComponent {
    pub fn new(position: Vector3) -> Self {
        Self {
            state: PhysicsState {
                position,
                on_ground: true,
                ..Default::default()
            },
            dirty: false,
        }
    }

    pub fn state(&self) -> &PhysicsState {
        &self.state
    }

    pub fn position(&self) -> Vector3 {
        self.state.position
    }

    /// Replaces the movement state; marks the component dirty only when
    /// something changed.
    pub fn update(&mut self, state: PhysicsState) {
        if state != self.state {
            self.state = state;
            self.dirty = true;
        }
    }

    pub fn teleport(&mut self, position: Vector3) {
        self.state.position = position;
        self.state.velocity = None;
        self.dirty = true;
    }
}

schema! {
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct StatsState {
        pub health: u32,
        pub max_health: u32,
        pub armor: u32,
        pub max_armor: u32,
        pub imagination: u32,
        pub max_imagination: u32,
    }
}

#[derive(Debug, Clone)]
pub struct StatsComponent {
    state: StatsState,
    dirty: bool,
}

impl StatsComponent {
    pub fn new(max_health: u32, max_armor: u32, max_imagination: u32) -> Self {
        Self {
            state: StatsState {
                health: max_health,
                max_health,
                armor: max_armor,
                max_armor,
                imagination: max_imagination,
                max_imagination,
            },
            dirty: false,
        }
    }

    pub fn state(&self) -> &StatsState {
        &self.state
    }

    pub fn health(&self) -> u32 {
        self.state.health
    }

    pub fn is_dead(&self) -> bool {
        self.state.health == 0
    }

    /// Applies damage to armor first, then health. Returns remaining health.
    pub fn damage(&mut self, amount: u32) -> u32 {
        let absorbed = amount.min(self.state.armor);
        self.state.armor -= absorbed;
        self.state.health = self.state.health.saturating_sub(amount - absorbed);
        if amount > 0 {
            self.dirty = true;
        }
        self.state.health
    }

    pub fn heal(&mut self, amount: u32) -> u32 {
        let healed = self.state.health.saturating_add(amount).min(self.state.max_health);
        if healed != self.state.health {
            self.state.health = healed;
            self.dirty = true;
        }
        self.state.health
    }

    pub fn set_health(&mut self, health: u32) {
        let health = health.min(self.state.max_health);
        if health != self.state.health {
            self.state.health = health;
            self.dirty = true;
        }
    }

    pub fn set_max_health(&mut self, max_health: u32) {
        self.state.max_health = max_health;
        self.state.health = self.state.health.min(max_health);
        self.dirty = true;
    }

    pub fn restore_full(&mut self) {
        self.state.health = self.state.max_health;
        self.state.armor = self.state.max_armor;
        self.state.imagination = self.state.max_imagination;
        self.dirty = true;
    }
}

/// Server-side smash and respawn bookkeeping; requires `Stats`.
#[derive(Debug, Clone)]
pub struct DestructibleComponent {
    pub faction: i32,
    pub respawn_secs: u32,
    pub smashable: bool,
    smashed: bool,
    last_killer: Option<ObjectId>,
}

impl Default for DestructibleComponent {
    fn default() -> Self {
        Self {
            faction: -1,
            respawn_secs: 10,
            smashable: true,
            smashed: false,
            last_killer: None,
        }
    }
}

impl DestructibleComponent {
    pub fn is_smashed(&self) -> bool {
        self.smashed
    }

    pub fn last_killer(&self) -> Option<ObjectId> {
        self.last_killer
    }

    pub(crate) fn mark_smashed(&mut self, killer: Option<ObjectId>) {
        self.smashed = true;
        self.last_killer = killer;
    }

    pub(crate) fn mark_resurrected(&mut self) {
        self.smashed = false;
    }
}

schema! {
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct CharacterState {
        pub name: WString,
        pub level: u32,
        pub gm_level: u8 = 0,
    }
}

#[derive(Debug, Clone)]
pub struct CharacterComponent {
    state: CharacterState,
    dirty: bool,
}

impl CharacterComponent {
    pub fn new(name: &str, level: u32) -> Self {
        Self {
            state: CharacterState {
                name: WString::from(name),
                level,
                gm_level: 0,
            },
            dirty: false,
        }
    }

    /// Starting GM level, part of the construction state.
    pub fn with_gm_level(mut self, gm_level: u8) -> Self {
        self.state.gm_level = gm_level;
        self
    }

    pub fn state(&self) -> &CharacterState {
        &self.state
    }

    pub fn level(&self) -> u32 {
        self.state.level
    }

    pub fn set_level(&mut self, level: u32) {
        if level != self.state.level {
            self.state.level = level;
            self.dirty = true;
        }
    }

    pub fn gm_level(&self) -> u8 {
        self.state.gm_level
    }

    pub fn set_gm_level(&mut self, gm_level: u8) {
        if gm_level != self.state.gm_level {
            self.state.gm_level = gm_level;
            self.dirty = true;
        }
    }
}

/// An item object held in an inventory slot.
#[derive(Debug, Clone)]
pub struct InventoryItem {
    pub object: Arc<GameObject>,
    pub count: u32,
    pub slot: u32,
}

/// Server-only item container.
///
/// The item list sits behind its own lock so readers can snapshot it without
/// holding the owning object's component lock. Item objects that are
/// destroyed elsewhere remove themselves from the list.
#[derive(Debug, Clone, Default)]
pub struct InventoryComponent {
    items: Arc<Mutex<Vec<InventoryItem>>>,
}

impl InventoryComponent {
    /// Snapshot of the current items.
    pub fn items(&self) -> Vec<InventoryItem> {
        self.items.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Adds an item and ties its lifetime to the inventory entry.
    pub fn add_item(&self, object: Arc<GameObject>, count: u32, slot: u32) {
        let id = object.id();
        self.items.lock().push(InventoryItem {
            object: object.clone(),
            count,
            slot,
        });

        let items: Weak<Mutex<Vec<InventoryItem>>> = Arc::downgrade(&self.items);
        object.on_destroy(move |destroyed| {
            if let Some(items) = items.upgrade() {
                items.lock().retain(|item| item.object.id() != destroyed);
            }
        });
        tracing::trace!("🎒 Item {} added to slot {}", id, slot);
    }

    pub fn remove_item(&self, id: ObjectId) -> Option<InventoryItem> {
        let mut items = self.items.lock();
        let index = items.iter().position(|item| item.object.id() == id)?;
        Some(items.remove(index))
    }

    fn drain(&self) -> Vec<Arc<GameObject>> {
        self.items
            .lock()
            .drain(..)
            .map(|item| item.object)
            .collect()
    }
}

/// One component attached to a game object.
#[derive(Debug, Clone)]
pub enum Component {
    ControllablePhysics(ControllablePhysicsComponent),
    Stats(StatsComponent),
    Destructible(DestructibleComponent),
    Character(CharacterComponent),
    Inventory(InventoryComponent),
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Component::ControllablePhysics(_) => ComponentKind::ControllablePhysics,
            Component::Stats(_) => ComponentKind::Stats,
            Component::Destructible(_) => ComponentKind::Destructible,
            Component::Character(_) => ComponentKind::Character,
            Component::Inventory(_) => ComponentKind::Inventory,
        }
    }

    /// Writes the full state sent when an observer first sees the object.
    pub fn construct(&self, writer: &mut BitWriter) {
        match self {
            Component::ControllablePhysics(physics) => codec::encode_into(&physics.state, writer),
            Component::Stats(stats) => codec::encode_into(&stats.state, writer),
            Component::Character(character) => codec::encode_into(&character.state, writer),
            Component::Destructible(_) | Component::Inventory(_) => {}
        }
    }

    /// Writes the incremental update and clears the dirty flag.
    pub fn serialize(&mut self, writer: &mut BitWriter) {
        match self {
            Component::ControllablePhysics(physics) => {
                writer.write_bit(physics.dirty);
                if physics.dirty {
                    codec::encode_into(&physics.state, writer);
                    physics.dirty = false;
                }
            }
            Component::Stats(stats) => {
                writer.write_bit(stats.dirty);
                if stats.dirty {
                    codec::encode_into(&stats.state, writer);
                    stats.dirty = false;
                }
            }
            Component::Character(character) => {
                writer.write_bit(character.dirty);
                if character.dirty {
                    writer.write_u32(character.state.level);
                    writer.write_u8(character.state.gm_level);
                    character.dirty = false;
                }
            }
            Component::Destructible(_) | Component::Inventory(_) => {}
        }
    }

    pub fn is_dirty(&self) -> bool {
        match self {
            Component::ControllablePhysics(physics) => physics.dirty,
            Component::Stats(stats) => stats.dirty,
            Component::Character(character) => character.dirty,
            Component::Destructible(_) | Component::Inventory(_) => false,
        }
    }

    /// Tears the component down, returning owned objects that must be
    /// destroyed with it.
    pub(crate) fn release(self) -> Vec<Arc<GameObject>> {
        match self {
            Component::Inventory(inventory) => inventory.drain(),
            _ => Vec::new(),
        }
    }
}

/// Typed access to one variant of [`Component`].
pub trait ComponentVariant: Sized + 'static {
    const KIND: ComponentKind;

    fn from_component(component: &Component) -> Option<&Self>;

    fn from_component_mut(component: &mut Component) -> Option<&mut Self>;
}

macro_rules! component_variants {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl ComponentVariant for $ty {
                const KIND: ComponentKind = ComponentKind::$variant;

                fn from_component(component: &Component) -> Option<&Self> {
                    match component {
                        Component::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }

                fn from_component_mut(component: &mut Component) -> Option<&mut Self> {
                    match component {
                        Component::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for Component {
                fn from(inner: $ty) -> Self {
                    Component::$variant(inner)
                }
            }
        )*
    };
}

component_variants! {
    ControllablePhysics => ControllablePhysicsComponent,
    Stats => StatsComponent,
    Destructible => DestructibleComponent,
    Character => CharacterComponent,
    Inventory => InventoryComponent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use replica_codec::{BitReader, WireValue};

    #[test]
    fn dependencies_sort_before_dependents() {
        for kind in ComponentKind::ALL {
            for dependency in kind.dependencies() {
                assert!(dependency.order() < kind.order(), "{kind:?} after {dependency:?}");
            }
        }
    }

    #[test]
    fn armor_absorbs_damage_first() {
        let mut stats = StatsComponent::new(10, 3, 0);
        assert_eq!(stats.damage(5), 8);
        assert_eq!(stats.state().armor, 0);
        assert_eq!(stats.damage(100), 0);
        assert!(stats.is_dead());
        assert_eq!(stats.heal(50), 10);
    }

    #[test]
    fn serialize_clears_dirty_and_sends_one_bit_when_clean() {
        let mut component: Component = StatsComponent::new(10, 0, 0).into();
        let mut writer = BitWriter::new();
        component.serialize(&mut writer);
        assert_eq!(writer.bit_len(), 1);

        if let Component::Stats(stats) = &mut component {
            stats.damage(4);
        }
        assert!(component.is_dirty());

        let mut writer = BitWriter::new();
        component.serialize(&mut writer);
        assert!(!component.is_dirty());

        let bytes = writer.into_bytes();
        let mut reader = BitReader::new(&bytes);
        assert!(reader.read_bit().unwrap());
        let state = StatsState::read_from(&mut reader).unwrap();
        assert_eq!(state.health, 6);
    }

    #[test]
    fn gm_level_change_reaches_the_next_serialize() {
        let mut component: Component = CharacterComponent::new("Scout", 4).into();
        let mut writer = BitWriter::new();
        component.serialize(&mut writer);
        assert_eq!(writer.bit_len(), 1);

        if let Component::Character(character) = &mut component {
            character.set_gm_level(2);
            assert_eq!(character.gm_level(), 2);
        }
        assert!(component.is_dirty());

        let mut writer = BitWriter::new();
        component.serialize(&mut writer);
        let bytes = writer.into_bytes();
        let mut reader = BitReader::new(&bytes);
        assert!(reader.read_bit().unwrap());
        assert_eq!(reader.read_u32().unwrap(), 4);
        assert_eq!(reader.read_u8().unwrap(), 2);

        if let Component::Character(character) = &mut component {
            character.set_gm_level(2);
        }
        assert!(!component.is_dirty());
    }

    #[test]
    fn server_only_components_never_write() {
        let mut writer = BitWriter::new();
        let mut destructible: Component = DestructibleComponent::default().into();
        destructible.construct(&mut writer);
        destructible.serialize(&mut writer);
        Component::from(InventoryComponent::default()).construct(&mut writer);
        assert_eq!(writer.bit_len(), 0);
    }

    #[test]
    fn physics_update_only_dirties_on_change() {
        let mut physics = ControllablePhysicsComponent::new(Vector3::new(1.0, 2.0, 3.0));
        let same = physics.state().clone();
        physics.update(same);
        assert!(!physics.dirty);

        let mut moved = physics.state().clone();
        moved.position.x = 5.0;
        physics.update(moved);
        assert!(physics.dirty);
    }
}
