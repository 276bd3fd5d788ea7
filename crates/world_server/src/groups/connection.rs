//! Connection lifecycle: handshake, zone load, movement.

use std::sync::Arc;

use anyhow::Context as _;
use replica_codec::ObjectId;
use tracing::{info, warn};

use crate::context::HandlerContext;
use crate::messages::connection::{
    ClientLoadComplete, Handshake, PositionUpdate, PROTOCOL_VERSION, WORLD_SERVICE,
};
use crate::objects::components::PhysicsState;
use crate::objects::{
    CharacterComponent, ControllablePhysicsComponent, GameObject, InventoryComponent,
    StatsComponent,
};
use crate::persistence::CharacterRecord;
use crate::registry::{HandlerGroup, RegistryBuilder};

/// Template id of player objects.
pub const PLAYER_LOT: u32 = 1;

pub struct ConnectionGroup;

impl HandlerGroup for ConnectionGroup {
    fn name(&self) -> &'static str {
        "connection"
    }

    fn register(self: Arc<Self>, builder: &mut RegistryBuilder) {
        builder
            .on::<Handshake, _>(handshake)
            .on_async::<ClientLoadComplete, _, _>(load_complete)
            .on::<PositionUpdate, _>(position_update);
    }
}

fn handshake(request: Handshake, ctx: HandlerContext) -> anyhow::Result<()> {
    if request.version != PROTOCOL_VERSION {
        warn!(
            "🤝 {} speaks protocol {}, expected {}",
            ctx.endpoint(),
            request.version,
            PROTOCOL_VERSION
        );
    }
    ctx.reply(&Handshake {
        version: PROTOCOL_VERSION,
        reserved: 0,
        service: WORLD_SERVICE,
        process_id: std::process::id(),
        port: ctx.server().config.bind_address.port(),
    });
    Ok(())
}

/// Builds the player for a client that finished loading and starts
/// replicating its zone to it.
async fn load_complete(request: ClientLoadComplete, ctx: HandlerContext) -> anyhow::Result<()> {
    let session = ctx.session()?.clone();
    let server = ctx.server().clone();
    let zone = server.zones.get_or_create_zone(request.zone_id).await?;

    let record = server
        .store
        .load_character(request.character_id)
        .await?
        .unwrap_or_else(|| {
            let mut record = CharacterRecord::new(
                request.character_id,
                format!("Player{}", request.character_id),
                zone.id(),
            );
            record.position = zone.descriptor().spawn_point;
            record
        });
    let position = if record.zone_id == zone.id() {
        record.position()
    } else {
        zone.spawn_point()
    };

    let mut stats = StatsComponent::new(record.max_health, 0, 0);
    stats.set_health(record.health);
    let character =
        CharacterComponent::new(&record.name, record.level).with_gm_level(session.privilege());

    let player = GameObject::builder(request.character_id, PLAYER_LOT)
        .name(record.name.clone())
        .endpoint(ctx.endpoint())
        .component(ControllablePhysicsComponent::new(position))
        .component(stats)
        .component(character)
        .component(InventoryComponent::default())
        .build()?;

    for item in &record.inventory {
        let object = GameObject::builder(ObjectId(item.object_id), item.lot).build()?;
        player.with::<InventoryComponent, _>(|inventory| {
            inventory.add_item(object, item.count, item.slot)
        });
    }

    // Reloading the same character into the same zone frees its id first.
    let previous = session.player();
    if let Some(previous) = &previous {
        let reloading = previous.id() == player.id()
            && zone
                .find(previous.id())
                .is_some_and(|live| Arc::ptr_eq(&live, previous));
        if reloading {
            previous.destroy();
        }
    }
    zone.add(player.clone())
        .with_context(|| format!("{} cannot join zone {}", player.id(), zone.id()))?;

    if let Some(previous) = previous {
        previous.destroy();
    }
    if session.zone_id() != zone.id() {
        if let Some(old_zone) = server.zones.zone(session.zone_id()) {
            old_zone.remove_observer(ctx.endpoint());
        }
    }
    session.set_zone_id(zone.id());
    session.set_player(player.clone());
    zone.add_observer(ctx.endpoint());

    info!(
        "🎮 {} loaded into zone {} as player {} ({})",
        ctx.endpoint(),
        zone.id(),
        player.id(),
        player.name()
    );
    Ok(())
}

fn position_update(update: PositionUpdate, ctx: HandlerContext) -> anyhow::Result<()> {
    let player = ctx.player()?;
    player
        .with_mut::<ControllablePhysicsComponent, _>(|physics| {
            physics.update(PhysicsState {
                position: update.position,
                rotation: update.rotation,
                on_ground: update.on_ground,
                velocity: update.velocity,
                angular_velocity: update.angular_velocity,
            })
        })
        .with_context(|| format!("player {} has no physics", player.id()))
}
