//! Built-in console and chat commands.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context as _};
use replica_codec::ObjectId;

use crate::context::ServerContext;
use crate::messages::connection::{disconnect_reason, DisconnectNotify};
use crate::messages::encode_game_message;
use crate::messages::gameplay::Die;
use crate::objects::{GameObject, StatsComponent};
use crate::registry::commands::DEFAULT_PREFIX;
use crate::registry::{HandlerGroup, RegistryBuilder};

/// Privilege needed for commands that change game state.
pub const GAME_MASTER: u8 = 2;

pub struct CommandGroup;

impl HandlerGroup for CommandGroup {
    fn name(&self) -> &'static str {
        "commands"
    }

    fn register(self: Arc<Self>, builder: &mut RegistryBuilder) {
        builder
            .chat_command(DEFAULT_PREFIX, "help", 0, "List the commands you can use", help)
            .console_command(DEFAULT_PREFIX, "zones", 0, "List configured and live zones", zones)
            .console_command(DEFAULT_PREFIX, "kick", 0, "kick <object id>: disconnect a player", kick)
            .chat_command(DEFAULT_PREFIX, "heal", GAME_MASTER, "heal [amount] [object id]: restore health", heal)
            .chat_command(DEFAULT_PREFIX, "smash", GAME_MASTER, "smash [object id]: smash an object", smash);
    }
}

fn help(_args: &[String], player: Option<&Arc<GameObject>>, ctx: &ServerContext) -> anyhow::Result<String> {
    let commands = ctx.registry.commands();
    let privilege = match player.and_then(|p| p.endpoint()) {
        Some(endpoint) => match ctx.sessions.get(&endpoint) {
            Some(session) => session.privilege(),
            None => 0,
        },
        None => u8::MAX,
    };
    Ok(commands.help_text(privilege, player.is_none()))
}

fn zones(_args: &[String], ctx: &ServerContext) -> anyhow::Result<String> {
    let mut lines = Vec::new();
    for zone_id in ctx.zones.configured_ids() {
        let line = match ctx.zones.zone(zone_id) {
            Some(zone) => format!(
                "{} {}: {} object(s), {} player(s), {} observer(s)",
                zone_id,
                zone.name(),
                zone.len(),
                zone.players().len(),
                zone.observers().len()
            ),
            None => format!("{zone_id}: not loaded"),
        };
        lines.push(line);
    }
    Ok(lines.join("\n"))
}

fn kick(args: &[String], ctx: &ServerContext) -> anyhow::Result<String> {
    let id = parse_object_id(args.first()).context("usage: kick <object id>")?;
    let player = ctx
        .find_player(id)
        .ok_or_else(|| anyhow!("no player with id {id}"))?;
    let endpoint = player
        .endpoint()
        .ok_or_else(|| anyhow!("player {id} has no endpoint"))?;

    ctx.send_message(
        endpoint,
        &DisconnectNotify {
            reason: disconnect_reason::KICKED,
        },
    );
    ctx.disconnect(endpoint, "kicked");
    Ok(format!("Kicked {} ({})", player.name(), id))
}

fn heal(args: &[String], player: Option<&Arc<GameObject>>, ctx: &ServerContext) -> anyhow::Result<String> {
    let amount = match args.first() {
        Some(amount) => Some(amount.parse::<u32>().context("amount must be a number")?),
        None => None,
    };
    let target = target(args.get(1), player, ctx)?;

    let health = target
        .with_mut::<StatsComponent, _>(|stats| match amount {
            Some(amount) => stats.heal(amount),
            None => {
                stats.restore_full();
                stats.health()
            }
        })
        .ok_or_else(|| anyhow!("object {} has no stats", target.id()))?;
    Ok(format!("{} now has {} health", target.id(), health))
}

fn smash(args: &[String], player: Option<&Arc<GameObject>>, ctx: &ServerContext) -> anyhow::Result<String> {
    let target = target(args.first(), player, ctx)?;
    if !target.smash(None)? {
        return Ok(format!("{} is already smashed", target.id()));
    }
    if let Some((zone, _)) = ctx.find_object(target.id()) {
        zone.broadcast(&encode_game_message(
            target.id(),
            &Die {
                killer: ObjectId(0),
                spawn_loot: false,
            },
        ));
    }
    Ok(format!("Smashed {}", target.id()))
}

/// Resolves an explicit object id argument, falling back to the caller.
fn target(
    arg: Option<&String>,
    player: Option<&Arc<GameObject>>,
    ctx: &ServerContext,
) -> anyhow::Result<Arc<GameObject>> {
    match (arg, player) {
        (Some(_), _) => {
            let id = parse_object_id(arg)?;
            ctx.find_object(id)
                .map(|(_, object)| object)
                .ok_or_else(|| anyhow!("no live object with id {id}"))
        }
        (None, Some(player)) => Ok(player.clone()),
        (None, None) => bail!("an object id is required on the console"),
    }
}

fn parse_object_id(arg: Option<&String>) -> anyhow::Result<ObjectId> {
    let arg = arg.ok_or_else(|| anyhow!("missing object id"))?;
    let id = arg
        .parse::<i64>()
        .with_context(|| format!("'{arg}' is not an object id"))?;
    Ok(ObjectId(id))
}
