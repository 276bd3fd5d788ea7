//! Object-addressed gameplay messages.

use std::sync::Arc;

use anyhow::Context as _;
use replica_codec::{ObjectId, WString};
use tracing::{debug, info};

use crate::context::HandlerContext;
use crate::messages::gameplay::{
    Die, DisplayChatMessage, EmotePlayed, ParseChatMessage, PlayEmote, RequestResurrect,
    RequestSmash, Resurrect,
};
use crate::registry::{HandlerGroup, RegistryBuilder};

pub struct GameplayGroup;

impl HandlerGroup for GameplayGroup {
    fn name(&self) -> &'static str {
        "gameplay"
    }

    fn register(self: Arc<Self>, builder: &mut RegistryBuilder) {
        builder
            .on::<RequestSmash, _>(request_smash)
            .on_background::<RequestResurrect, _>(request_resurrect)
            .on_background::<PlayEmote, _>(play_emote)
            .on::<ParseChatMessage, _>(parse_chat);
    }
}

fn request_smash(request: RequestSmash, ctx: HandlerContext) -> anyhow::Result<()> {
    let target = ctx.associate()?;
    let killer = match request.killer {
        ObjectId(0) => ctx.player().map(|p| p.id()).unwrap_or_default(),
        killer => killer,
    };
    if !target.smash(Some(killer))? {
        debug!("Object {} is already smashed", target.id());
        return Ok(());
    }
    info!("💥 Object {} smashed by {}", target.id(), killer);
    ctx.broadcast_game_message(
        target.id(),
        &Die {
            killer,
            spawn_loot: !target.is_player(),
        },
    )
}

fn request_resurrect(_request: RequestResurrect, ctx: HandlerContext) -> anyhow::Result<()> {
    let target = ctx.associate()?;
    if target.resurrect() {
        info!("✨ Object {} resurrected", target.id());
        ctx.broadcast_game_message(target.id(), &Resurrect { immediate: true })?;
    }
    Ok(())
}

fn play_emote(emote: PlayEmote, ctx: HandlerContext) -> anyhow::Result<()> {
    let source = ctx.associate()?;
    ctx.broadcast_game_message(
        source.id(),
        &EmotePlayed {
            emote_id: emote.emote_id,
            target: emote.target,
        },
    )
}

/// Runs chat commands; plain chat is relayed to the zone.
fn parse_chat(message: ParseChatMessage, ctx: HandlerContext) -> anyhow::Result<()> {
    let player = ctx.player()?;
    let session = ctx.session()?;
    let server = ctx.server();

    let text = message.text.as_str();
    match server
        .registry
        .commands()
        .execute_chat(text, &player, session.privilege(), server)
    {
        Some(reply) => {
            ctx.reply_game_message(player.id(), &DisplayChatMessage { text: WString(reply) });
            Ok(())
        }
        None => {
            let line = format!("{}: {}", player.name(), text);
            ctx.broadcast_game_message(player.id(), &DisplayChatMessage { text: WString(line) })
                .context("relaying chat")
        }
    }
}
