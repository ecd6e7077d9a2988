use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{error::ErrorKind, service::MusicService, ui::embeds};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    service: &MusicService,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return reply_ephemeral(ctx, &command, "❌ Este comando solo funciona dentro de un servidor").await;
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, guild_id, service).await?,
        _ => reply_ephemeral(ctx, &command, "❌ Comando no reconocido").await?,
    }

    Ok(())
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    service: &MusicService,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .unwrap_or_default();

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let voice_channel = user_voice_channel(ctx, guild_id, command.user.id);

    let response = match service
        .submit_track_request(guild_id, query, voice_channel)
        .await
    {
        Ok(queued) => EditInteractionResponse::new().embed(embeds::create_track_added_embed(&queued)),
        Err(e) => {
            if matches!(e.kind(), ErrorKind::UserInput | ErrorKind::NotFound) {
                info!("🔍 /play '{}' rechazado en guild {}: {}", query, guild_id, e);
            } else {
                warn!("⚠️ /play '{}' falló en guild {}: {}", query, guild_id, e);
            }
            EditInteractionResponse::new().content(embeds::error_message(&e))
        }
    };

    command.edit_response(&ctx.http, response).await?;
    Ok(())
}

/// Canal de voz del usuario según la caché del gateway
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id);
    channel_id
}

async fn reply_ephemeral(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}
