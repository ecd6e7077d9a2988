//! # Bot Module
//!
//! Discord gateway glue: slash command registration, interaction dispatch
//! and voice state tracking for the bot's own user.
//!
//! All music logic lives behind [`MusicService`]; this module only turns
//! Discord events into calls on it and renders the replies.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{config::Config, service::MusicService};

pub struct MusicBot {
    config: Arc<Config>,
    service: Arc<MusicService>,
}

impl MusicBot {
    pub fn new(config: Config, service: Arc<MusicService>) -> Self {
        Self {
            config: Arc::new(config),
            service,
        }
    }

    /// Registra `/play` en el guild de desarrollo o globalmente.
    ///
    /// Los comandos de guild se propagan en segundos; los globales pueden
    /// tardar hasta una hora.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("🌐 Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command, &self.service).await {
                error!("❌ Ocurrió un error al procesar el comando: {:?}", e);
            }
        }
    }

    /// Si alguien desconecta al bot del canal, la sesión del guild se cierra
    /// y su cola se descarta.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        if new.user_id != ctx.cache.current_user().id || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            let previous = old.and_then(|state| state.channel_id);
            info!(
                "🔌 Bot desconectado del canal {:?} en guild {}",
                previous, guild_id
            );
            self.service.registry().bot_left_channel(guild_id).await;
        }
    }
}
