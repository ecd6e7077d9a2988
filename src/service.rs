//! Entry point used by the command layer: turn a `/play` query into a queued
//! track and make sure the guild has a session playing it.

use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::info;

use crate::{
    audio::SessionRegistry,
    error::MusicError,
    sources::{ProviderGateway, Track},
};

/// Track agregado y su posición en la cola (1 = sonando o a punto de sonar)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTrack {
    pub track: Track,
    pub position: usize,
}

pub struct MusicService {
    gateway: Arc<ProviderGateway>,
    registry: Arc<SessionRegistry>,
}

impl MusicService {
    pub fn new(gateway: Arc<ProviderGateway>, registry: Arc<SessionRegistry>) -> Self {
        Self { gateway, registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Resuelve la consulta, la encola y asegura la sesión del guild.
    ///
    /// Si esta petición creó la sesión, espera el resultado de la conexión
    /// de voz y lo devuelve como error si falló.
    pub async fn submit_track_request(
        &self,
        guild_id: GuildId,
        query: &str,
        voice_channel: Option<ChannelId>,
    ) -> Result<QueuedTrack, MusicError> {
        let channel_id = voice_channel.ok_or(MusicError::NoVoiceChannel)?;

        let track = self.gateway.resolve(query).await?;
        let submission = self.registry.submit(guild_id, channel_id, track.clone())?;

        if let Some(connected) = submission.connected {
            connected.await.map_err(|_| {
                MusicError::Connection("la sesión terminó antes de conectar".to_string())
            })??;
        }

        info!(
            "🎵 '{}' en posición {} de la cola de guild {}",
            track.title, submission.position, guild_id
        );
        Ok(QueuedTrack {
            track,
            position: submission.position,
        })
    }
}
