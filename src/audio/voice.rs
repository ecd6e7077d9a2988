//! Voice transport boundary.
//!
//! A [`PlaybackSession`](super::session::PlaybackSession) never talks to
//! songbird directly: it asks a [`VoiceTransport`] for a [`VoiceConnection`]
//! and receives everything the driver reports (track end, track error,
//! disconnects) as [`SessionEvent`] messages through an [`EventSink`].

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::mpsc;

use crate::{error::MusicError, sources::AudioStream};

/// Mensajes que consume la máquina de estados de una sesión
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Se agregó un track a la cola del guild
    TrackQueued,
    /// El track `play_id` terminó normalmente
    TrackEnded { play_id: u64 },
    /// El reproductor reportó un error en el track `play_id`
    TrackFailed { play_id: u64, reason: String },
    /// El driver de voz perdió la conexión
    Disconnected,
    /// El driver de voz se reconectó
    Reconnected,
}

/// Extremo de envío de la cola de eventos de una sesión
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { tx }
    }

    /// Publica un evento. Devuelve `false` si la sesión ya terminó.
    pub fn send(&self, event: SessionEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Crea conexiones de voz
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        events: EventSink,
    ) -> Result<Box<dyn VoiceConnection>, MusicError>;

    /// Sale del canal del guild sin pasar por una [`VoiceConnection`]: joins
    /// fallidos o cancelados y sesiones que terminaron con pánico.
    async fn release(&self, guild_id: GuildId);
}

/// Una conexión de voz activa con su reproductor
#[async_trait]
pub trait VoiceConnection: Send {
    /// Reemplaza lo que esté sonando por `stream`. Los eventos de este track
    /// llegan etiquetados con `play_id`.
    async fn play(&mut self, stream: AudioStream, play_id: u64) -> Result<(), MusicError>;

    async fn stop(&mut self);

    async fn disconnect(&mut self);
}
