use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    events::CoreEvent,
    input::{HttpRequest, Input},
    tracks::PlayMode,
    Call, Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler, Songbird,
    TrackEvent,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::voice::{EventSink, SessionEvent, VoiceConnection, VoiceTransport};
use crate::{error::MusicError, sources::AudioStream};

/// Transporte de voz real sobre songbird
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client) -> Self {
        Self { manager, http }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        events: EventSink,
    ) -> Result<Box<dyn VoiceConnection>, MusicError> {
        info!("🔗 Conectando al canal {} en guild {}", channel_id, guild_id);

        let call = match self.manager.join(guild_id, channel_id).await {
            Ok(call) => call,
            Err(e) => {
                error!("❌ Error al unirse al canal en guild {}: {:?}", guild_id, e);
                // songbird conserva el Call (y quizá ya envió el join) aunque falle
                self.release(guild_id).await;
                return Err(MusicError::Connection(e.to_string()));
            }
        };

        {
            let mut call_lock = call.lock().await;
            // songbird reutiliza el Call del guild: quitar handlers de sesiones anteriores
            call_lock.remove_all_global_events();
            register_driver_events(&mut call_lock, guild_id, &events);
        }

        info!("✅ Conectado al canal {} en guild {}", channel_id, guild_id);
        Ok(Box::new(SongbirdConnection {
            guild_id,
            call,
            manager: Arc::clone(&self.manager),
            http: self.http.clone(),
            events,
        }))
    }

    async fn release(&self, guild_id: GuildId) {
        if let Some(call) = self.manager.get(guild_id) {
            call.lock().await.remove_all_global_events();
        }
        leave(&self.manager, guild_id).await;
    }
}

struct SongbirdConnection {
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
    manager: Arc<Songbird>,
    http: reqwest::Client,
    events: EventSink,
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn play(&mut self, stream: AudioStream, play_id: u64) -> Result<(), MusicError> {
        let mut call = self.call.lock().await;
        if call.current_connection().is_none() {
            return Err(MusicError::Connection("sin conexión de voz activa".to_string()));
        }

        debug!("🎵 Reproduciendo stream {:?} (play {}) en guild {}", stream.container, play_id, self.guild_id);
        call.stop();
        let input: Input = HttpRequest::new(self.http.clone(), stream.url).into();
        let track_handle = call.play_input(input);

        track_handle
            .add_event(
                VoiceEvent::Track(TrackEvent::End),
                TrackEndNotifier {
                    guild_id: self.guild_id,
                    play_id,
                    events: self.events.clone(),
                },
            )
            .map_err(|e| MusicError::Connection(format!("Error al agregar event handler: {}", e)))?;

        track_handle
            .add_event(
                VoiceEvent::Track(TrackEvent::Error),
                TrackErrorNotifier {
                    guild_id: self.guild_id,
                    play_id,
                    events: self.events.clone(),
                },
            )
            .map_err(|e| MusicError::Connection(format!("Error al agregar event handler: {}", e)))?;

        Ok(())
    }

    async fn stop(&mut self) {
        self.call.lock().await.stop();
    }

    async fn disconnect(&mut self) {
        // Soltar el lock del Call antes de `remove`, que también lo toma
        self.call.lock().await.remove_all_global_events();

        leave(&self.manager, self.guild_id).await;
    }
}

async fn leave(manager: &Songbird, guild_id: GuildId) {
    match manager.remove(guild_id).await {
        Ok(()) => info!("👋 Desconectado del canal de voz en guild {}", guild_id),
        Err(e) => debug!("Desconexión en guild {}: {:?}", guild_id, e),
    }
}

fn register_driver_events(call: &mut Call, guild_id: GuildId, events: &EventSink) {
    call.add_global_event(
        VoiceEvent::Core(CoreEvent::DriverDisconnect),
        DriverNotifier {
            guild_id,
            event: SessionEvent::Disconnected,
            events: events.clone(),
        },
    );

    call.add_global_event(
        VoiceEvent::Core(CoreEvent::DriverReconnect),
        DriverNotifier {
            guild_id,
            event: SessionEvent::Reconnected,
            events: events.clone(),
        },
    );
}

/// Reenvía el fin de un track a la sesión
struct TrackEndNotifier {
    guild_id: GuildId,
    play_id: u64,
    events: EventSink,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        debug!("🎵 Track {} terminó en guild {}", self.play_id, self.guild_id);

        if !self.events.send(SessionEvent::TrackEnded { play_id: self.play_id }) {
            return Some(VoiceEvent::Cancel);
        }
        None
    }
}

/// Reenvía los errores del reproductor a la sesión
struct TrackErrorNotifier {
    guild_id: GuildId,
    play_id: u64,
    events: EventSink,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        let mut reason = "error de reproducción".to_string();
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                if let PlayMode::Errored(e) = &state.playing {
                    reason = format!("{:?}", e);
                }
            }
        }
        warn!("❌ Error en track {} para guild {}: {}", self.play_id, self.guild_id, reason);

        let event = SessionEvent::TrackFailed {
            play_id: self.play_id,
            reason,
        };
        if !self.events.send(event) {
            return Some(VoiceEvent::Cancel);
        }
        None
    }
}

/// Handler para desconexiones y reconexiones del driver de voz
struct DriverNotifier {
    guild_id: GuildId,
    event: SessionEvent,
    events: EventSink,
}

#[async_trait]
impl VoiceEventHandler for DriverNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        match self.event {
            SessionEvent::Disconnected => warn!("🔌 Driver de voz desconectado en guild {}", self.guild_id),
            _ => info!("🔄 Driver de voz reconectado en guild {}", self.guild_id),
        }

        if !self.events.send(self.event.clone()) {
            return Some(VoiceEvent::Cancel);
        }
        None
    }
}
