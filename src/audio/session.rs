//! Per-guild playback session.
//!
//! A session is a single tokio task that owns the guild's voice connection and
//! runs the `Connecting → Playing ⇄ Idle → Destroyed` state machine. Everything
//! that happens to it (a track was queued, the player finished or failed a
//! track, the voice driver dropped or came back) arrives as a
//! [`SessionEvent`] on its own channel, so the transitions are driven from one
//! place and can be exercised with a fake transport.

use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    queue::GuildQueueStore,
    registry::SessionRegistry,
    voice::{EventSink, SessionEvent, VoiceConnection, VoiceTransport},
};
use crate::{error::MusicError, sources::ProviderGateway};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Playing,
    Idle,
    Destroyed,
}

/// Tiempos que gobiernan el ciclo de vida de una sesión
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub idle_timeout: Duration,
    pub reconnect_grace: Duration,
    pub connect_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            reconnect_grace: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(20),
        }
    }
}

/// Por qué terminó una sesión
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    /// `destroy` explícito, retiro por inactividad o apagado
    Cancelled,
    ConnectFailed,
    ConnectionLost,
    IdleTimeout,
}

/// Resultado de la conexión inicial, entregado a quien creó la sesión
pub type ConnectResult = Result<(), MusicError>;

/// Referencia a una sesión viva, guardada en el [`SessionRegistry`]
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: u64,
    pub channel_id: ChannelId,
    events: EventSink,
    state: watch::Receiver<SessionState>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Una sesión cancelada o terminada ya no acepta tracks nuevos
    pub fn is_live(&self) -> bool {
        !self.cancel.is_cancelled()
            && self.state() != SessionState::Destroyed
            && !self.events.is_closed()
    }

    pub fn notify(&self, event: SessionEvent) -> bool {
        self.events.send(event)
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Espera (acotado) a que la sesión publique `Destroyed`. Devuelve `true`
    /// si terminó a tiempo o si su tarea ya no existe.
    pub async fn wait_destroyed(&self, limit: Duration) -> bool {
        wait_for_destroyed(self.subscribe(), limit).await
    }
}

pub(crate) async fn wait_for_destroyed(mut state: watch::Receiver<SessionState>, limit: Duration) -> bool {
    // Un canal cerrado significa que la tarea y su supervisor ya no existen
    !matches!(
        tokio::time::timeout(limit, state.wait_for(|s| *s == SessionState::Destroyed)).await,
        Err(_)
    )
}

pub(crate) struct SessionParts {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub id: u64,
    pub registry: Arc<SessionRegistry>,
    pub queues: Arc<GuildQueueStore>,
    pub gateway: Arc<ProviderGateway>,
    pub transport: Arc<dyn VoiceTransport>,
    pub settings: SessionSettings,
    /// Estado de la sesión anterior del guild, si todavía se está cerrando
    pub predecessor: Option<watch::Receiver<SessionState>>,
}

pub(crate) struct PlaybackSession {
    guild_id: GuildId,
    channel_id: ChannelId,
    id: u64,
    registry: Arc<SessionRegistry>,
    queues: Arc<GuildQueueStore>,
    gateway: Arc<ProviderGateway>,
    transport: Arc<dyn VoiceTransport>,
    settings: SessionSettings,
    predecessor: Option<watch::Receiver<SessionState>>,

    sink: EventSink,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    state: Arc<watch::Sender<SessionState>>,
    cancel: CancellationToken,
    connected: Option<oneshot::Sender<ConnectResult>>,

    connection: Option<Box<dyn VoiceConnection>>,
    current_play: Option<u64>,
    next_play_id: u64,
    idle_deadline: Option<Instant>,
    reconnect_deadline: Option<Instant>,
}

impl PlaybackSession {
    /// Construye la sesión en estado `Connecting` junto con su handle y el
    /// receptor del resultado de conexión.
    pub(crate) fn new(parts: SessionParts) -> (Self, SessionHandle, oneshot::Receiver<ConnectResult>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        let (connected_tx, connected_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let sink = EventSink::new(events_tx);

        let handle = SessionHandle {
            id: parts.id,
            channel_id: parts.channel_id,
            events: sink.clone(),
            state: state_rx,
            cancel: cancel.clone(),
        };

        let session = Self {
            guild_id: parts.guild_id,
            channel_id: parts.channel_id,
            id: parts.id,
            registry: parts.registry,
            queues: parts.queues,
            gateway: parts.gateway,
            transport: parts.transport,
            settings: parts.settings,
            predecessor: parts.predecessor,
            sink,
            events: events_rx,
            state: Arc::new(state_tx),
            cancel,
            connected: Some(connected_tx),
            connection: None,
            current_play: None,
            next_play_id: 0,
            idle_deadline: None,
            reconnect_deadline: None,
        };

        (session, handle, connected_rx)
    }

    /// Emisor del estado, para que el supervisor publique `Destroyed` si la
    /// tarea muere sin llegar a `teardown`
    pub(crate) fn state_publisher(&self) -> Arc<watch::Sender<SessionState>> {
        Arc::clone(&self.state)
    }

    pub(crate) async fn run(mut self) {
        let cancel = self.cancel.clone();
        let reason = tokio::select! {
            biased;
            _ = cancel.cancelled() => TeardownReason::Cancelled,
            reason = self.drive() => reason,
        };
        self.teardown(reason).await;
    }

    async fn drive(&mut self) -> TeardownReason {
        if let Some(previous) = self.predecessor.take() {
            // songbird comparte el Call del guild: esperar a que la sesión anterior lo suelte
            debug!("⏳ Esperando cierre de la sesión anterior en guild {}", self.guild_id);
            wait_for_destroyed(previous, self.settings.connect_timeout).await;
        }

        if let Err(e) = self.connect().await {
            error!("❌ No se pudo conectar al canal de voz en guild {}: {}", self.guild_id, e);
            self.report_connect(Err(e));
            return TeardownReason::ConnectFailed;
        }
        self.report_connect(Ok(()));

        if let Err(reason) = self.play_head().await {
            return reason;
        }

        loop {
            tokio::select! {
                event = self.events.recv() => {
                    // El propio sink mantiene el canal abierto; `None` no debería ocurrir
                    let Some(event) = event else {
                        return TeardownReason::ConnectionLost;
                    };
                    if let Err(reason) = self.handle_event(event).await {
                        return reason;
                    }
                }
                _ = wait_until(self.idle_deadline) => {
                    self.idle_deadline = None;
                    if self.registry.retire_if_idle(self.guild_id, self.id) {
                        info!("💤 Sin música durante {:?} en guild {}, saliendo del canal",
                            self.settings.idle_timeout, self.guild_id);
                        return TeardownReason::IdleTimeout;
                    }
                    if let Err(reason) = self.play_head().await {
                        return reason;
                    }
                }
                _ = wait_until(self.reconnect_deadline) => {
                    warn!("🔌 La conexión de voz no volvió en guild {}", self.guild_id);
                    return TeardownReason::ConnectionLost;
                }
            }
        }
    }

    async fn connect(&mut self) -> Result<(), MusicError> {
        let connect = self
            .transport
            .connect(self.guild_id, self.channel_id, self.sink.clone());

        let connection = tokio::time::timeout(self.settings.connect_timeout, connect)
            .await
            .map_err(|_| MusicError::Connection("tiempo de conexión agotado".to_string()))??;

        self.connection = Some(connection);
        Ok(())
    }

    fn report_connect(&mut self, result: ConnectResult) {
        if let Some(tx) = self.connected.take() {
            // Quien pidió la sesión puede haberse ido
            let _ = tx.send(result);
        }
    }

    async fn handle_event(&mut self, event: SessionEvent) -> Result<(), TeardownReason> {
        match event {
            SessionEvent::TrackQueued => {
                if self.current_state() == SessionState::Idle {
                    self.play_head().await?;
                }
            }
            SessionEvent::TrackEnded { play_id } => {
                if self.current_play != Some(play_id) {
                    debug!("Fin de un track anterior ({}) ignorado en guild {}", play_id, self.guild_id);
                    return Ok(());
                }
                self.finish_current();
                self.play_head().await?;
            }
            SessionEvent::TrackFailed { play_id, reason } => {
                if self.current_play != Some(play_id) {
                    debug!("Error de un track anterior ({}) ignorado en guild {}", play_id, self.guild_id);
                    return Ok(());
                }
                warn!("❌ El reproductor falló en guild {}: {}, saltando", self.guild_id, reason);
                self.finish_current();
                self.play_head().await?;
            }
            SessionEvent::Disconnected => {
                if self.reconnect_deadline.is_none() {
                    warn!(
                        "🔌 Conexión de voz perdida en guild {}, esperando {:?}",
                        self.guild_id, self.settings.reconnect_grace
                    );
                    self.reconnect_deadline = Some(Instant::now() + self.settings.reconnect_grace);
                }
            }
            SessionEvent::Reconnected => {
                if self.reconnect_deadline.take().is_some() {
                    info!("🔄 Conexión de voz recuperada en guild {}", self.guild_id);
                }
            }
        }
        Ok(())
    }

    fn finish_current(&mut self) {
        self.current_play = None;
        self.queues.pop_head(self.guild_id);
    }

    /// Intenta reproducir la cabeza de la cola, saltando los tracks que no se
    /// pueden abrir. Con la cola vacía pasa a `Idle`.
    async fn play_head(&mut self) -> Result<(), TeardownReason> {
        self.idle_deadline = None;

        loop {
            let Some(track) = self.queues.peek_head(self.guild_id) else {
                self.enter_idle();
                return Ok(());
            };

            let stream = match self.gateway.open_stream(&track).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("⚠️ No se pudo reproducir '{}': {}, saltando", track.title, e);
                    self.queues.pop_head(self.guild_id);
                    continue;
                }
            };

            self.next_play_id += 1;
            let play_id = self.next_play_id;

            let Some(connection) = self.connection.as_mut() else {
                return Err(TeardownReason::ConnectionLost);
            };
            if let Err(e) = connection.play(stream, play_id).await {
                error!("❌ Error al iniciar reproducción en guild {}: {}", self.guild_id, e);
                return Err(TeardownReason::ConnectionLost);
            }

            info!("🎵 Reproduciendo en guild {}: {}", self.guild_id, track.title);
            self.current_play = Some(play_id);
            self.set_state(SessionState::Playing);
            return Ok(());
        }
    }

    fn enter_idle(&mut self) {
        self.current_play = None;
        self.idle_deadline = Some(Instant::now() + self.settings.idle_timeout);
        if self.current_state() != SessionState::Idle {
            debug!("💤 Cola vacía en guild {}", self.guild_id);
            self.set_state(SessionState::Idle);
        }
    }

    fn current_state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    async fn teardown(&mut self, reason: TeardownReason) {
        if self.current_state() == SessionState::Destroyed {
            return;
        }
        // A partir de aquí el registry ya no envía tracks a esta sesión
        self.cancel.cancel();
        self.report_connect(Err(MusicError::Connection(format!("sesión cerrada ({:?})", reason))));

        match self.connection.take() {
            Some(mut connection) => {
                connection.stop().await;
                if tokio::time::timeout(self.settings.connect_timeout, connection.disconnect())
                    .await
                    .is_err()
                {
                    warn!("⏱️ La desconexión de voz no terminó a tiempo en guild {}", self.guild_id);
                }
            }
            // Join fallido, agotado o cancelado: el transporte puede haber quedado a medias
            None => self.registry.leave_voice(self.guild_id).await,
        }

        self.registry.release(self.guild_id, self.id);
        self.current_play = None;
        self.set_state(SessionState::Destroyed);
        info!("🛑 Sesión {} de guild {} destruida ({:?})", self.id, self.guild_id, reason);
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
