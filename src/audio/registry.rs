//! Process-wide registry of playback sessions.
//!
//! Enforces at most one live [`PlaybackSession`] per guild. Every
//! check-and-create happens inside a single `DashMap` entry lock with no
//! suspension point, and every path that touches both maps takes the
//! registry entry first and the queue store second.

use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::oneshot, task::JoinSet};
use tracing::{debug, error, info, warn};

use super::{
    queue::GuildQueueStore,
    session::{ConnectResult, PlaybackSession, SessionHandle, SessionParts, SessionSettings, SessionState},
    voice::{SessionEvent, VoiceTransport},
};
use crate::{
    error::MusicError,
    sources::{ProviderGateway, Track},
};

/// Lo que hizo `ensure_session`
#[derive(Debug)]
pub enum EnsureOutcome {
    /// Se creó una sesión nueva; el receptor entrega el resultado de la conexión
    Created(oneshot::Receiver<ConnectResult>),
    /// Ya había una sesión viva y se le avisó del track nuevo
    Notified,
}

/// Resultado de encolar un track
#[derive(Debug)]
pub struct Submission {
    pub position: usize,
    /// Presente solo si este envío creó la sesión
    pub connected: Option<oneshot::Receiver<ConnectResult>>,
}

pub struct SessionRegistry {
    sessions: DashMap<GuildId, SessionHandle>,
    queues: Arc<GuildQueueStore>,
    gateway: Arc<ProviderGateway>,
    transport: Arc<dyn VoiceTransport>,
    settings: SessionSettings,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new(
        queues: Arc<GuildQueueStore>,
        gateway: Arc<ProviderGateway>,
        transport: Arc<dyn VoiceTransport>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            queues,
            gateway,
            transport,
            settings,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn queues(&self) -> &Arc<GuildQueueStore> {
        &self.queues
    }

    /// Encola el track y asegura la sesión bajo el mismo lock del guild
    pub fn submit(
        self: &Arc<Self>,
        guild_id: GuildId,
        channel_id: ChannelId,
        track: Track,
    ) -> Result<Submission, MusicError> {
        let entry = self.sessions.entry(guild_id);
        let position = self.queues.enqueue(guild_id, track)?;

        let connected = match self.ensure_locked(entry, guild_id, channel_id) {
            EnsureOutcome::Created(rx) => Some(rx),
            EnsureOutcome::Notified => None,
        };
        Ok(Submission { position, connected })
    }

    /// Crea la sesión del guild si no hay una viva; si la hay, le avisa que
    /// hay un track nuevo en la cola.
    pub fn ensure_session(self: &Arc<Self>, guild_id: GuildId, channel_id: ChannelId) -> EnsureOutcome {
        let entry = self.sessions.entry(guild_id);
        self.ensure_locked(entry, guild_id, channel_id)
    }

    fn ensure_locked(
        self: &Arc<Self>,
        entry: Entry<'_, GuildId, SessionHandle>,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> EnsureOutcome {
        let predecessor = match &entry {
            Entry::Occupied(existing) => {
                let handle = existing.get();
                if handle.is_live() && handle.notify(SessionEvent::TrackQueued) {
                    debug!("📨 Track nuevo notificado a la sesión {} de guild {}", handle.id, guild_id);
                    return EnsureOutcome::Notified;
                }
                Some(handle.subscribe())
            }
            Entry::Vacant(_) => None,
        };

        let (handle, connected) = self.spawn_session(guild_id, channel_id, predecessor);
        entry.insert(handle);
        EnsureOutcome::Created(connected)
    }

    fn spawn_session(
        self: &Arc<Self>,
        guild_id: GuildId,
        channel_id: ChannelId,
        predecessor: Option<tokio::sync::watch::Receiver<SessionState>>,
    ) -> (SessionHandle, oneshot::Receiver<ConnectResult>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (session, handle, connected) = PlaybackSession::new(SessionParts {
            guild_id,
            channel_id,
            id,
            registry: Arc::clone(self),
            queues: Arc::clone(&self.queues),
            gateway: Arc::clone(&self.gateway),
            transport: Arc::clone(&self.transport),
            settings: self.settings,
            predecessor,
        });

        info!("🆕 Sesión {} creada para guild {} (canal {})", id, guild_id, channel_id);
        let state = session.state_publisher();
        let task = tokio::spawn(session.run());

        // Supervisor: un pánico en la sesión no debe dejar el guild bloqueado
        // ni al bot dentro del canal
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!("💥 La sesión {} de guild {} terminó con pánico", id, guild_id);
                    registry.release(guild_id, id);
                    registry.leave_voice(guild_id).await;
                    state.send_replace(SessionState::Destroyed);
                }
            }
        });

        (handle, connected)
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions.get(&guild_id).map(|handle| handle.clone())
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Destruye la sesión del guild y elimina su cola. Idempotente.
    pub async fn destroy(&self, guild_id: GuildId) {
        let handle = match self.sessions.entry(guild_id) {
            Entry::Occupied(entry) => {
                self.queues.remove_guild(guild_id);
                entry.get().cancel();
                entry.get().clone()
            }
            Entry::Vacant(_) => {
                self.queues.remove_guild(guild_id);
                return;
            }
        };

        if !handle.wait_destroyed(self.destroy_wait()).await {
            warn!("⏱️ La sesión {} de guild {} no terminó a tiempo", handle.id, guild_id);
        }
        self.release(guild_id, handle.id);
    }

    /// Salida del bot del canal de voz (desconexión manual o expulsión)
    pub async fn bot_left_channel(&self, guild_id: GuildId) {
        let Some(handle) = self.get(guild_id) else {
            return;
        };

        if handle.state() == SessionState::Connecting {
            debug!("Ignorando salida del canal en guild {}: la sesión aún se está conectando", guild_id);
            return;
        }

        info!("👋 El bot salió del canal de voz en guild {}", guild_id);
        self.destroy(guild_id).await;
    }

    /// Retira la sesión por inactividad solo si la cola sigue vacía
    pub(crate) fn retire_if_idle(&self, guild_id: GuildId, id: u64) -> bool {
        let Some(handle) = self.sessions.get(&guild_id) else {
            return true;
        };
        if handle.id != id {
            return true;
        }
        if !self.queues.is_empty(guild_id) {
            return false;
        }
        handle.cancel();
        true
    }

    /// Elimina la entrada (y la cola) solo si todavía pertenece a la sesión `id`
    pub(crate) fn release(&self, guild_id: GuildId, id: u64) -> bool {
        match self.sessions.entry(guild_id) {
            Entry::Occupied(entry) if entry.get().id == id => {
                self.queues.remove_guild(guild_id);
                entry.remove();
                debug!("🧹 Sesión {} liberada en guild {}", id, guild_id);
                true
            }
            _ => false,
        }
    }

    /// Destruye todas las sesiones (apagado del proceso)
    pub async fn shutdown(self: &Arc<Self>) {
        let guilds: Vec<GuildId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        if guilds.is_empty() {
            return;
        }

        info!("🛑 Cerrando {} sesiones de voz", guilds.len());
        let mut tasks = JoinSet::new();
        for guild_id in guilds {
            let registry = Arc::clone(self);
            tasks.spawn(async move { registry.destroy(guild_id).await });
        }
        while tasks.join_next().await.is_some() {}
    }

    /// Salida del canal a nivel de transporte, acotada por `connect_timeout`
    pub(crate) async fn leave_voice(&self, guild_id: GuildId) {
        if tokio::time::timeout(self.settings.connect_timeout, self.transport.release(guild_id))
            .await
            .is_err()
        {
            warn!("⏱️ La salida del canal no terminó a tiempo en guild {}", guild_id);
        }
    }

    fn destroy_wait(&self) -> Duration {
        self.settings.connect_timeout * 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{settle, track, Harness};
    use pretty_assertions::assert_eq;

    const GUILD: GuildId = GuildId::new(1);
    const CHANNEL: ChannelId = ChannelId::new(10);

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submits_create_one_session() {
        let h = Harness::new();
        let mut tasks = JoinSet::new();

        for i in 0..16 {
            let registry = Arc::clone(&h.registry);
            tasks.spawn(async move {
                let id = format!("AAAAAAAAA{:02}", i);
                registry.submit(GUILD, CHANNEL, track(&id)).unwrap()
            });
        }

        let mut created = 0;
        let mut positions = Vec::new();
        while let Some(result) = tasks.join_next().await {
            let submission = result.unwrap();
            positions.push(submission.position);
            if submission.connected.is_some() {
                created += 1;
            }
        }
        positions.sort_unstable();

        assert_eq!(created, 1);
        assert_eq!(positions, (1..=16).collect::<Vec<_>>());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.voice.connects(), 1);
        assert_eq!(h.registry.active_sessions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn second_submit_notifies_existing_session() {
        let h = Harness::new();

        let first = h.registry.submit(GUILD, CHANNEL, track("AAAAAAAAAAA")).unwrap();
        let second = h.registry.submit(GUILD, CHANNEL, track("BBBBBBBBBBB")).unwrap();
        settle().await;

        assert!(first.connected.is_some());
        assert!(second.connected.is_none());
        assert_eq!(second.position, 2);
        assert!(matches!(
            h.registry.ensure_session(GUILD, CHANNEL),
            EnsureOutcome::Notified
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_destroys_release_once() {
        let h = Harness::new();
        h.registry.submit(GUILD, CHANNEL, track("AAAAAAAAAAA")).unwrap();
        h.registry.submit(GUILD, CHANNEL, track("BBBBBBBBBBB")).unwrap();
        settle().await;
        let handle = h.registry.get(GUILD).unwrap();

        tokio::join!(h.registry.destroy(GUILD), h.registry.destroy(GUILD));

        assert_eq!(handle.state(), SessionState::Destroyed);
        assert!(h.registry.get(GUILD).is_none());
        assert!(!h.queues.contains(GUILD));
        assert_eq!(h.voice.disconnects(), 1);

        // Destruir un guild sin sesión no hace nada
        h.registry.destroy(GUILD).await;
        assert_eq!(h.voice.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn guilds_do_not_share_sessions() {
        let h = Harness::new();
        let other = GuildId::new(2);

        h.registry.submit(GUILD, CHANNEL, track("AAAAAAAAAAA")).unwrap();
        h.registry.submit(other, ChannelId::new(20), track("BBBBBBBBBBB")).unwrap();
        settle().await;

        h.registry.destroy(GUILD).await;
        assert!(h.registry.get(GUILD).is_none());
        assert_eq!(h.registry.get(other).unwrap().state(), SessionState::Playing);
        assert_eq!(h.queues.len(other), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn bot_leaving_destroys_unless_connecting() {
        let h = Harness::gated();
        h.registry.submit(GUILD, CHANNEL, track("AAAAAAAAAAA")).unwrap();
        settle().await;

        h.registry.bot_left_channel(GUILD).await;
        assert_eq!(h.registry.get(GUILD).unwrap().state(), SessionState::Connecting);

        h.voice.open_gate();
        settle().await;
        h.registry.bot_left_channel(GUILD).await;
        assert!(h.registry.get(GUILD).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn submit_after_destroy_starts_fresh_session() {
        let h = Harness::new();
        h.registry.submit(GUILD, CHANNEL, track("AAAAAAAAAAA")).unwrap();
        settle().await;
        let old = h.registry.get(GUILD).unwrap();
        h.registry.destroy(GUILD).await;

        let submission = h.registry.submit(GUILD, CHANNEL, track("BBBBBBBBBBB")).unwrap();
        assert_eq!(submission.position, 1);
        assert_eq!(submission.connected.unwrap().await.unwrap(), Ok(()));
        settle().await;

        let new = h.registry.get(GUILD).unwrap();
        assert_ne!(old.id, new.id);
        assert_eq!(new.state(), SessionState::Playing);
        assert_eq!(h.voice.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_is_rejected_without_a_session() {
        let h = Harness::with_queue_size(1);
        h.registry.submit(GUILD, CHANNEL, track("AAAAAAAAAAA")).unwrap();

        let err = h.registry.submit(GUILD, CHANNEL, track("BBBBBBBBBBB")).unwrap_err();
        assert_eq!(err, MusicError::QueueFull(1));
        assert_eq!(h.registry.active_sessions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_session_is_released() {
        let h = Harness::new();
        h.voice.panic_on_play();

        h.registry.submit(GUILD, CHANNEL, track("AAAAAAAAAAA")).unwrap();
        settle().await;

        assert!(h.registry.get(GUILD).is_none());
        assert!(!h.queues.contains(GUILD));
        assert_eq!(h.voice.disconnects(), 1);

        // El guild vuelve a aceptar música
        h.voice.stop_panicking();
        let submission = h.registry.submit(GUILD, CHANNEL, track("BBBBBBBBBBB")).unwrap();
        assert!(submission.connected.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_destroys_everything() {
        let h = Harness::new();
        for guild in 1..=3 {
            h.registry
                .submit(GuildId::new(guild), ChannelId::new(guild * 10), track("AAAAAAAAAAA"))
                .unwrap();
        }
        settle().await;

        h.registry.shutdown().await;
        assert_eq!(h.registry.active_sessions(), 0);
        assert_eq!(h.voice.disconnects(), 3);
    }
}
