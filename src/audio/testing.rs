//! Fakes shared by the session, registry and service tests.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::watch;

use super::{
    queue::GuildQueueStore,
    registry::SessionRegistry,
    session::SessionSettings,
    voice::{EventSink, SessionEvent, VoiceConnection, VoiceTransport},
};
use crate::{
    error::MusicError,
    sources::{
        retry::{RetryPolicy, Throttle},
        validate, AudioStream, ContainerHint, MusicSource, Platform, ProviderGateway, SearchHit,
        Track,
    },
};

pub fn track(video_id: &str) -> Track {
    Track::new(format!("Track {}", video_id), validate::watch_url(video_id), Platform::YouTube)
}

/// Deja correr todas las tareas listas (con el reloj pausado, el runtime
/// solo avanza el tiempo cuando no queda trabajo pendiente)
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub struct Harness {
    pub registry: Arc<SessionRegistry>,
    pub queues: Arc<GuildQueueStore>,
    pub gateway: Arc<ProviderGateway>,
    pub voice: FakeVoice,
    pub source: FakeSource,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(FakeVoice::default(), 1000)
    }

    /// Las conexiones quedan en `Connecting` hasta `voice.open_gate()`
    pub fn gated() -> Self {
        Self::build(FakeVoice::gated(), 1000)
    }

    pub fn with_queue_size(max_size: usize) -> Self {
        Self::build(FakeVoice::default(), max_size)
    }

    fn build(voice: FakeVoice, max_size: usize) -> Self {
        let source = FakeSource::default();
        let gateway = Arc::new(ProviderGateway::new(
            Arc::new(source.clone()),
            RetryPolicy::default(),
            Throttle::disabled(),
        ));
        let queues = Arc::new(GuildQueueStore::new(max_size));
        let registry = Arc::new(SessionRegistry::new(
            Arc::clone(&queues),
            Arc::clone(&gateway),
            Arc::new(voice.clone()),
            SessionSettings::default(),
        ));

        Self {
            registry,
            queues,
            gateway,
            voice,
            source,
        }
    }
}

#[derive(Default)]
struct VoiceState {
    connects: usize,
    disconnects: usize,
    plays: Vec<(String, u64)>,
    sink: Option<EventSink>,
    fail_connects: bool,
    fail_plays: bool,
    panic_on_play: bool,
}

/// Transporte de voz en memoria que registra conexiones y reproducciones
#[derive(Clone)]
pub struct FakeVoice {
    state: Arc<Mutex<VoiceState>>,
    gate: Arc<watch::Sender<bool>>,
}

impl Default for FakeVoice {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            gate: Arc::new(watch::Sender::new(true)),
        }
    }
}

impl FakeVoice {
    pub fn gated() -> Self {
        Self {
            state: Arc::default(),
            gate: Arc::new(watch::Sender::new(false)),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut VoiceState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    pub fn fail_connects(&self) {
        self.with_state(|s| s.fail_connects = true);
    }

    pub fn fail_plays(&self) {
        self.with_state(|s| s.fail_plays = true);
    }

    pub fn panic_on_play(&self) {
        self.with_state(|s| s.panic_on_play = true);
    }

    pub fn stop_panicking(&self) {
        self.with_state(|s| s.panic_on_play = false);
    }

    pub fn connects(&self) -> usize {
        self.with_state(|s| s.connects)
    }

    /// Veces que el bot salió del canal, por la conexión o por el transporte
    pub fn disconnects(&self) -> usize {
        self.with_state(|s| s.disconnects)
    }

    pub fn played_urls(&self) -> Vec<String> {
        self.with_state(|s| s.plays.iter().map(|(url, _)| url.clone()).collect())
    }

    pub fn last_play_id(&self) -> Option<u64> {
        self.with_state(|s| s.plays.last().map(|(_, id)| *id))
    }

    /// Publica un evento como lo haría el driver de voz
    pub fn send(&self, event: SessionEvent) {
        let sink = self.with_state(|s| s.sink.clone());
        if let Some(sink) = sink {
            sink.send(event);
        }
    }

    pub fn end_current(&self) {
        if let Some(play_id) = self.last_play_id() {
            self.send(SessionEvent::TrackEnded { play_id });
        }
    }

    pub fn fail_current(&self, reason: &str) {
        if let Some(play_id) = self.last_play_id() {
            self.send(SessionEvent::TrackFailed {
                play_id,
                reason: reason.to_string(),
            });
        }
    }
}

#[async_trait]
impl VoiceTransport for FakeVoice {
    async fn connect(
        &self,
        _guild_id: GuildId,
        _channel_id: ChannelId,
        events: EventSink,
    ) -> Result<Box<dyn VoiceConnection>, MusicError> {
        let mut gate = self.gate.subscribe();
        // Un error solo significa que el sender se soltó; se trata como abierto
        let _ = gate.wait_for(|open| *open).await;

        self.with_state(|s| {
            s.connects += 1;
            if s.fail_connects {
                return Err(MusicError::Connection("canal lleno".to_string()));
            }
            s.sink = Some(events);
            Ok(())
        })?;

        Ok(Box::new(FakeConnection {
            voice: self.clone(),
        }))
    }

    async fn release(&self, _guild_id: GuildId) {
        self.with_state(|s| {
            s.sink = None;
            s.disconnects += 1;
        });
    }
}

struct FakeConnection {
    voice: FakeVoice,
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    async fn play(&mut self, stream: AudioStream, play_id: u64) -> Result<(), MusicError> {
        let (fail, panic) = self.voice.with_state(|s| (s.fail_plays, s.panic_on_play));
        if panic {
            panic!("fallo simulado del reproductor");
        }
        if fail {
            return Err(MusicError::Connection("sin conexión de voz activa".to_string()));
        }
        self.voice.with_state(|s| s.plays.push((stream.url, play_id)));
        Ok(())
    }

    async fn stop(&mut self) {}

    async fn disconnect(&mut self) {
        self.voice.with_state(|s| s.disconnects += 1);
    }
}

#[derive(Default)]
struct SourceState {
    unplayable: HashSet<String>,
    rate_limits_left: u32,
    stream_calls: u32,
}

/// Proveedor en memoria: todo video existe y se puede reproducir salvo que
/// se indique lo contrario
#[derive(Clone, Default)]
pub struct FakeSource {
    state: Arc<Mutex<SourceState>>,
}

impl FakeSource {
    pub fn mark_unplayable(&self, url: &str) {
        self.state.lock().unwrap().unplayable.insert(url.to_string());
    }

    /// Las próximas `times` aperturas de stream responden `RateLimited`
    pub fn rate_limit_times(&self, times: u32) {
        self.state.lock().unwrap().rate_limits_left = times;
    }

    pub fn stream_calls(&self) -> u32 {
        self.state.lock().unwrap().stream_calls
    }
}

#[async_trait]
impl MusicSource for FakeSource {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SearchHit>, MusicError> {
        Ok(Vec::new())
    }

    async fn get_track(&self, url: &str) -> Result<Track, MusicError> {
        match validate::extract_video_id(url) {
            Some(id) => Ok(track(&id)),
            None => Err(MusicError::NotFound(url.to_string())),
        }
    }

    async fn open_stream(&self, track: &Track) -> Result<AudioStream, MusicError> {
        let mut state = self.state.lock().unwrap();
        state.stream_calls += 1;

        if state.rate_limits_left > 0 {
            state.rate_limits_left -= 1;
            return Err(MusicError::RateLimited);
        }
        if state.unplayable.contains(&track.source_url) {
            return Err(MusicError::Stream("video no disponible".to_string()));
        }

        Ok(AudioStream {
            url: track.source_url.clone(),
            container: ContainerHint::WebmOpus,
        })
    }

    fn source_name(&self) -> &'static str {
        "Fake"
    }
}
