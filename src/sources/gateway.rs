//! Provider gateway: one entry point for resolving queries into tracks and
//! opening playable streams, with the shared retry policy and throttle applied
//! to every upstream call.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    deezer::DeezerClient,
    retry::{RetryPolicy, Throttle},
    spotify::SpotifyClient,
    validate::{self, LinkKind},
    youtube::YouTubeClient,
    youtube_api_v3::YouTubeApiClient,
    AudioStream, LinkResolver, MusicSource, Platform, SearchHit, Track,
};
use crate::{config::Config, error::MusicError};

pub struct ProviderGateway {
    catalog: Arc<dyn MusicSource>,
    resolvers: Vec<Arc<dyn LinkResolver>>,
    retry: RetryPolicy,
    throttle: Throttle,
    search_limit: usize,
}

impl ProviderGateway {
    pub fn new(catalog: Arc<dyn MusicSource>, retry: RetryPolicy, throttle: Throttle) -> Self {
        Self {
            catalog,
            resolvers: Vec::new(),
            retry,
            throttle,
            search_limit: 5,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn LinkResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit.max(1);
        self
    }

    /// Construye el gateway de producción: yt-dlp (con YouTube Data API si hay
    /// clave), Spotify y Deezer.
    pub fn from_config(config: &Config) -> Result<Self, MusicError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("mafia-music/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let api = config
            .youtube_api_key
            .clone()
            .map(|key| YouTubeApiClient::new(http.clone(), key));

        let youtube = YouTubeClient::new(
            config.ytdlp_path.clone(),
            config.ytdlp_cookies.clone(),
            http.clone(),
            api,
        );

        info!(
            "🎼 Gateway de proveedores: {} (búsqueda: {})",
            youtube.source_name(),
            youtube.search_backend()
        );

        Ok(Self::new(Arc::new(youtube), config.retry_policy(), config.throttle())
            .with_resolver(Arc::new(SpotifyClient::new(http.clone())))
            .with_resolver(Arc::new(DeezerClient::new(http)))
            .with_search_limit(config.search_limit))
    }

    /// Resuelve una consulta de `/play` a un [`Track`]
    pub async fn resolve(&self, query: &str) -> Result<Track, MusicError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MusicError::EmptyQuery);
        }

        match validate::classify(query) {
            LinkKind::YouTubeVideo(id) => self.lookup_video(&id).await,
            LinkKind::BareVideoId(id) => match self.lookup_video(&id).await {
                Err(MusicError::NotFound(_)) => {
                    debug!("🔎 '{}' no es un video ID válido, buscando como texto", id);
                    self.search_top(query).await
                }
                other => other,
            },
            LinkKind::YouTubePlaylist(id) => Err(MusicError::UnsupportedLink(format!(
                "las playlists no se pueden añadir a la cola ({})",
                id
            ))),
            LinkKind::Spotify(url) => self.lookup_link(Platform::Spotify, &url).await,
            LinkKind::Deezer(id) => {
                self.lookup_link(Platform::Deezer, &format!("https://www.deezer.com/track/{}", id))
                    .await
            }
            LinkKind::Unsupported(url) => Err(MusicError::UnsupportedLink(url)),
            LinkKind::Search(text) => self.search_top(&text).await,
        }
    }

    /// Obtiene un stream reproducible, reintentando el mismo track si el
    /// proveedor limita las peticiones
    pub async fn open_stream(&self, track: &Track) -> Result<AudioStream, MusicError> {
        let what = format!("stream de '{}'", track.title);
        let stream = self
            .retry
            .run(&what, &self.throttle, || self.catalog.open_stream(track))
            .await?;

        debug!("🎵 Stream listo para '{}' ({:?})", track.title, stream.container);
        Ok(stream)
    }

    async fn lookup_video(&self, id: &str) -> Result<Track, MusicError> {
        let url = validate::watch_url(id);
        self.retry
            .run("consulta de video", &self.throttle, || self.catalog.get_track(&url))
            .await
    }

    async fn lookup_link(&self, platform: Platform, url: &str) -> Result<Track, MusicError> {
        let resolver = self
            .resolvers
            .iter()
            .find(|r| r.platform() == platform)
            .ok_or_else(|| MusicError::UnsupportedLink(url.to_string()))?;

        let what = format!("consulta en {}", platform);
        self.retry
            .run(&what, &self.throttle, || resolver.lookup(url))
            .await
    }

    async fn search_top(&self, text: &str) -> Result<Track, MusicError> {
        info!("🔍 Buscando en {}: {}", self.catalog.source_name(), text);

        let hits = self
            .retry
            .run("búsqueda", &self.throttle, || self.catalog.search(text, self.search_limit))
            .await?;

        let Some(top) = rank_hits(hits).into_iter().next() else {
            return Err(MusicError::NotFound(text.to_string()));
        };

        debug!("🏆 Mejor resultado para '{}': {}", text, top.title);

        self.retry
            .run("consulta de video", &self.throttle, || self.catalog.get_track(&top.url))
            .await
            .map_err(|err| match err {
                MusicError::NotFound(_) => {
                    warn!("⚠️ El resultado '{}' ya no está disponible", top.title);
                    MusicError::NotFound(text.to_string())
                }
                other => other,
            })
    }
}

/// Descarta directos (si hay alternativas) y ordena por popularidad,
/// conservando el orden del proveedor en caso de empate.
fn rank_hits(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let (mut ranked, live): (Vec<_>, Vec<_>) = hits.into_iter().partition(|hit| !hit.is_live);
    if ranked.is_empty() {
        ranked = live;
    }
    ranked.sort_by(|a, b| b.views.unwrap_or(0).cmp(&a.views.unwrap_or(0)));
    ranked
}
