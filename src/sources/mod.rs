//! # Sources Module
//!
//! Everything that talks to the outside world to find music:
//!
//! - [`validate`]: pure link/ID classification (no network)
//! - [`retry`]: the shared retry policy and request throttle
//! - [`gateway`]: the [`ProviderGateway`] used by the rest of the bot
//! - [`youtube`], [`youtube_api_v3`], [`spotify`], [`deezer`]: provider clients
//!
//! Provider clients implement [`MusicSource`] (search, lookup, stream) or the
//! narrower [`LinkResolver`] (lookup of a platform link only).

pub mod deezer;
pub mod gateway;
pub mod retry;
pub mod spotify;
pub mod validate;
pub mod youtube;
pub mod youtube_api_v3;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

use crate::error::MusicError;

pub use gateway::ProviderGateway;

/// Trait común para las fuentes que saben buscar y reproducir
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MusicSource: Send + Sync {
    /// Busca tracks en la fuente, en el orden de relevancia del proveedor
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, MusicError>;

    /// Obtiene información detallada de un track por URL
    async fn get_track(&self, url: &str) -> Result<Track, MusicError>;

    /// Obtiene una URL de audio reproducible para el track
    async fn open_stream(&self, track: &Track) -> Result<AudioStream, MusicError>;

    /// Nombre de la fuente
    fn source_name(&self) -> &'static str;
}

/// Fuentes que solo resuelven enlaces de su propia plataforma
#[async_trait]
pub trait LinkResolver: Send + Sync {
    fn platform(&self) -> Platform;

    async fn lookup(&self, url: &str) -> Result<Track, MusicError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    YouTube,
    Spotify,
    Deezer,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::YouTube => "YouTube",
            Platform::Spotify => "Spotify",
            Platform::Deezer => "Deezer",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Platform::YouTube => "▶️",
            Platform::Spotify => "🟢",
            Platform::Deezer => "🎧",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved, immutable track. Identity is `source_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    pub source_url: String,
    pub duration_label: String,
    pub platform: Platform,
    pub thumbnail: Option<String>,
    pub artist: Option<String>,
}

impl Track {
    pub fn new(title: impl Into<String>, source_url: impl Into<String>, platform: Platform) -> Self {
        Self {
            title: title.into(),
            source_url: source_url.into(),
            duration_label: UNKNOWN_DURATION.to_string(),
            platform,
            thumbnail: None,
            artist: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_label = format_duration(duration);
        self
    }

    pub fn live(mut self) -> Self {
        self.duration_label = LIVE_DURATION.to_string();
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    /// Términos para buscar el audio de un track que no es de YouTube
    pub fn mirror_query(&self) -> String {
        match &self.artist {
            Some(artist) => format!("{} - {}", artist, self.title),
            None => self.title.clone(),
        }
    }
}

/// Resultado de búsqueda antes de resolverlo a un [`Track`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub views: Option<u64>,
    pub is_live: bool,
}

/// Container format of a playable stream, as reported by the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerHint {
    WebmOpus,
    OggOpus,
    Mp4Aac,
    Mpeg,
    Unknown,
}

impl ContainerHint {
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.to_ascii_lowercase();
        if mime.starts_with("audio/webm") || mime.starts_with("video/webm") {
            ContainerHint::WebmOpus
        } else if mime.starts_with("audio/ogg") {
            ContainerHint::OggOpus
        } else if mime.starts_with("audio/mp4") || mime.starts_with("video/mp4") {
            ContainerHint::Mp4Aac
        } else if mime.starts_with("audio/mpeg") {
            ContainerHint::Mpeg
        } else {
            ContainerHint::Unknown
        }
    }
}

/// Stream de audio listo para entregar al reproductor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioStream {
    pub url: String,
    pub container: ContainerHint,
}

pub const UNKNOWN_DURATION: &str = "N/A";
pub const LIVE_DURATION: &str = "🔴 En vivo";

/// Formatea una duración como `m:ss` o `h:mm:ss`
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
