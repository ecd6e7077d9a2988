//! # Error Module
//!
//! Domain error shared by the provider gateway, the playback sessions and the
//! command orchestrator. Library errors (`reqwest`, `serde_json`, yt-dlp exit
//! codes, songbird join/control errors) are converted into [`MusicError`] at the
//! component boundary and never travel further as raw errors.

use thiserror::Error;

/// Error taxonomy used across the core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MusicError {
    #[error("debes unirte a un canal de voz primero")]
    NoVoiceChannel,

    #[error("la búsqueda está vacía")]
    EmptyQuery,

    #[error("la cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    #[error("no se encontraron resultados para '{0}'")]
    NotFound(String),

    #[error("el proveedor está limitando las peticiones (429)")]
    RateLimited,

    #[error("enlace no soportado: {0}")]
    UnsupportedLink(String),

    #[error("error del proveedor: {0}")]
    Provider(String),

    #[error("error de red: {0}")]
    Transport(String),

    #[error("error de stream: {0}")]
    Stream(String),

    #[error("error de conexión de voz: {0}")]
    Connection(String),
}

/// Coarse classification used to decide how an error is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserInput,
    NotFound,
    RateLimited,
    Provider,
    Connection,
}

impl MusicError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MusicError::NoVoiceChannel | MusicError::EmptyQuery | MusicError::QueueFull(_) => {
                ErrorKind::UserInput
            }
            MusicError::NotFound(_) => ErrorKind::NotFound,
            MusicError::RateLimited => ErrorKind::RateLimited,
            MusicError::UnsupportedLink(_)
            | MusicError::Provider(_)
            | MusicError::Transport(_)
            | MusicError::Stream(_) => ErrorKind::Provider,
            MusicError::Connection(_) => ErrorKind::Connection,
        }
    }

    /// Clasifica la salida de error de yt-dlp.
    pub fn from_ytdlp_stderr(stderr: &str) -> Self {
        let lower = stderr.to_lowercase();

        if lower.contains("http error 429")
            || lower.contains("too many requests")
            || lower.contains("sign in to confirm you")
        {
            MusicError::RateLimited
        } else if lower.contains("video unavailable")
            || lower.contains("private video")
            || lower.contains("has been removed")
            || lower.contains("is not available")
        {
            MusicError::NotFound(first_line(stderr))
        } else if lower.contains("timed out") || lower.contains("connection reset") {
            MusicError::Transport(first_line(stderr))
        } else {
            MusicError::Provider(first_line(stderr))
        }
    }
}

impl From<reqwest::Error> for MusicError {
    fn from(err: reqwest::Error) -> Self {
        if err.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            MusicError::RateLimited
        } else if err.is_timeout() || err.is_connect() || err.is_request() {
            MusicError::Transport(err.to_string())
        } else {
            MusicError::Provider(err.to_string())
        }
    }
}

impl From<serde_json::Error> for MusicError {
    fn from(err: serde_json::Error) -> Self {
        MusicError::Provider(format!("respuesta mal formada: {}", err))
    }
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("error desconocido")
        .to_string()
}
