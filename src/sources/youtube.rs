use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::{
    validate, youtube_api_v3::YouTubeApiClient, AudioStream, ContainerHint, MusicSource,
    Platform, SearchHit, Track,
};
use crate::error::MusicError;

/// Cliente para YouTube basado en yt-dlp (búsqueda, metadata y URL de audio)
pub struct YouTubeClient {
    ytdlp: String,
    cookies: Option<PathBuf>,
    http: reqwest::Client,
    api: Option<YouTubeApiClient>,
    // Limitar procesos concurrentes de yt-dlp para evitar rate limiting
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp (`--dump-json`)
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    view_count: Option<u64>,
    is_live: Option<bool>,
    live_status: Option<String>,
}

impl YtDlpInfo {
    fn is_live(&self) -> bool {
        self.is_live.unwrap_or(false) || self.live_status.as_deref() == Some("is_live")
    }

    fn watch_url(&self) -> String {
        self.webpage_url
            .clone()
            .or_else(|| self.url.clone().filter(|u| u.starts_with("http")))
            .unwrap_or_else(|| validate::watch_url(&self.id))
    }

    fn into_hit(self) -> SearchHit {
        SearchHit {
            url: self.watch_url(),
            is_live: self.is_live(),
            views: self.view_count,
            title: self.title.unwrap_or_else(|| self.id.clone()),
        }
    }

    fn into_track(self) -> Track {
        let live = self.is_live();
        let url = self.watch_url();
        let mut track = Track::new(self.title.clone().unwrap_or_else(|| self.id.clone()), url, Platform::YouTube);

        if live {
            track = track.live();
        } else if let Some(duration) = self.duration {
            track = track.with_duration(Duration::from_secs_f64(duration.max(0.0)));
        }
        if let Some(thumbnail) = self.thumbnail {
            track = track.with_thumbnail(thumbnail);
        }
        if let Some(artist) = self.uploader.or(self.channel) {
            track = track.with_artist(artist);
        }
        track
    }
}

impl YouTubeClient {
    pub fn new(
        ytdlp: String,
        cookies: Option<PathBuf>,
        http: reqwest::Client,
        api: Option<YouTubeApiClient>,
    ) -> Self {
        Self {
            ytdlp,
            cookies,
            http,
            api,
            rate_limiter: Semaphore::new(3),
        }
    }

    pub fn search_backend(&self) -> &'static str {
        if self.api.is_some() {
            "YouTube Data API v3"
        } else {
            "yt-dlp"
        }
    }

    /// Ejecuta yt-dlp y devuelve stdout, clasificando los errores de stderr
    async fn run_ytdlp(&self, args: &[&str]) -> Result<String, MusicError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| MusicError::Provider(e.to_string()))?;

        let mut command = Command::new(&self.ytdlp);
        command.args(args).kill_on_drop(true);
        if let Some(cookies) = &self.cookies {
            command.arg("--cookies").arg(cookies);
        }

        let output = command
            .output()
            .await
            .map_err(|e| MusicError::Provider(format!("no se pudo ejecutar yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MusicError::from_ytdlp_stderr(&stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn search_ytdlp(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, MusicError> {
        let search_query = format!("ytsearch{}:{}", limit, query);
        let stdout = self
            .run_ytdlp(&[
                "--dump-json",
                "--flat-playlist",
                "--skip-download",
                "--no-warnings",
                &search_query,
            ])
            .await?;

        Ok(parse_search_output(&stdout))
    }

    /// Comprueba que la URL de audio responde antes de entregarla al reproductor
    async fn probe(&self, stream_url: &str) -> Result<ContainerHint, MusicError> {
        let response = self
            .http
            .get(stream_url)
            .header(reqwest::header::RANGE, "bytes=0-0")
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(MusicError::RateLimited);
        }
        if !status.is_success() {
            return Err(MusicError::Stream(format!("el stream respondió HTTP {}", status)));
        }

        let container = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ContainerHint::from_mime)
            .unwrap_or(ContainerHint::Unknown);

        Ok(container)
    }
}

#[async_trait]
impl MusicSource for YouTubeClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, MusicError> {
        match &self.api {
            Some(api) => api.search(query, limit).await,
            None => self.search_ytdlp(query, limit).await,
        }
    }

    async fn get_track(&self, url: &str) -> Result<Track, MusicError> {
        if let Some(api) = &self.api {
            return api.get_track(url).await;
        }

        debug!("📊 Obteniendo info de: {}", url);
        let stdout = self
            .run_ytdlp(&["--no-playlist", "--dump-json", "--skip-download", "--no-warnings", url])
            .await?;

        let info: YtDlpInfo = serde_json::from_str(stdout.trim())?;
        Ok(info.into_track())
    }

    async fn open_stream(&self, track: &Track) -> Result<AudioStream, MusicError> {
        let target = match track.platform {
            Platform::YouTube => track.source_url.clone(),
            // Spotify y Deezer se reproducen desde su equivalente en YouTube
            Platform::Spotify | Platform::Deezer => format!("ytsearch1:{}", track.mirror_query()),
        };

        debug!("🎵 Obteniendo URL de stream para: {}", target);
        let stdout = self
            .run_ytdlp(&[
                "--no-playlist",
                "-f",
                "bestaudio[acodec=opus]/bestaudio/best",
                "--get-url",
                "--no-warnings",
                &target,
            ])
            .await?;

        let stream_url = stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| MusicError::Stream("yt-dlp no devolvió URL de stream".to_string()))?
            .to_string();

        let container = self.probe(&stream_url).await?;
        info!("✅ Stream obtenido para '{}' ({:?})", track.title, container);

        Ok(AudioStream {
            url: stream_url,
            container,
        })
    }

    fn source_name(&self) -> &'static str {
        "YouTube"
    }
}

fn parse_search_output(stdout: &str) -> Vec<SearchHit> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<YtDlpInfo>(line).ok())
        .map(YtDlpInfo::into_hit)
        .collect()
}
