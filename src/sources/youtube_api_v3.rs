use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{validate, Platform, SearchHit, Track};
use crate::error::MusicError;

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoDetails {
    id: String,
    snippet: VideoSnippet,
    content_details: Option<ContentDetails>,
    statistics: Option<Statistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    title: String,
    channel_title: Option<String>,
    live_broadcast_content: Option<String>,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    medium: Option<Thumbnail>,
    high: Option<Thumbnail>,
}

#[derive(Debug, Deserialize, Clone)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    // La API devuelve los contadores como strings
    view_count: Option<String>,
}

impl VideoDetails {
    fn is_live(&self) -> bool {
        self.snippet.live_broadcast_content.as_deref() == Some("live")
    }

    fn views(&self) -> Option<u64> {
        self.statistics
            .as_ref()
            .and_then(|s| s.view_count.as_deref())
            .and_then(|v| v.parse().ok())
    }

    fn into_hit(self) -> SearchHit {
        SearchHit {
            url: validate::watch_url(&self.id),
            is_live: self.is_live(),
            views: self.views(),
            title: self.snippet.title,
        }
    }

    fn into_track(self) -> Track {
        let live = self.is_live();
        let duration = self
            .content_details
            .as_ref()
            .and_then(|c| parse_iso8601_duration(&c.duration));
        let thumbnail = self
            .snippet
            .thumbnails
            .high
            .clone()
            .or(self.snippet.thumbnails.medium.clone())
            .map(|t| t.url);

        let mut track = Track::new(self.snippet.title, validate::watch_url(&self.id), Platform::YouTube);

        match duration {
            _ if live => track = track.live(),
            Some(duration) => track = track.with_duration(duration),
            None => {}
        }
        if let Some(artist) = self.snippet.channel_title {
            track = track.with_artist(artist);
        }
        if let Some(thumb) = thumbnail {
            track = track.with_thumbnail(thumb);
        }
        track
    }
}

/// Cliente de la YouTube Data API v3, usado para búsquedas cuando hay API key
pub struct YouTubeApiClient {
    api_key: String,
    client: reqwest::Client,
}

impl YouTubeApiClient {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { api_key, client }
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, MusicError> {
        debug!("🔍 Búsqueda YouTube API v3: {}", query);

        let max_results = limit.to_string();
        let response = self
            .client
            .get(format!("{}/search", API_BASE))
            .query(&[
                ("part", "snippet"),
                ("q", query),
                ("type", "video"),
                ("maxResults", max_results.as_str()),
                ("key", self.api_key.as_str()),
                ("videoEmbeddable", "true"),
                ("order", "relevance"),
            ])
            .send()
            .await?;

        let body: SearchResponse = check_status(response).await?.json().await?;
        let ids: Vec<String> = body.items.into_iter().filter_map(|item| item.id.video_id).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // La búsqueda no trae vistas ni duración; se piden en una sola llamada
        let mut details = self.videos(&ids.join(",")).await?;
        details.sort_by_key(|video| ids.iter().position(|id| *id == video.id));

        let hits: Vec<SearchHit> = details.into_iter().map(VideoDetails::into_hit).collect();
        info!("✅ YouTube API v3: {} resultados", hits.len());
        Ok(hits)
    }

    pub async fn get_track(&self, url: &str) -> Result<Track, MusicError> {
        let video_id = validate::extract_video_id(url)
            .ok_or_else(|| MusicError::UnsupportedLink(url.to_string()))?;

        self.videos(&video_id)
            .await?
            .into_iter()
            .next()
            .map(VideoDetails::into_track)
            .ok_or_else(|| MusicError::NotFound(format!("Video no encontrado: {}", video_id)))
    }

    async fn videos(&self, ids: &str) -> Result<Vec<VideoDetails>, MusicError> {
        let response = self
            .client
            .get(format!("{}/videos", API_BASE))
            .query(&[
                ("part", "snippet,contentDetails,statistics"),
                ("id", ids),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let body: VideoListResponse = check_status(response).await?.json().await?;
        Ok(body.items)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, MusicError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response.text().await.unwrap_or_default();
    error!("❌ YouTube API error: {} - {}", status, error_text);
    Err(classify_api_error(status, &error_text))
}

fn classify_api_error(status: reqwest::StatusCode, body: &str) -> MusicError {
    match status.as_u16() {
        429 => MusicError::RateLimited,
        403 if body.contains("quotaExceeded") || body.contains("rateLimitExceeded") => {
            MusicError::RateLimited
        }
        404 => MusicError::NotFound("YouTube API".to_string()),
        500..=599 => MusicError::Transport(format!("YouTube API respondió {}", status)),
        _ => MusicError::Provider(format!("YouTube API error: {}", status)),
    }
}

/// Parsea duraciones ISO 8601 de la API (`PT1H2M3S`, `P1DT2H`)
pub fn parse_iso8601_duration(duration: &str) -> Option<Duration> {
    let rest = duration.strip_prefix('P')?;
    let mut seconds = 0u64;
    let mut current = String::new();
    let mut in_time = false;

    for ch in rest.chars() {
        match ch {
            'T' => in_time = true,
            _ if ch.is_ascii_digit() => current.push(ch),
            unit => {
                let value: u64 = current.parse().ok()?;
                current.clear();
                seconds += match (unit, in_time) {
                    ('D', false) => value * 86_400,
                    ('W', false) => value * 7 * 86_400,
                    ('H', true) => value * 3600,
                    ('M', true) => value * 60,
                    ('S', true) => value,
                    _ => return None,
                };
            }
        }
    }

    current.is_empty().then(|| Duration::from_secs(seconds))
}
