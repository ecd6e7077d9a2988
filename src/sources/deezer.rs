use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{validate, LinkResolver, Platform, Track};
use crate::error::MusicError;

const API_BASE: &str = "https://api.deezer.com";

/// Deezer responde 200 incluso en errores, con un objeto `error`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TrackResponse {
    Error { error: ApiError },
    Track(DeezerTrack),
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct DeezerTrack {
    title: String,
    link: String,
    duration: Option<u64>,
    artist: Option<Artist>,
    album: Option<Album>,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Album {
    cover_medium: Option<String>,
}

/// Resuelve enlaces de tracks de Deezer con su API pública
pub struct DeezerClient {
    client: reqwest::Client,
}

impl DeezerClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LinkResolver for DeezerClient {
    fn platform(&self) -> Platform {
        Platform::Deezer
    }

    async fn lookup(&self, url: &str) -> Result<Track, MusicError> {
        let id = match validate::classify(url) {
            validate::LinkKind::Deezer(id) => id,
            _ => return Err(MusicError::UnsupportedLink(url.to_string())),
        };
        debug!("🎧 Resolviendo track de Deezer: {}", id);

        let response = self
            .client
            .get(format!("{}/track/{}", API_BASE, id))
            .send()
            .await?
            .error_for_status()?;

        let body: TrackResponse = response.json().await?;
        track_from_response(body)
    }
}

fn track_from_response(body: TrackResponse) -> Result<Track, MusicError> {
    let track = match body {
        TrackResponse::Track(track) => track,
        TrackResponse::Error { error } => {
            return Err(match error.code {
                4 => MusicError::RateLimited,
                800 => MusicError::NotFound(error.message),
                _ => MusicError::Provider(format!("Deezer: {} ({})", error.message, error.code)),
            })
        }
    };

    let mut result = Track::new(track.title, track.link, Platform::Deezer);
    if let Some(seconds) = track.duration {
        result = result.with_duration(Duration::from_secs(seconds));
    }
    if let Some(artist) = track.artist {
        result = result.with_artist(artist.name);
    }
    if let Some(cover) = track.album.and_then(|a| a.cover_medium) {
        result = result.with_thumbnail(cover);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn track_payload() {
        let body: TrackResponse = serde_json::from_str(
            r#"{"id":3135556,"title":"Harder, Better, Faster, Stronger",
                "link":"https://www.deezer.com/track/3135556","duration":224,
                "artist":{"id":27,"name":"Daft Punk"},
                "album":{"id":302127,"cover_medium":"https://e-cdns-images.dzcdn.net/cover.jpg"}}"#,
        )
        .unwrap();

        let track = track_from_response(body).unwrap();
        assert_eq!(track.mirror_query(), "Daft Punk - Harder, Better, Faster, Stronger");
        assert_eq!(track.duration_label, "3:44");
        assert_eq!(track.platform, Platform::Deezer);
    }

    #[test]
    fn api_errors_are_classified() {
        let missing: TrackResponse = serde_json::from_str(
            r#"{"error":{"type":"DataException","message":"no data","code":800}}"#,
        )
        .unwrap();
        assert_eq!(
            track_from_response(missing),
            Err(MusicError::NotFound("no data".to_string()))
        );

        let quota: TrackResponse = serde_json::from_str(
            r#"{"error":{"type":"Exception","message":"Quota limit exceeded","code":4}}"#,
        )
        .unwrap();
        assert_eq!(track_from_response(quota), Err(MusicError::RateLimited));
    }
}
