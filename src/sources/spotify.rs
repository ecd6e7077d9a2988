// Resolución de enlaces de Spotify vía oEmbed (sin credenciales).
// El audio se busca después en YouTube con el título del track.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{validate, LinkResolver, Platform, Track};
use crate::error::MusicError;

const OEMBED_URL: &str = "https://open.spotify.com/oembed";

#[derive(Debug, Deserialize)]
struct OEmbed {
    title: String,
    thumbnail_url: Option<String>,
}

pub struct SpotifyClient {
    client: reqwest::Client,
}

impl SpotifyClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LinkResolver for SpotifyClient {
    fn platform(&self) -> Platform {
        Platform::Spotify
    }

    async fn lookup(&self, url: &str) -> Result<Track, MusicError> {
        debug!("🟢 Resolviendo enlace de Spotify: {}", url);

        let response = self
            .client
            .get(OEMBED_URL)
            .query(&[("url", url)])
            .send()
            .await?;

        let status = response.status();
        match status.as_u16() {
            400 | 404 => return Err(MusicError::NotFound(url.to_string())),
            429 => return Err(MusicError::RateLimited),
            _ if !status.is_success() => {
                return Err(MusicError::Provider(format!("Spotify respondió {}", status)))
            }
            _ => {}
        }

        let embed: OEmbed = response.json().await?;
        Ok(track_from_oembed(url, embed))
    }
}

fn track_from_oembed(url: &str, embed: OEmbed) -> Track {
    let canonical = match validate::classify(url) {
        validate::LinkKind::Spotify(canonical) => canonical,
        _ => url.to_string(),
    };

    let mut track = Track::new(embed.title, canonical, Platform::Spotify);
    if let Some(thumbnail) = embed.thumbnail_url {
        track = track.with_thumbnail(thumbnail);
    }
    track
}
