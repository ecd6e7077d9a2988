//! Link and ID recognition.
//!
//! Decides whether a `/play` query is a direct link to a supported platform or
//! free text to search for. This is pure string work: nothing here touches the
//! network.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z\d_-]{11,12}$").expect("regex de video ID"));

static PLAYLIST_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(PL|UU|LL|RD|OL)[a-zA-Z\d_-]{10,}$").expect("regex de playlist ID")
});

static SPOTIFY_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^spotify:track:([A-Za-z0-9]{22})$").expect("regex de URI de Spotify")
});

static SPOTIFY_TRACK_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/(?:intl-[a-z]{2}(?:-[A-Za-z]+)?/)?track/([A-Za-z0-9]{22})/?$")
        .expect("regex de ruta de Spotify")
});

static DEEZER_TRACK_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/(?:[a-z]{2}/)?track/(\d+)/?$").expect("regex de ruta de Deezer")
});

const YOUTUBE_HOSTS: [&str; 4] = ["youtube.com", "m.youtube.com", "music.youtube.com", "youtu.be"];

/// Resultado de clasificar una consulta de `/play`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkKind {
    /// Enlace de YouTube a un video (ID extraído)
    YouTubeVideo(String),
    /// Texto con forma de video ID, sin URL
    BareVideoId(String),
    /// Enlace o ID de playlist de YouTube
    YouTubePlaylist(String),
    /// Enlace canónico a un track de Spotify
    Spotify(String),
    /// ID numérico de un track de Deezer
    Deezer(String),
    /// URL de una plataforma no soportada
    Unsupported(String),
    /// Texto libre para buscar
    Search(String),
}

pub fn classify(query: &str) -> LinkKind {
    let query = query.trim();

    if looks_like_url(query) {
        return classify_url(query);
    }

    if let Some(caps) = SPOTIFY_URI.captures(query) {
        return LinkKind::Spotify(spotify_track_url(&caps[1]));
    }

    if is_video_id(query) {
        LinkKind::BareVideoId(query.to_string())
    } else if is_playlist_id(query) {
        LinkKind::YouTubePlaylist(query.to_string())
    } else {
        LinkKind::Search(query.to_string())
    }
}

pub fn is_video_id(candidate: &str) -> bool {
    VIDEO_ID.is_match(candidate)
}

pub fn is_playlist_id(candidate: &str) -> bool {
    PLAYLIST_ID.is_match(candidate)
}

/// Extrae el video ID de una URL de YouTube o de un ID suelto
pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();
    if is_video_id(input) {
        return Some(input.to_string());
    }

    let url = parse_loose(input)?;
    if !is_youtube_host(&url) {
        return None;
    }
    video_id_from_url(&url)
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

pub fn spotify_track_url(track_id: &str) -> String {
    format!("https://open.spotify.com/track/{}", track_id)
}

fn looks_like_url(query: &str) -> bool {
    if query.chars().any(char::is_whitespace) {
        return false;
    }

    let lower = query.to_ascii_lowercase();
    lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("//")
        || lower.starts_with("www.")
        || ["youtube.com/", "youtu.be/", "m.youtube.com/", "music.youtube.com/", "open.spotify.com/", "deezer.com/"]
            .iter()
            .any(|prefix| lower.starts_with(prefix))
}

fn parse_loose(input: &str) -> Option<Url> {
    let lower = input.to_ascii_lowercase();
    let candidate = if lower.starts_with("http://") || lower.starts_with("https://") {
        input.to_string()
    } else if let Some(rest) = input.strip_prefix("//") {
        format!("https://{}", rest)
    } else {
        format!("https://{}", input)
    };

    Url::parse(&candidate).ok()
}

fn normalized_host(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

fn is_youtube_host(url: &Url) -> bool {
    normalized_host(url)
        .map(|host| YOUTUBE_HOSTS.contains(&host.as_str()))
        .unwrap_or(false)
}

fn classify_url(raw: &str) -> LinkKind {
    let Some(url) = parse_loose(raw) else {
        return LinkKind::Unsupported(raw.to_string());
    };
    let host = normalized_host(&url).unwrap_or_default();

    if YOUTUBE_HOSTS.contains(&host.as_str()) {
        if let Some(id) = video_id_from_url(&url) {
            return LinkKind::YouTubeVideo(id);
        }
        return match query_param(&url, "list") {
            Some(list) if is_playlist_id(&list) => LinkKind::YouTubePlaylist(list),
            _ => LinkKind::Unsupported(raw.to_string()),
        };
    }

    match host.as_str() {
        "open.spotify.com" => match SPOTIFY_TRACK_PATH.captures(url.path()) {
            Some(caps) => LinkKind::Spotify(spotify_track_url(&caps[1])),
            None => LinkKind::Unsupported(raw.to_string()),
        },
        "deezer.com" => match DEEZER_TRACK_PATH.captures(url.path()) {
            Some(caps) => LinkKind::Deezer(caps[1].to_string()),
            None => LinkKind::Unsupported(raw.to_string()),
        },
        _ => LinkKind::Unsupported(raw.to_string()),
    }
}

fn video_id_from_url(url: &Url) -> Option<String> {
    let host = normalized_host(url)?;
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());

    let candidate = if host == "youtu.be" {
        segments.next().map(str::to_string)
    } else {
        match segments.next() {
            Some("shorts" | "embed" | "live" | "v") => segments.next().map(str::to_string),
            Some("watch") | None => query_param(url, "v"),
            Some(_) => None,
        }
    };

    candidate.filter(|id| is_video_id(id))
}

fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn youtube_video_links() {
        let id = "dQw4w9WgXcQ".to_string();
        for link in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtube.com/watch?v=dQw4w9WgXcQ&list=PLabcdefghijklmn",
            "https://youtu.be/dQw4w9WgXcQ?t=42",
            "https://m.youtube.com/shorts/dQw4w9WgXcQ",
            "https://music.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/live/dQw4w9WgXcQ?feature=share",
            "youtube.com/watch?v=dQw4w9WgXcQ",
        ] {
            assert_eq!(classify(link), LinkKind::YouTubeVideo(id.clone()), "{}", link);
        }
    }

    #[test]
    fn youtube_playlists() {
        assert_eq!(
            classify("https://www.youtube.com/playlist?list=PLrAXtmErZgOeiKm4sgNOknGvNjby9efdf"),
            LinkKind::YouTubePlaylist("PLrAXtmErZgOeiKm4sgNOknGvNjby9efdf".to_string())
        );
        assert_eq!(
            classify("PLrAXtmErZgOeiKm4sgNOknGvNjby9efdf"),
            LinkKind::YouTubePlaylist("PLrAXtmErZgOeiKm4sgNOknGvNjby9efdf".to_string())
        );
    }

    #[test]
    fn bare_ids_and_free_text() {
        assert_eq!(
            classify("  dQw4w9WgXcQ "),
            LinkKind::BareVideoId("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            classify("never gonna give you up"),
            LinkKind::Search("never gonna give you up".to_string())
        );
        assert_eq!(classify("despacito"), LinkKind::Search("despacito".to_string()));
    }

    #[test]
    fn spotify_and_deezer_links() {
        assert_eq!(
            classify("https://open.spotify.com/intl-es/track/4uLU6hMCjMI75M1A2tKUQC?si=abc"),
            LinkKind::Spotify("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC".to_string())
        );
        assert_eq!(
            classify("spotify:track:4uLU6hMCjMI75M1A2tKUQC"),
            LinkKind::Spotify("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC".to_string())
        );
        assert_eq!(
            classify("https://www.deezer.com/es/track/3135556"),
            LinkKind::Deezer("3135556".to_string())
        );
    }

    #[test]
    fn unsupported_links() {
        assert_eq!(
            classify("https://soundcloud.com/artist/song"),
            LinkKind::Unsupported("https://soundcloud.com/artist/song".to_string())
        );
        assert_eq!(
            classify("https://open.spotify.com/album/4uLU6hMCjMI75M1A2tKUQC"),
            LinkKind::Unsupported("https://open.spotify.com/album/4uLU6hMCjMI75M1A2tKUQC".to_string())
        );
        assert_eq!(
            classify("https://www.youtube.com/channel/UC123"),
            LinkKind::Unsupported("https://www.youtube.com/channel/UC123".to_string())
        );
    }

    #[test]
    fn extract_video_id_accepts_links_and_ids() {
        assert_eq!(extract_video_id("https://youtu.be/dQw4w9WgXcQ"), Some("dQw4w9WgXcQ".to_string()));
        assert_eq!(extract_video_id("dQw4w9WgXcQ"), Some("dQw4w9WgXcQ".to_string()));
        assert_eq!(extract_video_id("https://example.com/watch?v=dQw4w9WgXcQ"), None);
        assert_eq!(extract_video_id("https://youtube.com/watch?v=short"), None);
    }
}
