use serenity::builder::{CreateEmbed, CreateEmbedFooter};

use crate::{
    error::{ErrorKind, MusicError},
    service::QueuedTrack,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const QUEUE_BLUE: Colour = Colour::new(0x0099FF);
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(queued: &QueuedTrack) -> CreateEmbed {
    let track = &queued.track;

    let position = if queued.position <= 1 {
        "▶️ Sonando ahora".to_string()
    } else {
        format!("#{}", queued.position)
    };

    let mut embed = CreateEmbed::default()
        .title("🎵 Añadido a la cola")
        .description(format!("[{}]({})", escape_markdown(&track.title), track.source_url))
        .color(colors::QUEUE_BLUE)
        .field("📋 Posición", position, true)
        .field("🔗 Fuente", format!("{} {}", track.platform.icon(), track.platform), true);

    if let Some(artist) = &track.artist {
        embed = embed.field("🎤 Artista", artist, true);
    }

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed.footer(CreateEmbedFooter::new(format!("Duración: {}", track.duration_label)))
}

/// Mensaje para el usuario cuando `/play` falla
pub fn error_message(error: &MusicError) -> String {
    match error {
        MusicError::NoVoiceChannel => "🔇 Debes unirte a un canal de voz primero".to_string(),
        MusicError::EmptyQuery => "❓ Escribe el nombre o el enlace de una canción".to_string(),
        MusicError::QueueFull(max) => format!("📋 La cola está llena (máximo {} canciones)", max),
        MusicError::UnsupportedLink(_) => {
            "🔗 Ese enlace no está soportado: usa un video de YouTube o un track de Spotify o Deezer"
                .to_string()
        }
        _ => match error.kind() {
            ErrorKind::NotFound => "🔍 No se encontraron resultados".to_string(),
            ErrorKind::RateLimited => {
                "⏳ YouTube está limitando las peticiones, inténtalo de nuevo en unos minutos".to_string()
            }
            ErrorKind::Connection => "🔌 No pude conectarme a tu canal de voz".to_string(),
            ErrorKind::UserInput | ErrorKind::Provider => "❌ Error al procesar la solicitud".to_string(),
        },
    }
}

// Los títulos con `[` o `]` rompen el enlace markdown
fn escape_markdown(title: &str) -> String {
    title.replace('[', "\\[").replace(']', "\\]")
}
