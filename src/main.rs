use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod service;
mod sources;
mod ui;

use crate::audio::{GuildQueueStore, SessionRegistry, SongbirdTransport};
use crate::bot::MusicBot;
use crate::config::Config;
use crate::service::MusicService;
use crate::sources::ProviderGateway;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mafia_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Mafia Music v{}", env!("CARGO_PKG_VERSION"));

    // Cargar y validar configuración
    let config = Config::load()?;

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    info!("⚙️ {}", config.summary());

    let gateway = Arc::new(ProviderGateway::from_config(&config)?);

    // Sin timeout total: el stream de audio dura lo que dura la canción
    let stream_http = reqwest::Client::builder()
        .connect_timeout(config.http_timeout)
        .build()?;

    let songbird = Songbird::serenity();
    let transport = Arc::new(SongbirdTransport::new(Arc::clone(&songbird), stream_http));
    let queues = Arc::new(GuildQueueStore::new(config.max_queue_size));
    let registry = Arc::new(SessionRegistry::new(
        queues,
        Arc::clone(&gateway),
        transport,
        config.session_settings(),
    ));
    let service = Arc::new(MusicService::new(gateway, Arc::clone(&registry)));

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;
    let handler = MusicBot::new(config.clone(), service);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("❌ Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        registry.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

/// Verifica que yt-dlp y ffmpeg estén instalados (usado por el healthcheck del contenedor)
async fn health_check(config: &Config) -> Result<()> {
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
