use anyhow::{Context, Result};
use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::{
    audio::SessionSettings,
    sources::retry::{RetryPolicy, Throttle},
};

/// Configuración del bot, leída del entorno (y de `.env` si existe).
///
/// Sin `Debug`: contiene el token. Para logs usa [`Config::summary`].
#[derive(Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para registrar comandos en un solo guild durante desarrollo

    // Cola y búsqueda
    pub max_queue_size: usize,
    pub search_limit: usize,

    // Ciclo de vida de la sesión de voz
    pub idle_timeout: Duration,
    pub reconnect_grace: Duration,
    pub connect_timeout: Duration,

    // Reintentos contra proveedores
    pub stream_max_attempts: u32,
    pub retry_delay: Duration,
    pub rate_limit_delay: Duration,
    pub throttle_min: Duration,
    pub throttle_max: Duration,

    // Proveedores
    pub ytdlp_path: String,
    pub ytdlp_cookies: Option<PathBuf>,
    pub youtube_api_key: Option<String>,
    pub http_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            application_id: std::env::var("APPLICATION_ID")
                .context("APPLICATION_ID no está definido")?
                .parse()
                .context("APPLICATION_ID debe ser numérico")?,
            guild_id: optional_var("GUILD_ID").and_then(|s| s.parse().ok()),

            max_queue_size: env_or("MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            search_limit: env_or("SEARCH_LIMIT", defaults.search_limit)?,

            idle_timeout: env_duration("IDLE_TIMEOUT", defaults.idle_timeout)?,
            reconnect_grace: env_duration("RECONNECT_GRACE", defaults.reconnect_grace)?,
            connect_timeout: env_duration("CONNECT_TIMEOUT", defaults.connect_timeout)?,

            stream_max_attempts: env_or("STREAM_MAX_ATTEMPTS", defaults.stream_max_attempts)?,
            retry_delay: env_duration("RETRY_DELAY", defaults.retry_delay)?,
            rate_limit_delay: env_duration("RATE_LIMIT_DELAY", defaults.rate_limit_delay)?,
            throttle_min: env_duration("THROTTLE_MIN", defaults.throttle_min)?,
            throttle_max: env_duration("THROTTLE_MAX", defaults.throttle_max)?,

            ytdlp_path: optional_var("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            ytdlp_cookies: optional_var("YTDLP_COOKIES").map(PathBuf::from),
            youtube_api_key: optional_var("YOUTUBE_API_KEY"),
            http_timeout: env_duration("HTTP_TIMEOUT", defaults.http_timeout)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// Catches values that would make the bot misbehave silently: empty
    /// queues, zero retry budgets, an inverted throttle window or a cookies
    /// file that does not exist.
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN está vacío");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("MAX_QUEUE_SIZE debe ser mayor que 0");
        }

        if self.search_limit == 0 || self.search_limit > 50 {
            anyhow::bail!("SEARCH_LIMIT debe estar entre 1 y 50, se recibió: {}", self.search_limit);
        }

        if self.stream_max_attempts == 0 {
            anyhow::bail!("STREAM_MAX_ATTEMPTS debe ser mayor que 0");
        }

        if self.idle_timeout.is_zero() || self.connect_timeout.is_zero() {
            anyhow::bail!("IDLE_TIMEOUT y CONNECT_TIMEOUT deben ser mayores que 0");
        }

        // THROTTLE_MAX=0s apaga la pausa sin importar THROTTLE_MIN
        if !self.throttle_max.is_zero() && self.throttle_min > self.throttle_max {
            anyhow::bail!(
                "THROTTLE_MIN ({}) no puede superar a THROTTLE_MAX ({})",
                humantime::format_duration(self.throttle_min),
                humantime::format_duration(self.throttle_max)
            );
        }

        if let Some(cookies) = &self.ytdlp_cookies {
            if !cookies.is_file() {
                anyhow::bail!("YTDLP_COOKIES apunta a un archivo inexistente: {}", cookies.display());
            }
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Secrets (the bot token and the API key) are never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Cola: {} tracks máx, {} resultados por búsqueda\n  \
            Sesión: idle {}, gracia de reconexión {}, conexión {}\n  \
            Reintentos: {} intentos, {} / {} (rate limit), pausa {}-{}\n  \
            Proveedores: yt-dlp={} (cookies: {}), API de YouTube: {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.max_queue_size,
            self.search_limit,
            humantime::format_duration(self.idle_timeout),
            humantime::format_duration(self.reconnect_grace),
            humantime::format_duration(self.connect_timeout),
            self.stream_max_attempts,
            humantime::format_duration(self.retry_delay),
            humantime::format_duration(self.rate_limit_delay),
            humantime::format_duration(self.throttle_min),
            humantime::format_duration(self.throttle_max),
            self.ytdlp_path,
            self.ytdlp_cookies.is_some(),
            if self.youtube_api_key.is_some() { "sí" } else { "no" },
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.stream_max_attempts,
            retry_delay: self.retry_delay,
            rate_limit_delay: self.rate_limit_delay,
        }
    }

    pub fn throttle(&self) -> Throttle {
        Throttle::new(self.throttle_min, self.throttle_max)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            idle_timeout: self.idle_timeout,
            reconnect_grace: self.reconnect_grace,
            connect_timeout: self.connect_timeout,
        }
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (sin valores por defecto, deben proveerse)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            max_queue_size: 1000,
            search_limit: 5,

            idle_timeout: Duration::from_secs(300), // 5 minutos sin música
            reconnect_grace: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(20),

            stream_max_attempts: 3,
            retry_delay: Duration::from_secs(5),
            rate_limit_delay: Duration::from_secs(30),
            throttle_min: Duration::from_secs(1),
            throttle_max: Duration::from_secs(6),

            ytdlp_path: "yt-dlp".to_string(),
            ytdlp_cookies: None,
            youtube_api_key: None,
            http_timeout: Duration::from_secs(30),
        }
    }
}

fn optional_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_var(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} tiene un valor inválido: {}", key, value)),
        None => Ok(default),
    }
}

/// Lee una duración en formato humano (`30s`, `5m`, `1h 30m`)
fn env_duration(key: &str, default: Duration) -> Result<Duration> {
    match optional_var(key) {
        Some(value) => humantime::parse_duration(value.trim())
            .with_context(|| format!("{} no es una duración válida: {}", key, value)),
        None => Ok(default),
    }
}
