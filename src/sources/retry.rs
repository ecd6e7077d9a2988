//! Retry policy and request throttle shared by every provider call.

use rand::Rng;
use std::{future::Future, time::Duration};
use tracing::{debug, warn};

use crate::error::MusicError;

/// Política de reintentos: intentos acotados, espera según el tipo de error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub rate_limit_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
            rate_limit_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Espera antes del siguiente intento, o `None` si el error no se reintenta
    pub fn delay_for(&self, error: &MusicError) -> Option<Duration> {
        match error {
            MusicError::RateLimited => Some(self.rate_limit_delay),
            MusicError::Transport(_) => Some(self.retry_delay),
            _ => None,
        }
    }

    /// Ejecuta `op` hasta que tenga éxito, falle sin posibilidad de reintento
    /// o se agoten los intentos. Devuelve el último error.
    pub async fn run<T, F, Fut>(&self, what: &str, throttle: &Throttle, mut op: F) -> Result<T, MusicError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, MusicError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            throttle.pause().await;

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let Some(delay) = self.delay_for(&err) else {
                debug!("⛔ {} falló sin reintento: {}", what, err);
                return Err(err);
            };

            if attempt >= max_attempts {
                warn!("❌ {} falló tras {} intentos: {}", what, attempt, err);
                return Err(err);
            }

            warn!(
                "🔄 {} falló (intento {}/{}): {}, reintentando en {:?}",
                what, attempt, max_attempts, err, delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Pausa aleatoria antes de cada petición para no disparar el rate limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    min: Duration,
    max: Duration,
}

impl Throttle {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min: min.min(max),
            max,
        }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        !self.max.is_zero()
    }

    pub fn next_delay(&self) -> Duration {
        if self.min == self.max {
            return self.max;
        }
        let millis = rand::thread_rng().gen_range(self.min.as_millis()..=self.max.as_millis());
        Duration::from_millis(millis as u64)
    }

    pub async fn pause(&self) {
        if !self.is_enabled() {
            return;
        }
        let delay = self.next_delay();
        debug!("⏳ Pausa de {:?} antes de llamar al proveedor", delay);
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            retry_delay: Duration::from_secs(5),
            rate_limit_delay: Duration::from_secs(30),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_waits_longer_than_transport_errors() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result = policy()
            .run("prueba", &Throttle::disabled(), || async {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(MusicError::RateLimited),
                    1 => Err(MusicError::Transport("reset".into())),
                    _ => Ok("listo"),
                }
            })
            .await;

        assert_eq!(result, Ok("listo"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(35) && elapsed < Duration::from_secs(36));
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_are_bounded() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy()
            .run("prueba", &Throttle::disabled(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(MusicError::RateLimited)
            })
            .await;

        assert_eq!(result, Err(MusicError::RateLimited));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy()
            .run("prueba", &Throttle::disabled(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(MusicError::NotFound("x".into()))
            })
            .await;

        assert_eq!(result, Err(MusicError::NotFound("x".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn throttle_delay_stays_in_range() {
        let throttle = Throttle::new(Duration::from_secs(1), Duration::from_secs(6));
        for _ in 0..100 {
            let delay = throttle.next_delay();
            assert!(delay >= Duration::from_secs(1) && delay <= Duration::from_secs(6));
        }
        assert!(!Throttle::disabled().is_enabled());
    }
}
