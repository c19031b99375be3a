//! Opt-in retry decorator for transports.
//!
//! Nothing in the logger wraps a transport in [`RetryingTransport`] on its
//! own; a claimed batch is delivered at most once unless the caller asks for
//! retries here.

use crate::encoder::Payload;
use crate::error::ExportError;
use crate::transport::Transport;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = just the initial attempt).
    pub max_retries: u32,
    /// Initial delay before first retry.
    pub initial_delay: Duration,
    /// Caps exponential growth.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 = double delay each retry).
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before a given attempt (0-indexed). The first attempt never waits.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let delay_ms =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }
        Duration::from_millis(delay_ms.max(0.0) as u64)
    }
}

/// Retries transient failures of the wrapped transport with exponential
/// backoff.
///
/// Permanent failures (4xx statuses, unsupported payloads, encode errors)
/// return immediately.
pub struct RetryingTransport<T: Transport> {
    inner: T,
    config: RetryConfig,
    total_retries: AtomicU64,
    recovered_sends: AtomicU64,
}

impl<T: Transport> RetryingTransport<T> {
    pub fn new(inner: T, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            total_retries: AtomicU64::new(0),
            recovered_sends: AtomicU64::new(0),
        }
    }

    pub fn with_defaults(inner: T) -> Self {
        Self::new(inner, RetryConfig::default())
    }

    /// Total retry attempts made (not counting first attempts).
    pub fn total_retries(&self) -> u64 {
        self.total_retries.load(Ordering::Relaxed)
    }

    /// Sends that succeeded after at least one retry.
    pub fn recovered_sends(&self) -> u64 {
        self.recovered_sends.load(Ordering::Relaxed)
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: Transport> Transport for RetryingTransport<T> {
    async fn send(&self, payload: Payload) -> Result<(), ExportError> {
        let max_attempts = self.config.max_retries.saturating_add(1);
        let mut attempt = 0;

        loop {
            let delay = self.config.delay_for_attempt(attempt);
            if !delay.is_zero() {
                debug_assert!(
                    delay <= self.config.max_delay,
                    "backoff {delay:?} exceeds max_delay {:?}",
                    self.config.max_delay
                );
                self.total_retries.fetch_add(1, Ordering::Relaxed);
                sleep(delay).await;
            }
            attempt += 1;

            let err = match self.inner.send(payload.clone()).await {
                Ok(()) => {
                    if attempt > 1 {
                        self.recovered_sends.fetch_add(1, Ordering::Relaxed);
                    }
                    return Ok(());
                }
                Err(e) => e,
            };

            if !err.is_transient() {
                return Err(err);
            }
            if attempt >= max_attempts {
                return Err(ExportError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }
            tracing::debug!(
                transport = self.inner.name(),
                attempt,
                error = %err,
                "send failed, retrying"
            );
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
