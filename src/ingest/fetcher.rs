// src/ingest/fetcher.rs
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::histogram;

use crate::ingest::error::{FetchCause, FetchError, RetryDisposition};
use crate::ingest::transport::Transport;
use crate::ingest::types::ExportWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl BackoffPolicy {
    /// `base * 2^attempt_index`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt_index: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt_index).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Downloads one window's compressed payload, retrying transient failures.
pub struct RecordFetcher {
    transport: Arc<dyn Transport>,
    timeout: Duration,
    backoff: BackoffPolicy,
}

impl RecordFetcher {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration, backoff: BackoffPolicy) -> Self {
        Self {
            transport,
            timeout,
            backoff,
        }
    }

    pub async fn fetch(&self, window: &ExportWindow) -> Result<Vec<u8>, FetchError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let t0 = Instant::now();
            let result = self.attempt(window).await;
            histogram!("ingest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

            match result {
                Ok(bytes) => {
                    tracing::debug!(
                        target: "ingest",
                        window = %window.label(),
                        bytes = bytes.len(),
                        attempt,
                        "window fetched"
                    );
                    return Ok(bytes);
                }
                Err(cause)
                    if cause.disposition() == RetryDisposition::Retryable
                        && attempt <= self.backoff.max_retries =>
                {
                    let delay = self.backoff.delay_for_attempt(attempt - 1);
                    tracing::warn!(
                        target: "ingest",
                        window = %window.label(),
                        attempt,
                        max_retries = self.backoff.max_retries,
                        error = %cause,
                        delay_ms = delay.as_millis() as u64,
                        "fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(cause) => {
                    return Err(FetchError {
                        window: window.label(),
                        attempts: attempt,
                        cause,
                    });
                }
            }
        }
    }

    async fn attempt(&self, window: &ExportWindow) -> Result<Vec<u8>, FetchCause> {
        let bytes = match tokio::time::timeout(self.timeout, self.transport.get(&window.url)).await
        {
            Ok(res) => res?,
            Err(_) => return Err(FetchCause::TimedOut(self.timeout)),
        };

        if let Some(expected) = window.expected_size {
            let actual = bytes.len() as u64;
            if actual != expected {
                return Err(FetchCause::SizeMismatch { expected, actual });
            }
        }
        Ok(bytes)
    }
}
