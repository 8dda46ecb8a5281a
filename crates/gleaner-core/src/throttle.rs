//! Request pacing against the upstream rate limit.
//!
//! Wraps any [`CatalogClient`] so that successive requests are spaced by at
//! least a fixed delay. All requests share one pacing slot: the upstream
//! limits the credential, not individual endpoints.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use gleaner_core::throttle::{ThrottleConfig, ThrottledClient};
//!
//! # fn wrap<C: gleaner_core::traits::CatalogClient>(inner: C) {
//! let config = ThrottleConfig::new(Duration::from_millis(100))
//!     .with_jitter(Duration::from_millis(25));
//! let client = ThrottledClient::new(inner, config);
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::AppError;
use crate::models::CatalogItem;
use crate::traits::{CatalogClient, Credential};

/// Configuration for the throttled client.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Minimum delay between consecutive requests.
    pub delay: Duration,

    /// Maximum random jitter added on top of `delay` (uniform [0, jitter]).
    pub jitter: Duration,
}

impl ThrottleConfig {
    /// Create a new config with the given delay and no jitter.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            jitter: Duration::ZERO,
        }
    }

    /// Add random jitter (uniform [0, jitter]) on top of the base delay.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Compute the effective delay for a single wait (delay + random jitter).
    fn effective_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.delay;
        }
        let jitter_ms = rand_jitter_ms(self.jitter.as_millis() as u64);
        self.delay + Duration::from_millis(jitter_ms)
    }
}

impl Default for ThrottleConfig {
    /// 100ms between requests, no jitter.
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

/// A [`CatalogClient`] wrapper that enforces a minimum spacing between
/// requests. Token fetches are not paced.
#[derive(Clone)]
pub struct ThrottledClient<C> {
    inner: C,
    config: ThrottleConfig,
    /// Time of the last paced request.
    last_request: Arc<Mutex<Option<Instant>>>,
}

impl<C: CatalogClient> ThrottledClient<C> {
    pub fn new(inner: C, config: ThrottleConfig) -> Self {
        Self {
            inner,
            config,
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Wait until the delay since the previous request has elapsed, then
    /// record the current time. The lock is held while sleeping so that
    /// concurrent callers queue up one slot at a time.
    async fn wait_turn(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            let required = self.config.effective_delay();
            if elapsed < required {
                let sleep_duration = required - elapsed;
                tracing::trace!(sleep_ms = %sleep_duration.as_millis(), "Pacing request");
                tokio::time::sleep(sleep_duration).await;
            }
        }
        *last = Some(Instant::now());
    }
}

impl<C: CatalogClient> CatalogClient for ThrottledClient<C> {
    async fn fetch_token(&self) -> Result<Credential, AppError> {
        self.inner.fetch_token().await
    }

    async fn search(
        &self,
        query: &str,
        page_size: usize,
        offset: usize,
    ) -> Result<Vec<Option<CatalogItem>>, AppError> {
        self.wait_turn().await;
        self.inner.search(query, page_size, offset).await
    }

    async fn collection_page(
        &self,
        collection_id: &str,
        page_size: usize,
        offset: usize,
    ) -> Result<Vec<Option<CatalogItem>>, AppError> {
        self.wait_turn().await;
        self.inner
            .collection_page(collection_id, page_size, offset)
            .await
    }

    async fn fetch_batch(&self, ids: &[String]) -> Result<Vec<Option<CatalogItem>>, AppError> {
        self.wait_turn().await;
        self.inner.fetch_batch(ids).await
    }
}

// ---------------------------------------------------------------------------
// Jitter from a time-seeded xorshift, not suitable for anything but pacing.
// ---------------------------------------------------------------------------

fn rand_jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % max_ms
}
