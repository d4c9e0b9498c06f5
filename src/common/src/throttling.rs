//! Per-tenant admission throttling.
//!
//! A throttler decides how long a tenant's request has to wait before it may
//! proceed and performs that wait itself; the returned decision reports the
//! delay that was paid.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::config::ThrottlingConfig;

/// Outcome of admission control for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThrottleDecision {
    /// Time the request was held before proceeding; zero means unthrottled
    pub delay: Duration,
}

impl ThrottleDecision {
    pub fn unthrottled() -> Self {
        Self::default()
    }

    pub fn is_throttled(&self) -> bool {
        !self.delay.is_zero()
    }
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Throttler: Send + Sync + 'static {
    /// Waits as long as `tenant` has to and reports the delay paid.
    async fn throttle(&self, tenant: &str) -> ThrottleDecision;
}

/// Throttler that admits everything immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopThrottler;

#[async_trait]
impl Throttler for NoopThrottler {
    async fn throttle(&self, _tenant: &str) -> ThrottleDecision {
        ThrottleDecision::unthrottled()
    }
}

#[derive(Debug)]
struct Bucket {
    rate: f64,
    tokens: f64,
    updated: Instant,
}

impl Bucket {
    fn new(rate: f64, now: Instant) -> Self {
        Self {
            rate,
            tokens: rate.max(1.0),
            updated: now,
        }
    }

    /// Takes one token, possibly going into debt, and returns how long the
    /// caller has to wait for that token to be covered.
    fn reserve(&mut self, now: Instant) -> Duration {
        let capacity = self.rate.max(1.0);
        let elapsed = now.saturating_duration_since(self.updated).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(capacity);
        self.updated = now;

        self.tokens -= 1.0;
        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.rate)
        }
    }
}

/// Token-bucket throttler with one bucket per tenant.
///
/// Requests beyond a tenant's rate reserve a future token and sleep until it
/// becomes available, so concurrent requests of one tenant queue up fairly
/// without blocking other tenants.
#[derive(Debug)]
pub struct TokenBucketThrottler {
    config: ThrottlingConfig,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl TokenBucketThrottler {
    pub fn new(config: ThrottlingConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn reserve(&self, tenant: &str, rate: f64) -> Duration {
        let now = Instant::now();
        let mut buckets = match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        buckets
            .entry(tenant.to_string())
            .or_insert_with(|| Bucket::new(rate, now))
            .reserve(now)
    }
}

#[async_trait]
impl Throttler for TokenBucketThrottler {
    async fn throttle(&self, tenant: &str) -> ThrottleDecision {
        let Some(rate) = self.config.rate_for(tenant) else {
            return ThrottleDecision::unthrottled();
        };

        let delay = self.reserve(tenant, rate);
        if !delay.is_zero() {
            tracing::debug!(tenant, delay_ms = delay.as_millis() as u64, "Throttling request");
            tokio::time::sleep(delay).await;
        }
        ThrottleDecision { delay }
    }
}
