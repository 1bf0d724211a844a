//! Token bucket admission control keyed by caller identity.
//!
//! Bucket state lives in a [`BucketStore`]. The Redis store lets several
//! gateway instances share one bucket per key; the in-memory store only
//! limits a single process and is used when no Redis URL is configured or
//! when Redis is unreachable.

pub mod memory;
pub mod redis_store;

pub use memory::InMemoryBucketStore;
pub use redis_store::RedisBucketStore;

use crate::config::{RateLimitConfig, UnauthenticatedPolicy};
use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue};
use std::{sync::Arc, time::Duration};
use thiserror::Error;

/// Identity a bucket is kept for (the authenticated principal's name).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Store keys for this bucket. The braces keep both keys in one Redis
    /// Cluster hash slot, which the script requires.
    pub fn to_store_keys(&self) -> (String, String) {
        let prefix = format!("edge:ratelimit:{{{}}}", self.0);
        (format!("{}.tokens", prefix), format!("{}.timestamp", prefix))
    }
}

/// Bucket parameters passed to the store on every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketSpec {
    pub capacity: u64,
    /// Tokens per second
    pub replenish_rate: u64,
    pub requested: u64,
}

/// Raw store answer: whether the tokens were taken and what is left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketOutcome {
    pub allowed: bool,
    pub tokens_left: f64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("malformed bucket state: {0}")]
    Malformed(String),
}

/// Atomic refill-then-consume on one bucket.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BucketStore: Send + Sync {
    async fn try_consume(&self, key: &RateLimitKey, spec: BucketSpec)
        -> Result<BucketOutcome, StoreError>;

    fn name(&self) -> &'static str;
}

/// Result of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitDecision {
    pub permitted: bool,
    /// Whole tokens left in the bucket after this request
    pub tokens_remaining: u64,
    /// Time until enough tokens have refilled; zero when permitted
    pub retry_after: Duration,
}

impl RateLimitDecision {
    /// Retry-After value in whole seconds, rounded up
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        if self.retry_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

/// Rate limiter shared by every request
#[derive(Clone)]
pub struct RateLimiter {
    config: Arc<RateLimitConfig>,
    store: Arc<dyn BucketStore>,
    fallback: InMemoryBucketStore,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, store: Arc<dyn BucketStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            fallback: InMemoryBucketStore::new(),
        }
    }

    /// Limiter backed only by process memory
    pub fn in_memory(config: RateLimitConfig) -> Self {
        Self::new(config, Arc::new(InMemoryBucketStore::new()))
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn unauthenticated_policy(&self) -> UnauthenticatedPolicy {
        self.config.unauthenticated
    }

    fn spec(&self) -> BucketSpec {
        BucketSpec {
            capacity: self.config.burst_capacity,
            replenish_rate: self.config.replenish_rate,
            requested: self.config.requested_tokens,
        }
    }

    /// Take the configured number of tokens from `key`'s bucket.
    ///
    /// The store performs refill and decrement as one atomic step. When the
    /// store fails the check is repeated against the local fallback, so an
    /// outage degrades to per-instance limiting instead of no limiting.
    pub async fn allow(&self, key: &RateLimitKey) -> RateLimitDecision {
        if !self.is_enabled() {
            return RateLimitDecision {
                permitted: true,
                tokens_remaining: self.config.burst_capacity,
                retry_after: Duration::ZERO,
            };
        }

        let spec = self.spec();
        let outcome = match self.store.try_consume(key, spec).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    store = self.store.name(),
                    error = %e,
                    "Bucket store unavailable, using in-memory fallback"
                );
                metrics::counter!("edge_rate_limit_store_fallback_total").increment(1);
                match self.fallback.try_consume(key, spec).await {
                    Ok(outcome) => outcome,
                    Err(_) => BucketOutcome {
                        allowed: true,
                        tokens_left: 0.0,
                    },
                }
            }
        };

        let decision = self.decide(outcome, spec);
        if !decision.permitted {
            metrics::counter!("edge_rate_limit_throttled_total").increment(1);
            tracing::debug!(key = key.as_str(), "Request rate limited");
        }
        decision
    }

    fn decide(&self, outcome: BucketOutcome, spec: BucketSpec) -> RateLimitDecision {
        let tokens_left = outcome.tokens_left.max(0.0);
        let retry_after = if outcome.allowed || spec.replenish_rate == 0 {
            Duration::ZERO
        } else {
            let deficit = (spec.requested as f64 - tokens_left).max(0.0);
            Duration::from_secs_f64(deficit / spec.replenish_rate as f64)
        };
        RateLimitDecision {
            permitted: outcome.allowed,
            tokens_remaining: tokens_left.floor() as u64,
            retry_after,
        }
    }

    /// Informational headers added to admitted responses
    pub fn apply_headers(&self, decision: &RateLimitDecision, headers: &mut HeaderMap) {
        headers.insert(
            "x-ratelimit-remaining",
            HeaderValue::from(decision.tokens_remaining),
        );
        headers.insert(
            "x-ratelimit-burst-capacity",
            HeaderValue::from(self.config.burst_capacity),
        );
        headers.insert(
            "x-ratelimit-replenish-rate",
            HeaderValue::from(self.config.replenish_rate),
        );
        headers.insert(
            "x-ratelimit-requested-tokens",
            HeaderValue::from(self.config.requested_tokens),
        );
    }
}
