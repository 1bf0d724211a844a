//! Process-local bucket store.
//!
//! Buckets are not shared between gateway instances, so limits are only
//! enforced per process. Uses the tokio clock so paused-time tests can step
//! through refills deterministically.

use super::{BucketOutcome, BucketSpec, BucketStore, RateLimitKey, StoreError};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::time::Instant;

/// Buckets idle long enough to be full again are dropped past this size.
const MAX_TRACKED_KEYS: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    refreshed_at: Instant,
}

#[derive(Clone, Default)]
pub struct InMemoryBucketStore {
    buckets: Arc<Mutex<HashMap<RateLimitKey, Bucket>>>,
}

impl InMemoryBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn consume(&self, key: &RateLimitKey, spec: BucketSpec) -> BucketOutcome {
        let now = Instant::now();
        let capacity = spec.capacity as f64;
        let rate = spec.replenish_rate as f64;

        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());

        if buckets.len() > MAX_TRACKED_KEYS && rate > 0.0 {
            let fill_time = capacity / rate;
            buckets.retain(|_, b| {
                now.duration_since(b.refreshed_at).as_secs_f64() < fill_time
            });
        }

        let bucket = buckets.entry(key.clone()).or_insert(Bucket {
            tokens: capacity,
            refreshed_at: now,
        });

        let elapsed = now.duration_since(bucket.refreshed_at).as_secs_f64();
        let filled = (bucket.tokens + elapsed * rate).min(capacity);
        let requested = spec.requested as f64;
        let allowed = filled >= requested;

        bucket.tokens = if allowed { filled - requested } else { filled };
        bucket.refreshed_at = now;

        BucketOutcome {
            allowed,
            tokens_left: bucket.tokens,
        }
    }
}

#[async_trait]
impl BucketStore for InMemoryBucketStore {
    async fn try_consume(
        &self,
        key: &RateLimitKey,
        spec: BucketSpec,
    ) -> Result<BucketOutcome, StoreError> {
        Ok(self.consume(key, spec))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
