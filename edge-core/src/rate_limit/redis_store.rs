//! Redis-backed bucket store shared by every gateway instance.

use super::{BucketOutcome, BucketSpec, BucketStore, RateLimitKey, StoreError};
use crate::config::RedisConfig;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Script};

/// Refill and conditional decrement in one script so concurrent callers for
/// the same key can never both take the last token. The clock is the Redis
/// server's, so instances with skewed clocks still agree.
///
/// KEYS: tokens key, timestamp key
/// ARGV: replenish rate (tokens/s), capacity, requested tokens
/// Returns: [allowed (0/1), tokens left as a decimal string]
const TOKEN_BUCKET_SCRIPT: &str = r#"
local tokens_key = KEYS[1]
local timestamp_key = KEYS[2]

local rate = tonumber(ARGV[1])
local capacity = tonumber(ARGV[2])
local requested = tonumber(ARGV[3])

local time = redis.call('TIME')
local now = tonumber(time[1]) * 1000 + math.floor(tonumber(time[2]) / 1000)

local fill_time = capacity / rate
local ttl = math.ceil(fill_time * 2)
if ttl < 1 then
  ttl = 1
end

local last_tokens = tonumber(redis.call('GET', tokens_key))
if last_tokens == nil then
  last_tokens = capacity
end

local last_refreshed = tonumber(redis.call('GET', timestamp_key))
if last_refreshed == nil then
  last_refreshed = now
end

local delta = math.max(0, now - last_refreshed)
local filled = math.min(capacity, last_tokens + (delta * rate / 1000))
local allowed = filled >= requested
local new_tokens = filled
local allowed_num = 0
if allowed then
  new_tokens = filled - requested
  allowed_num = 1
end

redis.call('SETEX', tokens_key, ttl, tostring(new_tokens))
redis.call('SETEX', timestamp_key, ttl, now)

return { allowed_num, tostring(new_tokens) }
"#;

#[derive(Clone)]
pub struct RedisBucketStore {
    conn: ConnectionManager,
    script: Script,
}

impl RedisBucketStore {
    /// Connect to Redis
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            script: Script::new(TOKEN_BUCKET_SCRIPT),
        })
    }
}

#[async_trait]
impl BucketStore for RedisBucketStore {
    async fn try_consume(
        &self,
        key: &RateLimitKey,
        spec: BucketSpec,
    ) -> Result<BucketOutcome, StoreError> {
        if spec.replenish_rate == 0 {
            return Err(StoreError::Malformed(
                "replenish rate must be positive".to_string(),
            ));
        }

        let (tokens_key, timestamp_key) = key.to_store_keys();
        let mut conn = self.conn.clone();

        let (allowed, tokens_left): (i64, String) = self
            .script
            .key(&tokens_key)
            .key(&timestamp_key)
            .arg(spec.replenish_rate)
            .arg(spec.capacity)
            .arg(spec.requested)
            .invoke_async(&mut conn)
            .await?;

        let tokens_left = tokens_left
            .parse::<f64>()
            .map_err(|_| StoreError::Malformed(tokens_left.clone()))?;

        Ok(BucketOutcome {
            allowed: allowed == 1,
            tokens_left,
        })
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
