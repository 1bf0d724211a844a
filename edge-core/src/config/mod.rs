//! Configuration management for the edge gateway

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server host
    pub http_host: String,
    /// HTTP server port
    pub http_port: u16,
    /// Upstream client configuration
    pub upstream: UpstreamConfig,
    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
    /// Shared bucket store; `None` keeps buckets in process memory
    pub redis: Option<RedisConfig>,
    /// Aggregation configuration
    pub aggregation: AggregationConfig,
    /// Credentials and protected paths
    pub auth: AuthConfig,
    /// Static route table, evaluated in order
    pub routes: Vec<RouteDefinition>,
    /// Logging and metrics
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Full URL of the customer collection endpoint
    pub customers_url: String,
    /// Address of the order streaming service (e.g., http://localhost:8181)
    pub orders_addr: String,
    pub connect_timeout: Duration,
    /// Bound on one call. For streams this covers the open and every
    /// message up to the end of the stream.
    pub call_timeout: Duration,
    /// Concurrent calls allowed per client before waiting for a slot
    pub max_in_flight: usize,
    /// How long to wait for a slot before failing with `PoolExhausted`
    pub pool_acquire_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            customers_url: "http://localhost:8080/customers".to_string(),
            orders_addr: "http://localhost:8181".to_string(),
            connect_timeout: Duration::from_millis(2000),
            call_timeout: Duration::from_millis(5000),
            max_in_flight: 64,
            pool_acquire_timeout: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// What the rate limiter does with requests that carry no principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnauthenticatedPolicy {
    #[default]
    Permit,
    Reject,
}

impl FromStr for UnauthenticatedPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "permit" => Ok(UnauthenticatedPolicy::Permit),
            "reject" => Ok(UnauthenticatedPolicy::Reject),
            _ => Err(format!("Unknown unauthenticated policy: {}", s)),
        }
    }
}

/// Token bucket configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled
    pub enabled: bool,
    /// Bucket capacity (burst size)
    pub burst_capacity: u64,
    /// Tokens added per second
    pub replenish_rate: u64,
    /// Tokens consumed per request
    pub requested_tokens: u64,
    pub unauthenticated: UnauthenticatedPolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            burst_capacity: 5,
            replenish_rate: 2,
            requested_tokens: 1,
            unauthenticated: UnauthenticatedPolicy::Permit,
        }
    }
}

impl RateLimitConfig {
    /// Reject bucket parameters the token bucket cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.burst_capacity == 0 {
            bail!("RATE_LIMIT_BURST_CAPACITY must be positive");
        }
        if self.replenish_rate == 0 {
            bail!("RATE_LIMIT_REPLENISH_RATE must be positive");
        }
        if self.requested_tokens == 0 {
            bail!("RATE_LIMIT_REQUESTED_TOKENS must be positive");
        }
        if self.requested_tokens > self.burst_capacity {
            bail!(
                "RATE_LIMIT_REQUESTED_TOKENS ({}) exceeds RATE_LIMIT_BURST_CAPACITY ({})",
                self.requested_tokens,
                self.burst_capacity
            );
        }
        Ok(())
    }
}

/// Outcome of an aggregation where some per-customer fetches failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Emit the affected customers with no orders and report their keys
    #[default]
    Degrade,
    /// Fail the whole aggregation once every fetch has settled
    Fail,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "degrade" => Ok(FailurePolicy::Degrade),
            "fail" => Ok(FailurePolicy::Fail),
            _ => Err(format!("Unknown failure policy: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregationConfig {
    /// Maximum concurrent per-customer fetches; `None` is one per customer
    pub max_concurrency: Option<usize>,
    /// Deadline for a whole aggregation
    pub timeout: Duration,
    pub failure_policy: FailurePolicy,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            timeout: Duration::from_millis(10_000),
            failure_policy: FailurePolicy::Degrade,
        }
    }
}

/// A configured user. `password` is plaintext or `{argon2}<PHC string>`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserDefinition {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub users: Vec<UserDefinition>,
    /// Path patterns that require an authenticated principal
    pub protected_paths: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            users: vec![UserDefinition {
                username: "jlong".to_string(),
                password: "pw".to_string(),
                roles: vec!["USER".to_string()],
            }],
            protected_paths: vec!["/proxy".to_string()],
        }
    }
}

/// One entry of the route table as configured.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteDefinition {
    pub id: String,
    pub path: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub filters: Vec<FilterDefinition>,
    pub uri: String,
}

/// Filters available to a route, applied in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "name")]
pub enum FilterDefinition {
    SetPath { template: String },
    StripPrefix { parts: usize },
    RequestRateLimiter,
}

fn default_routes() -> Vec<RouteDefinition> {
    vec![RouteDefinition {
        id: "proxy".to_string(),
        path: "/proxy".to_string(),
        host: Some("*.spring.io".to_string()),
        filters: vec![
            FilterDefinition::SetPath {
                template: "/customers".to_string(),
            },
            FilterDefinition::RequestRateLimiter,
        ],
        uri: "http://localhost:8080/".to_string(),
    }]
}

/// Parse a JSON route table
pub fn parse_routes(json: &str) -> Result<Vec<RouteDefinition>> {
    serde_json::from_str(json).context("Invalid EDGE_ROUTES")
}

/// Parse a JSON credential set
pub fn parse_users(json: &str) -> Result<Vec<UserDefinition>> {
    serde_json::from_str(json).context("Invalid EDGE_USERS")
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// "text" or "json"
    pub log_format: String,
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            metrics_enabled: true,
        }
    }
}

fn env_millis(name: &str, default: u64) -> Duration {
    Duration::from_millis(
        env::var(name)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default),
    )
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|s| s.to_lowercase() == "true")
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config = Self {
            http_host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "9999".to_string())
                .parse()
                .context("Invalid HTTP_PORT")?,
            upstream: UpstreamConfig {
                customers_url: env::var("CUSTOMERS_URL")
                    .unwrap_or_else(|_| "http://localhost:8080/customers".to_string()),
                orders_addr: env::var("ORDERS_ADDR")
                    .unwrap_or_else(|_| "http://localhost:8181".to_string()),
                connect_timeout: env_millis("UPSTREAM_CONNECT_TIMEOUT_MS", 2000),
                call_timeout: env_millis("UPSTREAM_CALL_TIMEOUT_MS", 5000),
                max_in_flight: env::var("UPSTREAM_MAX_IN_FLIGHT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(64),
                pool_acquire_timeout: env_millis("UPSTREAM_POOL_ACQUIRE_TIMEOUT_MS", 1000),
            },
            rate_limit: RateLimitConfig {
                enabled: env_flag("RATE_LIMIT_ENABLED", true),
                burst_capacity: env::var("RATE_LIMIT_BURST_CAPACITY")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                replenish_rate: env::var("RATE_LIMIT_REPLENISH_RATE")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
                requested_tokens: env::var("RATE_LIMIT_REQUESTED_TOKENS")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()
                    .unwrap_or(1),
                unauthenticated: env::var("RATE_LIMIT_UNAUTHENTICATED")
                    .ok()
                    .map(|s| s.parse::<UnauthenticatedPolicy>())
                    .transpose()
                    .map_err(anyhow::Error::msg)
                    .context("Invalid RATE_LIMIT_UNAUTHENTICATED")?
                    .unwrap_or_default(),
            },
            redis: env::var("REDIS_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(|url| RedisConfig { url }),
            aggregation: AggregationConfig {
                max_concurrency: env::var("AGGREGATION_MAX_CONCURRENCY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|n: &usize| *n > 0),
                timeout: env_millis("AGGREGATION_TIMEOUT_MS", 10_000),
                failure_policy: env::var("AGGREGATION_FAILURE_POLICY")
                    .ok()
                    .map(|s| s.parse::<FailurePolicy>())
                    .transpose()
                    .map_err(anyhow::Error::msg)
                    .context("Invalid AGGREGATION_FAILURE_POLICY")?
                    .unwrap_or_default(),
            },
            auth: AuthConfig {
                users: match env::var("EDGE_USERS") {
                    Ok(json) => parse_users(&json)?,
                    Err(_) => AuthConfig::default().users,
                },
                protected_paths: env::var("EDGE_PROTECTED_PATHS")
                    .map(|s| {
                        s.split(',')
                            .map(|p| p.trim().to_string())
                            .filter(|p| !p.is_empty())
                            .collect()
                    })
                    .unwrap_or_else(|_| AuthConfig::default().protected_paths),
            },
            routes: match env::var("EDGE_ROUTES") {
                Ok(json) => parse_routes(&json)?,
                Err(_) => default_routes(),
            },
            telemetry: TelemetryConfig {
                log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
                metrics_enabled: env_flag("METRICS_ENABLED", true),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that parsing alone cannot catch
    pub fn validate(&self) -> Result<()> {
        self.rate_limit
            .validate()
            .context("Invalid rate limit configuration")
    }

    /// Get HTTP server address
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_host: "0.0.0.0".to_string(),
            http_port: 9999,
            upstream: UpstreamConfig::default(),
            rate_limit: RateLimitConfig::default(),
            redis: None,
            aggregation: AggregationConfig::default(),
            auth: AuthConfig::default(),
            routes: default_routes(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_addresses() {
        let mut config = Config::default();
        config.http_host = "127.0.0.1".to_string();

        assert_eq!(config.http_addr(), "127.0.0.1:9999");
    }

    #[test]
    fn test_config_http_addr_ipv6() {
        let mut config = Config::default();
        config.http_host = "::1".to_string();
        config.http_port = 3000;

        assert_eq!(config.http_addr(), "::1:3000");
    }

    #[test]
    fn test_rate_limit_defaults_match_burst_and_rate() {
        let config = RateLimitConfig::default();
        assert!(config.enabled);
        assert_eq!(config.burst_capacity, 5);
        assert_eq!(config.replenish_rate, 2);
        assert_eq!(config.requested_tokens, 1);
        assert_eq!(config.unauthenticated, UnauthenticatedPolicy::Permit);
    }

    #[test]
    fn test_aggregation_defaults() {
        let config = AggregationConfig::default();
        assert_eq!(config.max_concurrency, None);
        assert_eq!(config.failure_policy, FailurePolicy::Degrade);
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_rate_limit_validation() {
        assert!(RateLimitConfig::default().validate().is_ok());

        let zero_rate = RateLimitConfig {
            replenish_rate: 0,
            ..RateLimitConfig::default()
        };
        assert!(zero_rate.validate().is_err());

        let zero_capacity = RateLimitConfig {
            burst_capacity: 0,
            ..RateLimitConfig::default()
        };
        assert!(zero_capacity.validate().is_err());

        let free_requests = RateLimitConfig {
            requested_tokens: 0,
            ..RateLimitConfig::default()
        };
        assert!(free_requests.validate().is_err());

        let oversized = RateLimitConfig {
            requested_tokens: 6,
            ..RateLimitConfig::default()
        };
        let err = oversized.validate().unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn test_config_validation_names_section() {
        let mut config = Config::default();
        config.rate_limit.replenish_rate = 0;

        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "Invalid rate limit configuration");
        assert!(format!("{:#}", err).contains("RATE_LIMIT_REPLENISH_RATE"));
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("FAIL".parse::<FailurePolicy>().unwrap(), FailurePolicy::Fail);
        assert_eq!("degrade".parse::<FailurePolicy>().unwrap(), FailurePolicy::Degrade);
        assert!("sometimes".parse::<FailurePolicy>().is_err());

        assert_eq!(
            "reject".parse::<UnauthenticatedPolicy>().unwrap(),
            UnauthenticatedPolicy::Reject
        );
        assert!("maybe".parse::<UnauthenticatedPolicy>().is_err());
    }

    #[test]
    fn test_default_route_table() {
        let routes = default_routes();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].path, "/proxy");
        assert_eq!(routes[0].host.as_deref(), Some("*.spring.io"));
        assert_eq!(
            routes[0].filters,
            vec![
                FilterDefinition::SetPath {
                    template: "/customers".to_string()
                },
                FilterDefinition::RequestRateLimiter,
            ]
        );
    }

    #[test]
    fn test_parse_routes() {
        let routes = parse_routes(
            r#"[{
                "id": "orders",
                "path": "/api/orders/**",
                "filters": [{"name": "StripPrefix", "parts": 1}, {"name": "RequestRateLimiter"}],
                "uri": "http://orders.internal:8080"
            }]"#,
        )
        .unwrap();

        assert_eq!(routes[0].id, "orders");
        assert!(routes[0].host.is_none());
        assert_eq!(routes[0].filters[0], FilterDefinition::StripPrefix { parts: 1 });
    }

    #[test]
    fn test_parse_routes_rejects_unknown_filter() {
        let result = parse_routes(
            r#"[{"id": "x", "path": "/x", "filters": [{"name": "Retry"}], "uri": "http://x"}]"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_users_defaults_roles() {
        let users = parse_users(r#"[{"username": "ops", "password": "secret"}]"#).unwrap();
        assert_eq!(users[0].username, "ops");
        assert!(users[0].roles.is_empty());
    }
}
