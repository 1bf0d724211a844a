//! Route table and per-route filter pipeline.
//!
//! Routes are compiled once from configuration and never change. The first
//! route whose path and host patterns both match a request wins; its filters
//! then run in declaration order.

pub mod pattern;
pub mod proxy;

pub use pattern::{has_dot_segments, HostPattern, PathPattern};
pub use proxy::proxy_handler;

use crate::auth::Principal;
use crate::config::{FilterDefinition, RouteDefinition, UnauthenticatedPolicy};
use crate::error::{AppError, Result};
use crate::rate_limit::{RateLimitDecision, RateLimitKey, RateLimiter};
use anyhow::{anyhow, Context};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use url::Url;

/// A compiled route filter
#[derive(Debug, Clone)]
pub enum Filter {
    /// Replace the path; `{var}` placeholders take values captured by the
    /// route's path pattern
    SetPath { template: String },
    /// Drop the first `parts` path segments
    StripPrefix { parts: usize },
    /// Consume a token from the caller's bucket
    RequestRateLimiter,
}

impl From<&FilterDefinition> for Filter {
    fn from(def: &FilterDefinition) -> Self {
        match def {
            FilterDefinition::SetPath { template } => Filter::SetPath {
                template: template.clone(),
            },
            FilterDefinition::StripPrefix { parts } => Filter::StripPrefix { parts: *parts },
            FilterDefinition::RequestRateLimiter => Filter::RequestRateLimiter,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Route {
    pub id: String,
    pub path: PathPattern,
    pub host: Option<HostPattern>,
    pub filters: Vec<Filter>,
    pub uri: Url,
}

impl Route {
    pub fn compile(def: &RouteDefinition) -> anyhow::Result<Self> {
        let uri = Url::parse(&def.uri).with_context(|| format!("Invalid uri for route '{}'", def.id))?;
        if !matches!(uri.scheme(), "http" | "https") {
            return Err(anyhow!("Route '{}' must target http or https", def.id));
        }
        Ok(Self {
            id: def.id.clone(),
            path: PathPattern::parse(&def.path)?,
            host: def.host.as_deref().map(HostPattern::parse).transpose()?,
            filters: def.filters.iter().map(Filter::from).collect(),
            uri,
        })
    }

    pub fn matches(&self, path: &str, host: Option<&str>) -> bool {
        let host_ok = match (&self.host, host) {
            (None, _) => true,
            (Some(pattern), Some(host)) => pattern.matches(host),
            (Some(_), None) => false,
        };
        host_ok && self.path.matches(path)
    }
}

/// Ordered, immutable set of routes
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Arc<[Route]>,
}

impl RouteTable {
    pub fn compile(defs: &[RouteDefinition]) -> anyhow::Result<Self> {
        let mut seen = HashSet::new();
        let mut routes = Vec::with_capacity(defs.len());
        for def in defs {
            if !seen.insert(def.id.as_str()) {
                return Err(anyhow!("Duplicate route id '{}'", def.id));
            }
            routes.push(Route::compile(def)?);
        }
        Ok(Self {
            routes: routes.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// First route matching both path and host
    pub fn find(&self, path: &str, host: Option<&str>) -> Option<&Route> {
        self.routes.iter().find(|r| r.matches(path, host))
    }
}

/// Where a matched request goes
#[derive(Debug, Clone)]
pub struct Forward {
    pub route_id: String,
    pub destination: Url,
    /// Set when a rate-limit filter admitted the request
    pub rate_limit: Option<RateLimitDecision>,
}

/// Request attributes the gateway routes on
#[derive(Debug, Clone, Copy)]
pub struct RouteRequest<'a> {
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub host: Option<&'a str>,
    pub principal: Option<&'a Principal>,
}

#[derive(Clone)]
pub struct Gateway {
    table: RouteTable,
    limiter: RateLimiter,
}

impl Gateway {
    pub fn new(table: RouteTable, limiter: RateLimiter) -> Self {
        Self { table, limiter }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Match the request and run the route's filters.
    pub async fn route(&self, request: RouteRequest<'_>) -> Result<Forward> {
        if has_dot_segments(request.path) {
            return Err(AppError::BadRequest("path contains dot segments".to_string()));
        }

        let route = self
            .table
            .find(request.path, request.host)
            .ok_or(AppError::RouteNotFound)?;
        let variables = route.path.captures(request.path).unwrap_or_default();

        let mut path = request.path.to_string();
        let mut rate_limit = None;

        for filter in &route.filters {
            match filter {
                Filter::SetPath { template } => {
                    path = expand_template(template, &variables);
                }
                Filter::StripPrefix { parts } => {
                    path = strip_prefix(&path, *parts);
                }
                Filter::RequestRateLimiter => {
                    rate_limit = self.check_rate_limit(&route.id, request.principal).await?;
                }
            }
        }

        let mut destination = route.uri.clone();
        destination.set_path(&path);
        destination.set_query(request.query);

        tracing::debug!(route = %route.id, destination = %destination, "Route matched");

        Ok(Forward {
            route_id: route.id.clone(),
            destination,
            rate_limit,
        })
    }

    async fn check_rate_limit(
        &self,
        route_id: &str,
        principal: Option<&Principal>,
    ) -> Result<Option<RateLimitDecision>> {
        let Some(principal) = principal else {
            return match self.limiter.unauthenticated_policy() {
                UnauthenticatedPolicy::Permit => {
                    tracing::debug!(route = %route_id, "No rate limit key, request permitted");
                    Ok(None)
                }
                UnauthenticatedPolicy::Reject => Err(AppError::AuthRequired),
            };
        };

        let decision = self.limiter.allow(&RateLimitKey::new(&principal.name)).await;
        if decision.permitted {
            Ok(Some(decision))
        } else {
            Err(AppError::RateLimited {
                retry_after: decision.retry_after_secs(),
            })
        }
    }
}

/// Substitute `{name}` placeholders in one left-to-right pass. Substituted
/// values are never expanded again; unknown placeholders stay as written.
fn expand_template(template: &str, variables: &HashMap<String, String>) -> String {
    let mut expanded = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        expanded.push_str(&rest[..open]);
        let placeholder = &rest[open..];
        let Some(close) = placeholder.find('}') else {
            expanded.push_str(placeholder);
            return expanded;
        };
        match variables.get(&placeholder[1..close]) {
            Some(value) => expanded.push_str(value),
            None => expanded.push_str(&placeholder[..=close]),
        }
        rest = &placeholder[close + 1..];
    }
    expanded.push_str(rest);
    expanded
}

fn strip_prefix(path: &str, parts: usize) -> String {
    let rest: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .skip(parts)
        .collect();
    let mut stripped = format!("/{}", rest.join("/"));
    if path.ends_with('/') && !rest.is_empty() {
        stripped.push('/');
    }
    stripped
}
