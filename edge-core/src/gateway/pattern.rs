//! Path and host patterns used by the route table and the auth gate.

use anyhow::{anyhow, Result};
use regex::Regex;
use std::collections::HashMap;

/// Returns `true` if any path segment is `.` or `..`, percent-encoded or not.
pub fn has_dot_segments(path: &str) -> bool {
    path.split('/').any(|seg| {
        let decoded = urlencoding::decode_binary(seg.as_bytes());
        matches!(&*decoded, b"." | b"..")
    })
}

/// Request path pattern.
///
/// Segments are literals, `{name}` (one segment, captured), `*` (one
/// segment) or a final `**` (zero or more segments). A trailing slash on the
/// request path is tolerated.
#[derive(Debug, Clone)]
pub struct PathPattern {
    regex: Regex,
    variables: Vec<String>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        if !pattern.starts_with('/') {
            return Err(anyhow!("Path pattern must start with '/': {}", pattern));
        }

        let segments: Vec<&str> = pattern[1..]
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        let mut expr = String::from("^");
        let mut variables = Vec::new();

        for (i, segment) in segments.iter().enumerate() {
            match *segment {
                "**" => {
                    if i + 1 != segments.len() {
                        return Err(anyhow!("'**' must be the last segment: {}", pattern));
                    }
                    expr.push_str("(?:/.*)?");
                }
                "*" => expr.push_str("/[^/]+"),
                s if s.starts_with('{') && s.ends_with('}') => {
                    let name = &s[1..s.len() - 1];
                    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                        return Err(anyhow!("Invalid path variable '{}' in {}", s, pattern));
                    }
                    expr.push_str(&format!("/(?P<{}>[^/]+)", name));
                    variables.push(name.to_string());
                }
                s => {
                    expr.push('/');
                    expr.push_str(&regex::escape(s));
                }
            }
        }
        expr.push_str("/?$");

        let regex = Regex::new(&expr).map_err(|e| anyhow!("Invalid path pattern {}: {}", pattern, e))?;
        Ok(Self { regex, variables })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Variables captured from `path`, or `None` when it does not match
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let caps = self.regex.captures(path)?;
        Some(
            self.variables
                .iter()
                .filter_map(|name| caps.name(name).map(|m| (name.clone(), m.as_str().to_string())))
                .collect(),
        )
    }
}

/// Host header pattern; `*` matches one DNS label, `**` one or more.
#[derive(Debug, Clone)]
pub struct HostPattern {
    regex: Regex,
}

impl HostPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(anyhow!("Host pattern must not be empty"));
        }
        let labels: Vec<String> = pattern
            .to_ascii_lowercase()
            .split('.')
            .map(|label| match label {
                "**" => r"[^.]+(?:\.[^.]+)*".to_string(),
                "*" => "[^.]+".to_string(),
                l => regex::escape(l),
            })
            .collect();
        let expr = format!("^{}$", labels.join(r"\."));
        let regex = Regex::new(&expr).map_err(|e| anyhow!("Invalid host pattern {}: {}", pattern, e))?;
        Ok(Self { regex })
    }

    /// Match a `Host` header value; any port is ignored.
    pub fn matches(&self, host: &str) -> bool {
        self.regex.is_match(&strip_port(host).to_ascii_lowercase())
    }
}

fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        // bracketed IPv6 literal
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}
