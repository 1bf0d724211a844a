//! HTTP Basic authentication gate
//!
//! Valid credentials attach a [`Principal`] to the request extensions on any
//! path. Invalid credentials are always rejected. Requests without
//! credentials only pass on paths that are not protected.

use crate::auth::{CredentialStore, Principal};
use crate::error::AppError;
use crate::gateway::PathPattern;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, Extensions, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::sync::Arc;

/// Shared state for the authentication gate
#[derive(Clone)]
pub struct AuthGate {
    credentials: CredentialStore,
    protected: Arc<[PathPattern]>,
}

impl AuthGate {
    pub fn new(credentials: CredentialStore, protected_paths: &[String]) -> anyhow::Result<Self> {
        let protected = protected_paths
            .iter()
            .map(|p| PathPattern::parse(p))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self {
            credentials,
            protected: protected.into(),
        })
    }

    pub fn is_protected(&self, path: &str) -> bool {
        self.protected.iter().any(|p| p.matches(path))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Credentials {
    Missing,
    Malformed,
    Basic { username: String, password: String },
}

/// Read Basic credentials from the Authorization header
fn extract_basic_credentials(headers: &HeaderMap) -> Credentials {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Credentials::Missing;
    };
    let Ok(value) = value.to_str() else {
        return Credentials::Malformed;
    };
    let Some((scheme, encoded)) = value.trim().split_once(' ') else {
        return Credentials::Malformed;
    };
    if !scheme.eq_ignore_ascii_case("basic") {
        return Credentials::Malformed;
    }

    let decoded = match STANDARD.decode(encoded.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return Credentials::Malformed,
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return Credentials::Malformed;
    };
    match decoded.split_once(':') {
        Some((username, password)) => Credentials::Basic {
            username: username.to_string(),
            password: password.to_string(),
        },
        None => Credentials::Malformed,
    }
}

/// Authentication middleware
pub async fn basic_auth_middleware(
    State(gate): State<AuthGate>,
    mut request: Request,
    next: Next,
) -> Response {
    match extract_basic_credentials(request.headers()) {
        Credentials::Basic { username, password } => {
            match gate.credentials.authenticate(&username, &password) {
                Some(principal) => {
                    request.extensions_mut().insert(principal);
                }
                None => {
                    tracing::debug!(user = %username, "Rejected invalid credentials");
                    return AppError::AuthRequired.into_response();
                }
            }
        }
        Credentials::Malformed => {
            return AppError::AuthRequired.into_response();
        }
        Credentials::Missing => {
            if gate.is_protected(request.uri().path()) {
                return AppError::AuthRequired.into_response();
            }
        }
    }

    next.run(request).await
}

/// Principal attached by [`basic_auth_middleware`], if any
pub fn principal_of(extensions: &Extensions) -> Option<&Principal> {
    extensions.get::<Principal>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_extract_basic_credentials() {
        // jlong:pw
        let headers = headers_with("Basic amxvbmc6cHc=");
        assert_eq!(
            extract_basic_credentials(&headers),
            Credentials::Basic {
                username: "jlong".to_string(),
                password: "pw".to_string()
            }
        );
    }

    #[test]
    fn test_password_may_contain_colon() {
        let encoded = STANDARD.encode("ops:a:b");
        let headers = headers_with(&format!("basic {}", encoded));
        assert_eq!(
            extract_basic_credentials(&headers),
            Credentials::Basic {
                username: "ops".to_string(),
                password: "a:b".to_string()
            }
        );
    }

    #[test]
    fn test_missing_and_malformed() {
        assert_eq!(extract_basic_credentials(&HeaderMap::new()), Credentials::Missing);
        assert_eq!(
            extract_basic_credentials(&headers_with("Bearer abc")),
            Credentials::Malformed
        );
        assert_eq!(
            extract_basic_credentials(&headers_with("Basic !!!")),
            Credentials::Malformed
        );
        let no_colon = STANDARD.encode("jlong");
        assert_eq!(
            extract_basic_credentials(&headers_with(&format!("Basic {}", no_colon))),
            Credentials::Malformed
        );
    }

    #[test]
    fn test_protected_paths() {
        let gate = AuthGate::new(CredentialStore::default(), &["/proxy".to_string()]).unwrap();
        assert!(gate.is_protected("/proxy"));
        assert!(gate.is_protected("/proxy/"));
        assert!(!gate.is_protected("/cos"));
    }
}
