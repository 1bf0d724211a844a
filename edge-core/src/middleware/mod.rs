//! HTTP middleware for the edge gateway
//!
//! - Basic authentication gate that attaches the caller's principal
//! - Request ID propagation and HTTP metrics
//! - Log-safe request spans

pub mod auth;
pub mod metrics;
pub mod trace;

pub use auth::{basic_auth_middleware, principal_of, AuthGate};
pub use metrics::ObservabilityLayer;
pub use trace::SanitizedMakeSpan;
