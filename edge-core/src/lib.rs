//! Edge Core - authenticating, rate-limiting edge gateway
//!
//! Serves a customer list, a customer/order join and a GraphQL view over two
//! upstreams (customers over HTTP, orders over gRPC streaming), and forwards
//! everything else through a static route table.

pub mod aggregator;
pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod graphql;
pub mod grpc;
pub mod middleware;
pub mod rate_limit;
pub mod server;
pub mod state;
pub mod telemetry;
pub mod upstream;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
