//! Edge Upstreams - the customer and order services behind the gateway
//!
//! Customers are served as a JSON list over HTTP and orders as a gRPC server
//! stream per customer. Order data is generated from a seed so runs are
//! reproducible.

pub mod customers;
pub mod fixtures;
pub mod orders;

pub use fixtures::{CustomerCatalog, OrderFixtures};
