//! REST handlers for the query surfaces and operational endpoints

pub mod crm;
pub mod health;
pub mod metrics;

/// Response header listing customer ids whose orders could not be fetched
pub const FAILED_KEYS_HEADER: &str = "x-aggregation-failed-keys";
