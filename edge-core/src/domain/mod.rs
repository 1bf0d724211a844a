//! Domain models for the edge gateway

pub mod crm;

pub use crm::*;
