//! Application state shared across handlers
//!
//! Every component is built once at startup and passed in explicitly. Tests
//! build the same state around mock upstreams.

use crate::aggregator::Aggregator;
use crate::config::AggregationConfig;
use crate::gateway::Gateway;
use crate::graphql::{build_schema, CrmSchema, GraphSources};
use crate::upstream::{CustomerSource, OrderSource};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub customers: Arc<dyn CustomerSource>,
    pub aggregator: Aggregator,
    pub schema: CrmSchema,
    pub gateway: Gateway,
    /// Shared pool for proxied requests
    pub http_client: reqwest::Client,
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        aggregation: AggregationConfig,
        customers: Arc<dyn CustomerSource>,
        orders: Arc<dyn OrderSource>,
        gateway: Gateway,
        http_client: reqwest::Client,
    ) -> Self {
        let aggregator = Aggregator::new(customers.clone(), orders.clone(), aggregation);
        let schema = build_schema(GraphSources {
            customers: customers.clone(),
            orders,
        });
        Self {
            customers,
            aggregator,
            schema,
            gateway,
            http_client,
            prometheus: None,
        }
    }

    pub fn with_prometheus(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.prometheus = handle;
        self
    }
}
