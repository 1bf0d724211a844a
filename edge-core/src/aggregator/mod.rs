//! Customer/order join
//!
//! Fetches the customer list once, then drains one order stream per customer
//! with bounded concurrency. Output follows the input customer order. A
//! failed order stream only affects its own customer; siblings keep running.
//! Dropping an aggregation drops every in-flight order stream with it.

use crate::config::{AggregationConfig, FailurePolicy};
use crate::domain::{Customer, CustomerOrders};
use crate::error::{AppError, RemoteError, Result};
use crate::upstream::{CustomerSource, OrderSource};
use futures::{stream::BoxStream, StreamExt};
use std::sync::Arc;

/// One customer's join result.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerOutcome {
    /// Orders are empty when `error` is set.
    pub record: CustomerOrders,
    pub error: Option<RemoteError>,
}

impl CustomerOutcome {
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Fully drained aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub records: Vec<CustomerOrders>,
    /// Customer ids whose order fetch failed, in input order
    pub failed_keys: Vec<i32>,
}

impl Aggregation {
    pub fn is_degraded(&self) -> bool {
        !self.failed_keys.is_empty()
    }
}

#[derive(Clone)]
pub struct Aggregator {
    customers: Arc<dyn CustomerSource>,
    orders: Arc<dyn OrderSource>,
    config: AggregationConfig,
}

impl Aggregator {
    pub fn new(
        customers: Arc<dyn CustomerSource>,
        orders: Arc<dyn OrderSource>,
        config: AggregationConfig,
    ) -> Self {
        Self {
            customers,
            orders,
            config,
        }
    }

    /// Fetch the customer list and return the lazy per-customer join.
    ///
    /// Fails without touching the order upstream when the customer list
    /// cannot be fetched.
    pub async fn stream(&self) -> Result<BoxStream<'static, CustomerOutcome>> {
        let customers = self.customers.fetch_all().await?;
        let limit = self
            .config
            .max_concurrency
            .unwrap_or(customers.len())
            .max(1);
        let orders = self.orders.clone();

        tracing::debug!(customers = customers.len(), limit, "Starting order fan-out");

        Ok(futures::stream::iter(customers)
            .map(move |customer| fetch_orders(orders.clone(), customer))
            .buffered(limit)
            .boxed())
    }

    /// Drain the join under the configured deadline and apply the failure
    /// policy.
    pub async fn aggregate(&self) -> Result<Aggregation> {
        let drain = async {
            let outcomes = self.stream().await?;
            Ok::<_, AppError>(outcomes.collect::<Vec<_>>().await)
        };

        let outcomes = tokio::time::timeout(self.config.timeout, drain)
            .await
            .map_err(|_| {
                tracing::warn!(timeout = ?self.config.timeout, "Aggregation deadline elapsed");
                AppError::AggregationTimeout
            })??;

        let mut records = Vec::with_capacity(outcomes.len());
        let mut failed_keys = Vec::new();
        for outcome in outcomes {
            if outcome.is_failed() {
                failed_keys.push(outcome.record.customer.id);
            }
            records.push(outcome.record);
        }

        if !failed_keys.is_empty() {
            metrics::counter!("edge_aggregation_partial_failures_total").increment(1);
            tracing::warn!(?failed_keys, policy = ?self.config.failure_policy, "Order fetch failed for some customers");
            if self.config.failure_policy == FailurePolicy::Fail {
                return Err(AppError::AggregationPartialFailure { failed_keys });
            }
        }

        Ok(Aggregation {
            records,
            failed_keys,
        })
    }
}

/// Drain one customer's order stream. Orders stay in emission order.
async fn fetch_orders(orders: Arc<dyn OrderSource>, customer: Customer) -> CustomerOutcome {
    let mut stream = orders.fetch_for(customer.id);
    let mut collected = Vec::new();

    while let Some(item) = stream.next().await {
        let failure = match item {
            Ok(order) if order.customer_id == customer.id => {
                collected.push(order);
                continue;
            }
            Ok(order) => RemoteError::protocol(
                crate::upstream::orders::UPSTREAM,
                format!(
                    "order {} belongs to customer {}, expected {}",
                    order.id, order.customer_id, customer.id
                ),
            ),
            Err(e) => e,
        };
        tracing::debug!(customer_id = customer.id, error = %failure, "Dropping orders for customer");
        return CustomerOutcome {
            record: CustomerOrders::without_orders(customer),
            error: Some(failure),
        };
    }

    CustomerOutcome {
        record: CustomerOrders::new(customer, collected),
        error: None,
    }
}
