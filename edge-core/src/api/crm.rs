//! Customer and customer-orders endpoints

use super::FAILED_KEYS_HEADER;
use crate::domain::{Customer, CustomerOrders};
use crate::error::Result;
use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue},
    Json,
};

/// GET /customers
pub async fn list_customers(State(state): State<AppState>) -> Result<Json<Vec<Customer>>> {
    let customers = state.customers.fetch_all().await?;
    Ok(Json(customers))
}

/// GET /cos
///
/// Degraded results still return 200 and name the failed customer ids in a
/// response header.
pub async fn list_customer_orders(
    State(state): State<AppState>,
) -> Result<(HeaderMap, Json<Vec<CustomerOrders>>)> {
    let aggregation = state.aggregator.aggregate().await?;

    let mut headers = HeaderMap::new();
    if aggregation.is_degraded() {
        let keys = aggregation
            .failed_keys
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(",");
        if let Ok(value) = HeaderValue::from_str(&keys) {
            headers.insert(FAILED_KEYS_HEADER, value);
        }
    }

    Ok((headers, Json(aggregation.records)))
}
