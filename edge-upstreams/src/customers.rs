//! HTTP customer collection upstream

use crate::fixtures::CustomerCatalog;
use anyhow::Context;
use axum::{extract::State, routing::get, Json, Router};
use edge_core::domain::Customer;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

async fn list_customers(State(catalog): State<Arc<CustomerCatalog>>) -> Json<Vec<Customer>> {
    Json(catalog.customers().to_vec())
}

pub fn router(catalog: CustomerCatalog) -> Router {
    Router::new()
        .route("/customers", get(list_customers))
        .with_state(Arc::new(catalog))
}

pub async fn serve(addr: SocketAddr, catalog: CustomerCatalog) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(customers = catalog.customers().len(), "Customers upstream listening on {}", addr);

    axum::serve(listener, router(catalog)).await?;
    Ok(())
}
