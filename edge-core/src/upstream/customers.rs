//! HTTP client for the customer collection upstream

use super::{classify_reqwest_error, CallSlots, CustomerSource};
use crate::config::UpstreamConfig;
use crate::domain::Customer;
use crate::error::RemoteError;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;

pub const UPSTREAM: &str = "customers";

#[derive(Clone)]
pub struct HttpCustomerClient {
    http_client: Client,
    url: String,
    slots: CallSlots,
}

impl HttpCustomerClient {
    /// Create a client with its own connection pool
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.call_timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self::with_client(http_client, config))
    }

    /// Create a client sharing an existing connection pool
    pub fn with_client(http_client: Client, config: &UpstreamConfig) -> Self {
        Self {
            http_client,
            url: config.customers_url.clone(),
            slots: CallSlots::new(UPSTREAM, config.max_in_flight, config.pool_acquire_timeout),
        }
    }

    async fn fetch(&self) -> Result<Vec<Customer>, RemoteError> {
        let _slot = self.slots.acquire().await?;

        let response = self
            .http_client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| classify_reqwest_error(UPSTREAM, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::protocol(
                UPSTREAM,
                format!("unexpected status {}", status),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| classify_reqwest_error(UPSTREAM, &e))?;

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&body)
            .map_err(|e| RemoteError::protocol(UPSTREAM, format!("malformed body: {}", e)))
    }
}

#[async_trait]
impl CustomerSource for HttpCustomerClient {
    async fn fetch_all(&self) -> Result<Vec<Customer>, RemoteError> {
        let result = self.fetch().await;
        match &result {
            Ok(customers) => tracing::debug!(count = customers.len(), "Fetched customers"),
            Err(e) => {
                tracing::warn!(error = %e, "Customer fetch failed");
                e.record();
            }
        }
        result
    }
}
