//! Typed clients for the two upstream services.
//!
//! Both clients fold every transport failure into [`RemoteError`] and never
//! retry. Each client owns a fixed number of call slots; a caller that cannot
//! get a slot within the acquire timeout fails with `PoolExhausted`.

pub mod customers;
pub mod orders;

pub use customers::HttpCustomerClient;
pub use orders::GrpcOrderClient;

use crate::domain::{Customer, Order};
use crate::error::RemoteError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::{sync::Arc, time::Duration};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Lazy, finite, single-use sequence of one customer's orders.
pub type OrderStream = BoxStream<'static, Result<Order, RemoteError>>;

/// Request/response client for the customer collection
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CustomerSource: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<Customer>, RemoteError>;
}

/// Streaming client for one customer's orders
#[cfg_attr(test, mockall::automock)]
pub trait OrderSource: Send + Sync {
    /// Nothing is sent until the stream is first polled. Dropping the stream
    /// cancels the call.
    fn fetch_for(&self, customer_id: i32) -> OrderStream;
}

/// Bounded set of concurrent call slots for one upstream.
#[derive(Clone)]
pub struct CallSlots {
    upstream: Arc<str>,
    semaphore: Arc<Semaphore>,
    acquire_timeout: Duration,
}

impl CallSlots {
    pub fn new(upstream: &str, max_in_flight: usize, acquire_timeout: Duration) -> Self {
        Self {
            upstream: upstream.into(),
            semaphore: Arc::new(Semaphore::new(max_in_flight.max(1))),
            acquire_timeout,
        }
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a free slot. The slot is released when the permit drops.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, RemoteError> {
        match tokio::time::timeout(self.acquire_timeout, self.semaphore.clone().acquire_owned())
            .await
        {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(RemoteError::connection_failed(
                self.upstream.as_ref(),
                "client is shut down",
            )),
            Err(_) => Err(RemoteError::pool_exhausted(self.upstream.as_ref())),
        }
    }
}

/// Map a `reqwest` failure onto the remote error taxonomy
pub fn classify_reqwest_error(upstream: &str, err: &reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::timeout(upstream, err.to_string())
    } else if err.is_connect() {
        RemoteError::connection_failed(upstream, err.to_string())
    } else {
        RemoteError::protocol(upstream, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteErrorKind;

    #[tokio::test(start_paused = true)]
    async fn test_slots_exhausted_after_timeout() {
        let slots = CallSlots::new("orders", 1, Duration::from_millis(100));
        let held = slots.acquire().await.unwrap();
        assert_eq!(slots.available(), 0);

        let err = slots.acquire().await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::PoolExhausted);
        assert_eq!(err.upstream, "orders");

        drop(held);
        assert!(slots.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_zero_slots_still_allows_one_call() {
        let slots = CallSlots::new("customers", 0, Duration::from_millis(10));
        assert!(slots.acquire().await.is_ok());
    }
}
