//! gRPC client for the order streaming upstream

use super::{CallSlots, OrderSource, OrderStream};
use crate::config::UpstreamConfig;
use crate::error::RemoteError;
use crate::grpc::proto::{order_service_client::OrderServiceClient, OrdersForRequest};
use anyhow::Context;
use futures::{stream, StreamExt};
use std::time::Duration;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::Instant;
use tonic::{transport::Channel, transport::Endpoint, Code, Status, Streaming};

pub const UPSTREAM: &str = "orders";

fn status_to_remote(status: Status) -> RemoteError {
    match status.code() {
        Code::Unavailable => RemoteError::connection_failed(UPSTREAM, status.message()),
        // Cancelled is what the channel reports when the grpc-timeout elapses
        Code::DeadlineExceeded | Code::Cancelled => RemoteError::timeout(UPSTREAM, status.message()),
        code => RemoteError::protocol(UPSTREAM, format!("{:?}: {}", code, status.message())),
    }
}

/// Multiplexes every call over one HTTP/2 channel.
#[derive(Clone)]
pub struct GrpcOrderClient {
    client: OrderServiceClient<Channel>,
    call_timeout: Duration,
    slots: CallSlots,
}

impl GrpcOrderClient {
    /// Build a client whose channel connects on first use.
    pub fn connect_lazy(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let endpoint = Endpoint::from_shared(config.orders_addr.clone())
            .with_context(|| format!("Invalid ORDERS_ADDR '{}'", config.orders_addr))?
            .connect_timeout(config.connect_timeout)
            .tcp_nodelay(true);
        Ok(Self::new(endpoint.connect_lazy(), config))
    }

    pub fn new(channel: Channel, config: &UpstreamConfig) -> Self {
        Self {
            client: OrderServiceClient::new(channel),
            call_timeout: config.call_timeout,
            slots: CallSlots::new(UPSTREAM, config.max_in_flight, config.pool_acquire_timeout),
        }
    }

    async fn open(
        mut client: OrderServiceClient<Channel>,
        slots: CallSlots,
        call_timeout: Duration,
        customer_id: i32,
    ) -> Result<(OwnedSemaphorePermit, Streaming<crate::grpc::proto::Order>, Instant), RemoteError>
    {
        let slot = slots.acquire().await?;
        let deadline = Instant::now() + call_timeout;

        let mut request = tonic::Request::new(OrdersForRequest { customer_id });
        request.set_timeout(call_timeout);

        let response = tokio::time::timeout_at(deadline, client.orders_for(request))
            .await
            .map_err(|_| RemoteError::timeout(UPSTREAM, "stream did not open in time"))?
            .map_err(status_to_remote)?;
        Ok((slot, response.into_inner(), deadline))
    }
}

/// Drain `messages` until `deadline`. The slot is held until the stream
/// ends or is dropped.
fn drain(
    slot: OwnedSemaphorePermit,
    messages: Streaming<crate::grpc::proto::Order>,
    deadline: Instant,
) -> OrderStream {
    stream::unfold(Some((slot, messages)), move |state| async move {
        let (slot, mut messages) = state?;
        match tokio::time::timeout_at(deadline, messages.message()).await {
            Ok(Ok(Some(order))) => Some((Ok(order.into()), Some((slot, messages)))),
            Ok(Ok(None)) => None,
            Ok(Err(status)) => Some((Err(status_to_remote(status)), None)),
            Err(_) => Some((
                Err(RemoteError::timeout(UPSTREAM, "stream did not complete within call timeout")),
                None,
            )),
        }
    })
    .boxed()
}

impl OrderSource for GrpcOrderClient {
    fn fetch_for(&self, customer_id: i32) -> OrderStream {
        let call_timeout = self.call_timeout;
        let opened = Self::open(self.client.clone(), self.slots.clone(), call_timeout, customer_id);

        stream::once(opened)
            .flat_map(move |opened| match opened {
                Ok((slot, messages, deadline)) => drain(slot, messages, deadline),
                Err(e) => stream::once(async move { Err(e) }).boxed(),
            })
            .inspect(move |item| {
                if let Err(e) = item {
                    tracing::warn!(customer_id, error = %e, "Order stream failed");
                    e.record();
                }
            })
            .boxed()
    }
}
