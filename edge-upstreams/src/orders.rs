//! gRPC order streaming upstream

use crate::fixtures::OrderFixtures;
use edge_core::grpc::proto::{
    self,
    order_service_server::{OrderService, OrderServiceServer},
    OrdersForRequest,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tonic::{transport::Server, Request, Response, Status};
use tracing::{debug, info};

pub struct OrderStreamService {
    fixtures: Arc<OrderFixtures>,
}

impl OrderStreamService {
    pub fn new(fixtures: OrderFixtures) -> Self {
        Self {
            fixtures: Arc::new(fixtures),
        }
    }

    pub fn into_server(self) -> OrderServiceServer<Self> {
        OrderServiceServer::new(self)
    }
}

#[tonic::async_trait]
impl OrderService for OrderStreamService {
    type OrdersForStream =
        tokio_stream::Iter<std::vec::IntoIter<Result<proto::Order, Status>>>;

    async fn orders_for(
        &self,
        request: Request<OrdersForRequest>,
    ) -> Result<Response<Self::OrdersForStream>, Status> {
        let customer_id = request.into_inner().customer_id;
        let orders: Vec<_> = self
            .fixtures
            .orders_for(customer_id)
            .iter()
            .map(|order| Ok(proto::Order::from(*order)))
            .collect();
        debug!(customer_id, orders = orders.len(), "Streaming orders");

        Ok(Response::new(tokio_stream::iter(orders)))
    }
}

pub async fn serve(addr: SocketAddr, fixtures: OrderFixtures) -> anyhow::Result<()> {
    info!(orders = fixtures.total(), "Orders upstream listening on {}", addr);

    Server::builder()
        .add_service(OrderStreamService::new(fixtures).into_server())
        .serve(addr)
        .await?;
    Ok(())
}
