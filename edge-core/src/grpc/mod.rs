//! gRPC order streaming contract

// Include generated protobuf code
pub mod proto {
    tonic::include_proto!("edge.orders.v1");
}

use crate::domain::Order;

impl From<proto::Order> for Order {
    fn from(order: proto::Order) -> Self {
        Self {
            id: order.id,
            customer_id: order.customer_id,
        }
    }
}

impl From<Order> for proto::Order {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            customer_id: order.customer_id,
        }
    }
}
