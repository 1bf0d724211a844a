//! Order streaming client tests against an in-process gRPC server

use edge_core::config::UpstreamConfig;
use edge_core::domain::Order;
use edge_core::error::RemoteErrorKind;
use edge_core::grpc::proto::{
    self,
    order_service_server::{OrderService, OrderServiceServer},
    OrdersForRequest,
};
use edge_core::upstream::{GrpcOrderClient, OrderSource};
use futures::StreamExt;
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::{transport::Server, Request, Response, Status};

/// Customer ids select the server's behaviour:
/// - 1..=99: that many orders, then end of stream
/// - 100: two orders, then an internal error
/// - 200: one order, then silence
/// - 300: twenty orders, 100ms apart
struct ScriptedOrders;

#[tonic::async_trait]
impl OrderService for ScriptedOrders {
    type OrdersForStream = ReceiverStream<Result<proto::Order, Status>>;

    async fn orders_for(
        &self,
        request: Request<OrdersForRequest>,
    ) -> Result<Response<Self::OrdersForStream>, Status> {
        let customer_id = request.into_inner().customer_id;
        let (tx, rx) = mpsc::channel(8);

        tokio::spawn(async move {
            let order = |id| proto::Order { id, customer_id };
            match customer_id {
                100 => {
                    for id in 1..=2 {
                        let _ = tx.send(Ok(order(id))).await;
                    }
                    let _ = tx.send(Err(Status::internal("boom"))).await;
                }
                200 => {
                    let _ = tx.send(Ok(order(1))).await;
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    drop(tx);
                }
                300 => {
                    for id in 1..=20 {
                        if tx.send(Ok(order(id))).await.is_err() {
                            break;
                        }
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
                n => {
                    for id in 1..=n {
                        let _ = tx.send(Ok(order(id))).await;
                    }
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

async fn start_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        Server::builder()
            .add_service(OrderServiceServer::new(ScriptedOrders))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });
    format!("http://{}", addr)
}

fn create_test_config(orders_addr: String) -> UpstreamConfig {
    UpstreamConfig {
        orders_addr,
        connect_timeout: Duration::from_millis(500),
        call_timeout: Duration::from_millis(300),
        ..UpstreamConfig::default()
    }
}

#[tokio::test]
async fn test_stream_yields_orders_in_server_order() {
    let addr = start_server().await;
    let client = GrpcOrderClient::connect_lazy(&create_test_config(addr)).unwrap();

    let orders: Vec<Order> = client
        .fetch_for(4)
        .map(|item| item.unwrap())
        .collect()
        .await;

    let expected: Vec<Order> = (1..=4).map(|id| Order { id, customer_id: 4 }).collect();
    assert_eq!(orders, expected);
}

#[tokio::test]
async fn test_repeated_fetches_are_stable() {
    let addr = start_server().await;
    let client = GrpcOrderClient::connect_lazy(&create_test_config(addr)).unwrap();

    let first: Vec<_> = client.fetch_for(3).collect().await;
    let second: Vec<_> = client.fetch_for(3).collect().await;

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_mid_stream_error_follows_delivered_orders() {
    let addr = start_server().await;
    let client = GrpcOrderClient::connect_lazy(&create_test_config(addr)).unwrap();

    let items: Vec<_> = client.fetch_for(100).collect().await;

    assert_eq!(items.len(), 3);
    assert_eq!(items[0], Ok(Order { id: 1, customer_id: 100 }));
    assert_eq!(items[1], Ok(Order { id: 2, customer_id: 100 }));
    let err = items[2].clone().unwrap_err();
    assert_eq!(err.kind, RemoteErrorKind::ProtocolError);
    assert_eq!(err.upstream, "orders");
}

#[tokio::test]
async fn test_silent_stream_times_out() {
    let addr = start_server().await;
    let client = GrpcOrderClient::connect_lazy(&create_test_config(addr)).unwrap();

    let items: Vec<_> = client.fetch_for(200).collect().await;

    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    assert_eq!(items[1].clone().unwrap_err().kind, RemoteErrorKind::Timeout);
}

#[tokio::test]
async fn test_slow_but_steady_stream_is_cut_at_call_timeout() {
    let addr = start_server().await;
    let client = GrpcOrderClient::connect_lazy(&create_test_config(addr)).unwrap();

    let started = std::time::Instant::now();
    let items: Vec<_> = client.fetch_for(300).collect().await;

    assert!(started.elapsed() < Duration::from_secs(1));
    let (last, delivered) = items.split_last().unwrap();
    assert!(delivered.len() < 20);
    assert!(delivered.iter().all(Result::is_ok));
    assert_eq!(last.clone().unwrap_err().kind, RemoteErrorKind::Timeout);
}

#[tokio::test]
async fn test_unreachable_upstream_is_connection_failed() {
    let client =
        GrpcOrderClient::connect_lazy(&create_test_config("http://127.0.0.1:9".to_string()))
            .unwrap();

    let items: Vec<_> = client.fetch_for(1).collect().await;

    assert_eq!(items.len(), 1);
    assert_eq!(
        items[0].clone().unwrap_err().kind,
        RemoteErrorKind::ConnectionFailed
    );
}

#[tokio::test]
async fn test_held_stream_exhausts_slots() {
    let addr = start_server().await;
    let config = UpstreamConfig {
        call_timeout: Duration::from_secs(5),
        max_in_flight: 1,
        pool_acquire_timeout: Duration::from_millis(50),
        ..create_test_config(addr)
    };
    let client = GrpcOrderClient::connect_lazy(&config).unwrap();

    let mut held = client.fetch_for(200);
    assert!(held.next().await.unwrap().is_ok());

    let items: Vec<_> = client.fetch_for(1).collect().await;
    assert_eq!(items.len(), 1);
    assert_eq!(
        items[0].clone().unwrap_err().kind,
        RemoteErrorKind::PoolExhausted
    );

    // Releasing the held stream frees its slot
    drop(held);
    let items: Vec<_> = client.fetch_for(1).collect().await;
    assert_eq!(items, vec![Ok(Order { id: 1, customer_id: 1 })]);
}
