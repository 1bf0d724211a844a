//! Common test utilities
//!
//! In-process fakes for both upstreams and the bucket store, plus a router
//! builder so tests can drive the full middleware stack with `oneshot`.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, http::Request, Router};
use base64::{engine::general_purpose::STANDARD, Engine};
use edge_core::auth::CredentialStore;
use edge_core::config::{
    Config, FilterDefinition, RateLimitConfig, RouteDefinition, UpstreamConfig, UserDefinition,
};
use edge_core::domain::{Customer, Order};
use edge_core::error::RemoteError;
use edge_core::gateway::{Gateway, RouteTable};
use edge_core::middleware::AuthGate;
use edge_core::rate_limit::{
    BucketOutcome, BucketSpec, BucketStore, InMemoryBucketStore, RateLimitKey, RateLimiter,
    StoreError,
};
use edge_core::server::build_router;
use edge_core::state::AppState;
use edge_core::upstream::{CustomerSource, OrderSource, OrderStream};
use futures::{stream, StreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub fn customers(n: i32) -> Vec<Customer> {
    (1..=n)
        .map(|id| Customer {
            id,
            name: format!("customer-{}", id),
        })
        .collect()
}

/// Customer upstream returning a fixed list
pub struct FakeCustomers {
    pub customers: Vec<Customer>,
    pub calls: AtomicUsize,
}

impl FakeCustomers {
    pub fn new(customers: Vec<Customer>) -> Self {
        Self {
            customers,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CustomerSource for FakeCustomers {
    async fn fetch_all(&self) -> Result<Vec<Customer>, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.customers.clone())
    }
}

/// Order upstream returning `customer_id` orders per customer, failing for
/// the configured ids
#[derive(Default)]
pub struct FakeOrders {
    pub failing: HashSet<i32>,
    pub calls: AtomicUsize,
}

impl FakeOrders {
    pub fn failing(ids: &[i32]) -> Self {
        Self {
            failing: ids.iter().copied().collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl OrderSource for FakeOrders {
    fn fetch_for(&self, customer_id: i32) -> OrderStream {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&customer_id) {
            return stream::iter(vec![Err(RemoteError::connection_failed(
                "orders",
                "connection reset",
            ))])
            .boxed();
        }
        stream::iter((1..=customer_id).map(move |id| Ok(Order { id, customer_id }))).boxed()
    }
}

/// In-memory bucket store that counts how often it is consulted
#[derive(Clone, Default)]
pub struct CountingBucketStore {
    inner: InMemoryBucketStore,
    pub calls: Arc<AtomicUsize>,
}

impl CountingBucketStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BucketStore for CountingBucketStore {
    async fn try_consume(
        &self,
        key: &RateLimitKey,
        spec: BucketSpec,
    ) -> Result<BucketOutcome, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.try_consume(key, spec).await
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// Low-cost PHC hash so authenticated requests stay fast in debug builds
pub fn cheap_hash(password: &str) -> String {
    use argon2::password_hash::{PasswordHasher, SaltString};
    use rand_core::OsRng;
    let params = argon2::Params::new(8, 1, 1, None).unwrap();
    let argon2 = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
    let salt = SaltString::generate(&mut OsRng);
    argon2
        .hash_password(password.as_bytes(), &salt)
        .unwrap()
        .to_string()
}

pub fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
}

pub fn proxy_route(uri: &str) -> RouteDefinition {
    RouteDefinition {
        id: "proxy".to_string(),
        path: "/proxy".to_string(),
        host: Some("*.spring.io".to_string()),
        filters: vec![
            FilterDefinition::SetPath {
                template: "/customers".to_string(),
            },
            FilterDefinition::RequestRateLimiter,
        ],
        uri: uri.to_string(),
    }
}

pub struct TestApp {
    pub router: Router,
    pub customers: Arc<FakeCustomers>,
    pub orders: Arc<FakeOrders>,
    pub store: CountingBucketStore,
}

pub struct TestAppBuilder {
    config: Config,
    customers: Vec<Customer>,
    orders: FakeOrders,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.auth.users = vec![UserDefinition {
            username: "jlong".to_string(),
            password: format!("{{argon2}}{}", cheap_hash("pw")),
            roles: vec!["USER".to_string()],
        }];
        config.routes = vec![proxy_route("http://127.0.0.1:9")];
        Self {
            config,
            customers: customers(3),
            orders: FakeOrders::default(),
        }
    }

    pub fn with_routes(mut self, routes: Vec<RouteDefinition>) -> Self {
        self.config.routes = routes;
        self
    }

    pub fn with_failing_orders(mut self, ids: &[i32]) -> Self {
        self.orders = FakeOrders::failing(ids);
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.config.rate_limit = rate_limit;
        self
    }

    pub fn with_config(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn build(self) -> TestApp {
        let customers = Arc::new(FakeCustomers::new(self.customers));
        let orders = Arc::new(self.orders);
        let store = CountingBucketStore::default();

        let limiter = RateLimiter::new(self.config.rate_limit.clone(), Arc::new(store.clone()));
        let gateway = Gateway::new(RouteTable::compile(&self.config.routes).unwrap(), limiter);
        let credentials = CredentialStore::from_definitions(&self.config.auth.users).unwrap();
        let auth = AuthGate::new(credentials, &self.config.auth.protected_paths).unwrap();

        let http_client = reqwest::Client::builder()
            .timeout(UpstreamConfig::default().call_timeout)
            .build()
            .unwrap();
        let state = AppState::new(
            self.config.aggregation,
            customers.clone(),
            orders.clone(),
            gateway,
            http_client,
        );

        TestApp {
            router: build_router(state, auth),
            customers,
            orders,
            store,
        }
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn get_with_auth(uri: &str, host: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri).header("host", host);
    if let Some(auth) = auth {
        builder = builder.header("authorization", auth);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
