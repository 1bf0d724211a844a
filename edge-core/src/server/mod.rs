//! Server initialization and routing

use crate::api;
use crate::auth::CredentialStore;
use crate::config::Config;
use crate::gateway::{self, Gateway, RouteTable};
use crate::graphql;
use crate::middleware::{basic_auth_middleware, AuthGate, ObservabilityLayer, SanitizedMakeSpan};
use crate::rate_limit::{RateLimiter, RedisBucketStore};
use crate::state::AppState;
use crate::upstream::{CustomerSource, GrpcOrderClient, HttpCustomerClient, OrderSource};
use anyhow::{Context, Result};
use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Build the HTTP router.
///
/// Named routes are served locally. Every other request goes through the
/// gateway's route table. Authentication runs before both.
pub fn build_router(state: AppState, auth: AuthGate) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/customers", get(api::crm::list_customers))
        .route("/cos", get(api::crm::list_customer_orders))
        .route(
            "/graphql",
            get(graphql::graphiql).post(graphql::graphql_handler),
        )
        .route("/health", get(api::health::health))
        .route("/metrics", get(api::metrics::metrics_handler))
        .fallback(gateway::proxy_handler)
        .layer(middleware::from_fn_with_state(auth, basic_auth_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(SanitizedMakeSpan))
        .layer(cors)
        .layer(ObservabilityLayer)
        .with_state(state)
}

/// Rate limiter backed by Redis when configured. An unreachable Redis at
/// startup leaves the limiter on process memory.
pub async fn build_rate_limiter(config: &Config) -> RateLimiter {
    let Some(redis) = &config.redis else {
        info!("Rate limiter using in-memory buckets (not shared between instances)");
        return RateLimiter::in_memory(config.rate_limit.clone());
    };

    match RedisBucketStore::connect(redis).await {
        Ok(store) => {
            info!("Rate limiter using Redis buckets");
            RateLimiter::new(config.rate_limit.clone(), Arc::new(store))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable, rate limiter using in-memory buckets");
            RateLimiter::in_memory(config.rate_limit.clone())
        }
    }
}

/// Build every component from configuration.
pub async fn build_state(config: Config) -> Result<(AppState, AuthGate)> {
    config.validate()?;

    let http_client = reqwest::Client::builder()
        .connect_timeout(config.upstream.connect_timeout)
        .timeout(config.upstream.call_timeout)
        .build()
        .context("Failed to create HTTP client")?;

    let customers: Arc<dyn CustomerSource> = Arc::new(HttpCustomerClient::with_client(
        http_client.clone(),
        &config.upstream,
    ));
    let orders: Arc<dyn OrderSource> = Arc::new(GrpcOrderClient::connect_lazy(&config.upstream)?);

    let table = RouteTable::compile(&config.routes).context("Invalid route table")?;
    info!(routes = table.len(), "Route table loaded");
    let gateway = Gateway::new(table, build_rate_limiter(&config).await);

    let credentials = CredentialStore::from_definitions(&config.auth.users)?;
    info!(users = credentials.len(), "Credential store loaded");
    let auth = AuthGate::new(credentials, &config.auth.protected_paths)
        .context("Invalid protected path")?;

    let state = AppState::new(config.aggregation, customers, orders, gateway, http_client);
    Ok((state, auth))
}

/// Run the server until interrupted
pub async fn run(config: Config, prometheus: Option<PrometheusHandle>) -> Result<()> {
    let addr = config.http_addr();
    let (state, auth) = build_state(config).await?;
    let app = build_router(state.with_prometheus(prometheus), auth);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server started on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received. Shutting down...");
            }
        })
        .await?;

    info!("Server shut down.");
    Ok(())
}
