use anyhow::Result;
use edge_core::{config::Config, server, telemetry};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let prometheus = telemetry::init(&config.telemetry)?;

    info!("Starting Edge Core");
    info!(
        customers = %config.upstream.customers_url,
        orders = %config.upstream.orders_addr,
        "Upstreams configured"
    );

    server::run(config, prometheus).await
}
