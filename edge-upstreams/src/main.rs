use anyhow::Result;
use clap::{Parser, Subcommand};
use edge_upstreams::{customers, orders, CustomerCatalog, OrderFixtures};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "edge-upstreams", about = "Upstream services for the edge gateway")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the customer list over HTTP
    Customers {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Serve per-customer order streams over gRPC
    Orders {
        #[arg(long, default_value_t = 8181)]
        port: u16,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Exclusive upper bound on orders per customer
        #[arg(long, default_value_t = 100)]
        max_orders: i32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "edge_upstreams=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let catalog = CustomerCatalog::standard();
    match Cli::parse().command {
        Command::Customers { port } => {
            customers::serve(SocketAddr::from(([0, 0, 0, 0], port)), catalog).await
        }
        Command::Orders {
            port,
            seed,
            max_orders,
        } => {
            let fixtures = OrderFixtures::generate(seed, &catalog.ids(), max_orders);
            orders::serve(SocketAddr::from(([0, 0, 0, 0], port)), fixtures).await
        }
    }
}
