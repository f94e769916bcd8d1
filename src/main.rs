mod api;
mod app;
mod auth;
mod catalog;
mod config;
mod imaging;
mod ingest;
mod locks;
mod publish;
mod upload;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "truyen=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = config::Args::parse();
    tracing::info!(
        "Starting truyen on port {} ({:?} storage)",
        args.port,
        args.storage_backend
    );

    app::run(args).await
}
