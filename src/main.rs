use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use fundgate::config::Config;
use fundgate::escrow::HttpEscrowGateway;
use fundgate::{create_app, db, AppOptions, AppState, FundingService};
use reqwest::Client;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present) before reading configuration
    let _ = dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let db = db::connect(&config.database_url)
        .await
        .context("failed to connect to the database")?;

    let client = Client::builder()
        .timeout(config.escrow_timeout)
        .build()
        .context("failed to build the escrow HTTP client")?;
    let escrow = HttpEscrowGateway::new(&config.escrow_url, client)
        .context("invalid escrow base URL")?;

    let service = FundingService::new(db, Arc::new(escrow), config.service_settings());
    let app = create_app(
        AppState::new(service),
        AppOptions {
            rate_limit_per_minute: config.rate_limit_per_minute,
        },
    )?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!("Server running on http://{}", config.bind_addr);

    // Connect info feeds the per-IP rate limiter
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
