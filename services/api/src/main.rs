//! API Service - Serves revenue rankings from the warehouse
//!
//! Usage:
//!   DB_PATH=./data/movies.db cargo run --bin api

use anyhow::Context;
use api::{build_router, AppState};
use std::path::PathBuf;
use tracing::info;
use warehouse::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let db_path = PathBuf::from(
        std::env::var("DB_PATH").unwrap_or_else(|_| "./data/movies.db".to_string()),
    );
    let bind = std::env::var("API_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let pool_size: u32 = std::env::var("API_POOL_SIZE")
        .unwrap_or_else(|_| "4".to_string())
        .parse()
        .context("API_POOL_SIZE must be a positive integer")?;

    info!("=== Movie Revenue API ===");
    let store = Store::open_read_only(&db_path, pool_size)
        .await
        .with_context(|| format!("Failed to open {}; run the warehouse first", db_path.display()))?;

    let app = build_router(AppState::new(store));

    info!("API listening on http://{}", bind);
    info!("Endpoints:");
    info!("  GET /health");
    info!("  GET /genres");
    info!("  GET /years");
    info!("  GET /rankings/movies?genre=&year=&limit=");
    info!("  GET /rankings/genres?genre=&year=&limit=");

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
