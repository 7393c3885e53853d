//! Kan API Server
//!
//! Main entry point for the Kan backend service.

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kan_api::{AppState, create_router};
use kan_core::storage::{Storage, StorageDriver, StorageEnv};
use kan_db::connect;
use kan_shared::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kan=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;

    let db = connect(&config.database.url, config.database.max_connections)
        .await
        .context("failed to connect to database")?;
    info!("Connected to database");

    let storage_env = StorageEnv::from_env();
    info!(
        driver = %storage_env.driver(),
        configured = storage_env.is_configured(),
        "Storage configured"
    );
    if storage_env.driver() == StorageDriver::S3
        && storage_env.s3.endpoint.is_some()
        && storage_env.avatar_bucket.is_none()
        && storage_env.attachments_bucket.is_none()
    {
        warn!("S3_ENDPOINT is set but no bucket is configured; storage reports not_configured");
    }

    let admin_api_key = std::env::var("KAN_ADMIN_API_KEY").ok();
    if admin_api_key.as_deref().is_none_or(str::is_empty) {
        warn!("KAN_ADMIN_API_KEY is not set; /stats will return 500");
    }

    let state = AppState::new(db, Storage::new(storage_env), config.rate_limit)
        .context("failed to build HTTP client")?
        .with_admin_api_key(admin_api_key)
        .with_upload_config(config.uploads);

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
