//! API Service - HTTP front for the scratch-off CSV importer
//!
//! Endpoints:
//! - GET  /health - Health check
//! - POST /import-csv - Run one import
//! - GET  /import-logs - Recent import audit entries

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use api::{router, AppState};
use importer::config::Config;
use importer::object_store;
use importer::store::PgGameStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    println!("=== Scratch-off Import API ===");
    println!("Connecting to database...");

    let store = PgGameStore::connect(config.require_db_url()?, 10)
        .await
        .context("Failed to connect to database")?;

    println!("Database connected");

    let client = importer::http_client(&config)?;
    let objects: Arc<dyn object_store::ObjectStore> =
        Arc::from(object_store::from_config(&config, client.clone())?);
    let bind = config.api_bind.clone();

    let state = Arc::new(AppState::new(config, client, objects, Arc::new(store)));
    let app = router(state);

    println!("API listening on http://{}", bind);
    println!("\nEndpoints:");
    println!("  GET  /health");
    println!("  POST /import-csv  {{ csvUrl, offset?, limit?, dryRun?, columnMapping? }}");
    println!("  GET  /import-logs?limit=");

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
