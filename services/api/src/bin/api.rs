//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, SevenZipPackager, ZipAesPackager},
    config::{Config, PackagerKind},
    error::ApiError,
    web::{build_router, state::AppState},
};
use marketplace_core::Packager;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "{},tower_http=debug",
            config.log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Choose the Archive Packager ---
    let packager: Arc<dyn Packager> = match config.packager {
        PackagerKind::SevenZip => {
            info!(program = %config.seven_zip_bin, "Packaging downloads with 7-Zip");
            Arc::new(SevenZipPackager::new(&config.seven_zip_bin))
        }
        PackagerKind::Native => {
            info!("Packaging downloads with the built-in ZIP writer");
            Arc::new(ZipAesPackager::new())
        }
    };
    tokio::fs::create_dir_all(&config.archive_temp_dir).await?;
    info!(
        dataset_root = %config.dataset_root.display(),
        temp_dir = %config.archive_temp_dir.display(),
        timeout_secs = config.packaging_timeout.as_secs(),
        "Delivery pipeline configured"
    );

    // --- 4. Build the Shared AppState & Router ---
    let app_state = Arc::new(AppState::new(db_adapter, packager, config.clone()));
    let app = build_router(app_state)?;

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
