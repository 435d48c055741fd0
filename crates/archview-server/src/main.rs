//! archview - Archive viewer entry point

use anyhow::{Context, Result};
use archview_common::config::{Config, LoggingConfig};
use archview_core::{AttachmentResolver, CacheWriter};
use archview_storage::{AttachmentRepository, CacheStores, DatabasePool, MessageRepository};
use archview_web::{create_router, AppState};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting archview...");

    // Initialize database; refuse to start without a working connection
    let db_pool = DatabasePool::new(&config.database).await?;
    if let Err(e) = db_pool.health_check().await {
        error!(error = %e, "Database is not usable, check the database configuration");
        return Err(e.into());
    }

    // Initialize attachment caches
    let stores = CacheStores::open(&config.cache)?;
    info!(
        data_dir = %config.cache.data_dir.display(),
        metadata_capacity = config.cache.metadata_capacity,
        "Attachment cache ready"
    );

    let attachments = Arc::new(AttachmentRepository::new(
        db_pool.clone(),
        &config.database.attachments_table,
    ));
    let messages = Arc::new(MessageRepository::new(
        db_pool.clone(),
        &config.database.schema,
        &config.database.attachments_table,
    ));

    let resolver = Arc::new(
        AttachmentResolver::new(stores, attachments)
            .with_writer(CacheWriter::new(config.cache.write_attempts)),
    );

    let state = AppState::new(resolver.clone(), messages, Some(db_pool))?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!("Listening on {}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let pending cache fills land before exiting
    resolver.flush().await;

    info!("archview shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let json = config.format.eq_ignore_ascii_case("json");

    tracing_subscriber::registry()
        .with(json.then(|| fmt::layer().json().with_target(true)))
        .with((!json).then(|| fmt::layer().with_target(true).with_level(true)))
        .with(filter)
        .init();
}
