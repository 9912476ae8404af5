use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use modelbridge_core::{
    load_config, validate_config, ApsGateway, LifecycleController, RecordStore,
    SqliteRecordStore, TranslationGateway,
};
use modelbridge_server::{create_router, AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("modelbridge {} starting", VERSION);

    // Determine config path
    let config_path = std::env::var("MODELBRIDGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    info!("Gateway: {}", config.gateway.base_url);

    // Create SQLite record store
    let store: Arc<dyn RecordStore> = Arc::new(
        SqliteRecordStore::new(&config.database.path)
            .context("Failed to create record store")?,
    );
    info!("Record store initialized");

    // Create translation gateway
    let gateway: Arc<dyn TranslationGateway> = Arc::new(
        ApsGateway::new(config.gateway.clone()).context("Failed to create gateway client")?,
    );

    // Create lifecycle controller
    let lifecycle = Arc::new(LifecycleController::new(
        config.lifecycle.clone(),
        store,
        gateway,
    ));
    lifecycle
        .prepare_storage()
        .await
        .context("Failed to create upload/artifact directories")?;
    info!(
        "Lifecycle ready (uploads: {:?}, artifacts: {:?})",
        config.lifecycle.upload_dir, config.lifecycle.artifact_dir
    );

    // Create app state and router
    let state = Arc::new(AppState::new(config.clone(), lifecycle));
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
