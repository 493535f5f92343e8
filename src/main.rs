use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cip_functions::common::AppState;
use cip_functions::config::Config;
use cip_functions::messaging::{nats, MessageRouter};
use cip_functions::reconciler::Reconciler;
use cip_functions::routes;
use cip_functions::storage::JsonDataStore;
use cip_functions::things::HttpThingsClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cip_functions=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting cip-functions...");

    // Load configuration (fail-fast)
    let config = Config::from_env()?;
    tracing::info!(
        deployment = ?config.deployment,
        host = %config.api_host,
        port = config.api_port,
        things_url = %config.things_url,
        nats_url = %config.nats_url,
        "Configuration loaded"
    );

    // Connect to database (fail-fast)
    tracing::info!("Connecting to database...");
    let db = Database::connect(&config.database_url).await?;
    tracing::info!("Database connection established");

    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None).await?;
    tracing::info!("Migrations completed");

    // Registry client with its cache sweep
    let things = HttpThingsClient::from_config(&config)?;
    let sweeper =
        things.spawn_cache_sweeper(Duration::from_secs(config.things_cache_sweep_seconds));
    let things_cache = things.cache().clone();
    tracing::info!("Things client initialized");

    // Broker
    let nats_client = nats::connect(&config.nats_url).await?;
    tracing::info!("Connected to NATS");

    let reconciler = Arc::new(Reconciler::new(
        Arc::new(things),
        Arc::new(JsonDataStore::new(db.clone())),
        Arc::new(nats::NatsPublisher::new(nats_client.clone())),
    ));
    let router = Arc::new(MessageRouter::new(
        reconciler,
        Duration::from_secs(config.processing_timeout_seconds),
    ));

    let consumer = tokio::spawn(async move {
        if let Err(e) = nats::run_consumer(nats_client, router).await {
            tracing::error!(error = %e, "Message consumer stopped");
        }
    });

    let state = AppState::new(db, things_cache);
    let app = routes::build_router(state);

    // Start server with graceful shutdown
    let addr = config.bind_address();
    tracing::info!(address = %addr, "Starting server");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    consumer.abort();
    sweeper.abort();

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        },
    }
}
