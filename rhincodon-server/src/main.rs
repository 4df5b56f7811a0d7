//! Telemetry relay for the "hiu paus" aquatic monitor
//!
//! Composition root. Wires the pieces together and keeps them running:
//!
//! ```text
//! MQTT broker ──► ingestion pipeline ──► PostgreSQL (best effort)
//!                        │
//!                        ▼
//!                live-view hub ──► WebSocket clients
//!                        ▲
//!       HTTP API ────────┘  (status, latest, history, statistics)
//! ```
//!
//! Nothing here is allowed to take the process down except a failed
//! HTTP bind: broker and database links retry forever on a fixed delay,
//! and per-message failures stay inside the pipeline.

mod api;
mod commands;
mod config;
mod context;
mod ingest;
mod live;
mod mqtt;
mod store;

use crate::{
    commands::CommandRelay,
    config::Config,
    context::{AppContext, LinkStatus},
    ingest::IngestPipeline,
    live::LiveHub,
    mqtt::MqttPublisher,
    store::Store,
};
use rhincodon_core::{Clock, SystemClock};
use std::{net::SocketAddr, sync::Arc, time::Duration, time::Instant};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Delay between database bootstrap attempts
const DATABASE_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
enum ServerError {
    #[error("HTTP server error: {0}")]
    Http(#[from] std::io::Error),
    #[error("database configuration error: {0}")]
    Database(#[from] sqlx::Error),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    info!("starting hiu paus telemetry relay v{}", rhincodon_core::VERSION);

    if let Err(e) = run(config).await {
        error!("fatal: {e}");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), ServerError> {
    let link = LinkStatus::default();
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(SystemClock);

    // The pool connects on first use, so the relay is useful (live view,
    // status endpoint) even while the database is still down.
    let store = Arc::new(Store::connect_lazy(&config.database.url)?);
    tokio::spawn(bootstrap_store(Arc::clone(&store), link.clone()));

    let hub = LiveHub::new(64);

    let (client, eventloop) = mqtt::broker_client(&config.mqtt);
    let relay = Arc::new(CommandRelay::new(
        Arc::new(MqttPublisher::new(client.clone())),
        config.mqtt.command_publish_topic.clone(),
        hub.clone(),
        Arc::clone(&clock),
    ));

    let pipeline = Arc::new(IngestPipeline::new(
        Arc::clone(&store),
        hub.clone(),
        Arc::clone(&clock),
    ));
    tokio::spawn(mqtt::run_broker_link(
        config.mqtt.clone(),
        client,
        eventloop,
        pipeline,
        Arc::clone(&relay),
        link.clone(),
    ));

    let ctx = AppContext {
        store,
        hub,
        relay,
        link,
        clock,
        started_at: Instant::now(),
    };
    let app = api::router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("dashboard API listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shut down cleanly");
    Ok(())
}

/// Create the schema, retrying on a fixed delay until the database is
/// reachable. The connectivity flag follows the outcome.
async fn bootstrap_store(store: Arc<Store>, link: LinkStatus) {
    loop {
        match store.init_schema().await {
            Ok(()) => {
                link.set_database(true);
                info!("connected to PostgreSQL, schema ready");
                return;
            }
            Err(e) => {
                link.set_database(false);
                error!("database connection failed: {e}");
                tokio::time::sleep(DATABASE_RETRY_DELAY).await;
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install ctrl-c handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("ctrl-c received, closing connections"),
        _ = terminate => info!("SIGTERM received, closing connections"),
    }
}
