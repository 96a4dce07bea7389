mod http_server;
mod settings;
mod sim;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::http_server::AppState;
use crate::sim::events::{EventBridgeSink, EventSink, NoopSink};
use crate::sim::store::spawn_sweeper;
use crate::sim::SimProvider;

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from environment
    let cfg = settings::Settings::from_env();

    // Logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = cfg.validate() {
        tracing::error!("Invalid configuration: {e}");
        return Err(e);
    }
    tracing::info!("Starting payment simulator");

    // Event sink: EventBridge when a bus is configured, otherwise log-only.
    let sink: Arc<dyn EventSink> = if cfg.event_bus_name.is_empty() {
        tracing::warn!("EVENT_BUS_NAME not set - payment events will not be published");
        Arc::new(NoopSink)
    } else {
        Arc::new(
            EventBridgeSink::connect(cfg.event_bus_name.clone(), cfg.event_source.clone()).await?,
        )
    };

    let sim = SimProvider::new(&cfg, sink)?;

    // TTL sweeper runs for the life of the process.
    spawn_sweeper(sim.store(), cfg.store_sweep_interval);

    let state = AppState {
        service: sim.service(),
        metrics: sim.metrics(),
    };

    http_server::run_http_server(cfg.port, state, shutdown_signal()).await?;

    // Let in-flight webhook deliveries finish; queued jobs and pending
    // backoff timers die with the process.
    tracing::info!("Shutting down, draining webhook workers");
    sim.dispatcher().shutdown(SHUTDOWN_DEADLINE).await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
}
