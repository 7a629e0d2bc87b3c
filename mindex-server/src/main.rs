//! Binary entry point: loads configuration, wires the pub/sub hub, spatial
//! store, ingestion orchestrator with its collectors, the local/cloud
//! workflow engines and their schedulers/monitor, the stream registry, and
//! serves the composed router until shutdown.

mod app_state;
mod errors;
mod handlers;
mod routes;
mod streams;

use std::sync::Arc;

use mindex_config::Config;
use mindex_core::collectors::{AisCollector, NoaaCollector, NoradCollector, OpenSkyCollector, UsgsCollector};
use mindex_core::{
    HttpWorkflowTransport, IngestionOrchestrator, PubSubHub, RedisTransport, SpatialStore, WorkflowAutoMonitor,
    WorkflowDirs, WorkflowEngine, WorkflowScheduler,
};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use app_state::AppState;
use streams::StreamRegistry;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_USGS_MIN_MAGNITUDE: f64 = 2.5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "mindex_server=info,mindex_core=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::load()?);
    info!(redis_host = %config.redis_host, redis_port = config.redis_port, "configuration loaded");

    let store = Arc::new(SpatialStore::connect(&config.database_url).await?);

    let redis_url = format!("redis://{}:{}/{}", config.redis_host, config.redis_port, config.redis_db);
    let transport = RedisTransport::new(&redis_url)?;
    let pubsub = Arc::new(PubSubHub::new(Arc::new(transport)));
    pubsub.connect().await?;
    pubsub.spawn_listener();
    info!("pub/sub hub connected");

    let orchestrator = Arc::new(build_orchestrator(&config, store.clone()));
    orchestrator.start().await;
    info!(collectors = ?orchestrator.collector_names(), "ingestion orchestrator started");

    let workflows = Arc::new(WorkflowEngine::new(
        Arc::new(HttpWorkflowTransport::new(config.n8n_local_url.clone(), config.n8n_local_api_key.clone())?),
        WorkflowDirs::under("data/workflows/local"),
    )?);
    let workflows_cloud = Arc::new(WorkflowEngine::new(
        Arc::new(HttpWorkflowTransport::new(config.n8n_url.clone(), config.n8n_api_key.clone())?),
        WorkflowDirs::under("data/workflows/cloud"),
    )?);

    let local_scheduler = Arc::new(WorkflowScheduler::new(workflows.clone()));
    local_scheduler.start_default().await;
    let cloud_scheduler = Arc::new(WorkflowScheduler::new(workflows_cloud.clone()));
    cloud_scheduler.start_default().await;
    info!("workflow schedulers started");

    let workflow_monitor = Arc::new(WorkflowAutoMonitor::new(workflows.clone(), workflows_cloud.clone()));
    workflow_monitor.start().await;
    info!("workflow auto-monitor started");

    let streams = StreamRegistry::new(pubsub.clone());

    let state =
        AppState { config, store, pubsub, orchestrator, workflows, workflows_cloud, workflow_monitor: workflow_monitor.clone(), streams };
    let app = routes::build(state);

    let listener = tokio::net::TcpListener::bind(DEFAULT_LISTEN_ADDR).await?;
    info!(addr = DEFAULT_LISTEN_ADDR, "listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    local_scheduler.stop().await;
    cloud_scheduler.stop().await;
    workflow_monitor.stop().await;
    Ok(())
}

fn build_orchestrator(config: &Config, store: Arc<SpatialStore>) -> IngestionOrchestrator {
    let orchestrator = IngestionOrchestrator::new();
    orchestrator.register(Arc::new(AisCollector::new(store.clone(), config.oei_ais_proxy.clone(), config.aisstream_api_key.clone())));
    orchestrator.register(Arc::new(NoaaCollector::new(store.clone())));
    orchestrator.register(Arc::new(NoradCollector::new(store.clone(), config.spacetrack_username.clone(), config.spacetrack_password.clone())));
    orchestrator.register(Arc::new(OpenSkyCollector::new(store.clone(), config.opensky_username.clone(), config.opensky_password.clone())));
    orchestrator.register(Arc::new(UsgsCollector::new(store, DEFAULT_USGS_MIN_MAGNITUDE)));
    orchestrator
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    warn!("shutdown signal received");
}
