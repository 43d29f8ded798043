use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lpsniper::config::{Config, ConfigManager};
use lpsniper::core::SIGNATURE_HISTORY_CAPACITY;
use lpsniper::database::{AccountStore, JsonAccountStore};
use lpsniper::execution::PositionMonitor;
use lpsniper::ingest::{ChainEventListener, SignatureHistory, WebSocketConfig};
use lpsniper::scout::{MigrationParser, TokenMetadataClient};
use lpsniper::strike::{BuyDispatcher, MigrationHandler};
use lpsniper::trading::{ChainRpc, JupiterClient, PipelineOptions, SolanaRpc, SwapPipeline};
use lpsniper::transport::build_notifier;
use lpsniper::util::{PriceFeed, PriceSource};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Long-running components, wired and ready to spawn
struct Services {
    listener: Arc<ChainEventListener>,
    ws_config: WebSocketConfig,
    monitor: PositionMonitor,
}

struct ServiceOrchestrator {
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<Result<()>>>,
}

impl ServiceOrchestrator {
    fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    #[instrument(skip(self, services))]
    fn start_all_services(&mut self, services: Services) {
        info!("🚀 Starting services");

        let Services {
            listener,
            ws_config,
            monitor,
        } = services;

        let listener_shutdown = self.shutdown_tx.subscribe();
        self.tasks.push(tokio::spawn(async move {
            info!("🔄 Chain event listener - watching pool initializations");
            listener.run(ws_config, listener_shutdown).await;
            Ok(())
        }));

        let monitor_shutdown = self.shutdown_tx.subscribe();
        self.tasks.push(tokio::spawn(async move {
            info!("📊 Position monitor - evaluating open positions");
            monitor.run(monitor_shutdown).await;
            Ok(())
        }));

        info!("✅ All {} services started successfully", self.tasks.len());
    }

    #[instrument(skip(self))]
    async fn shutdown_all(&mut self) {
        info!("🛑 Shutting down all services");

        let _ = self.shutdown_tx.send(());
        debug!("Shutdown signal sent to all services");

        for (i, task) in self.tasks.drain(..).enumerate() {
            match task.await {
                Ok(Ok(())) => info!("✅ Service {} shut down cleanly", i + 1),
                Ok(Err(e)) => warn!("⚠️  Service {} error during shutdown: {}", i + 1, e),
                Err(e) => error!("❌ Service {} task failed: {}", i + 1, e),
            }
        }

        info!("✅ All services shut down successfully");
    }
}

fn init_tracing() -> Result<()> {
    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::daily("logs", "lpsniper.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .compact();

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .json()
        .with_current_span(false)
        .with_span_list(true);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // The writer thread must outlive main
    std::mem::forget(guard);

    Ok(())
}

/// File named by LPSNIPER_CONFIG (default config.toml), else defaults plus environment
fn load_config() -> Result<ConfigManager> {
    let path = std::env::var("LPSNIPER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    if Path::new(&path).exists() {
        let manager = ConfigManager::new(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?;
        info!(path = %path, "⚙️ Configuration loaded");
        return Ok(manager);
    }

    warn!(path = %path, "Configuration file not found, using defaults");
    let mut config = Config::default();
    config.apply_env_overrides();
    Ok(ConfigManager::from_config(config))
}

fn build_services(config_manager: Arc<ConfigManager>) -> Result<Services> {
    let config = config_manager.get_config();

    let rpc: Arc<dyn ChainRpc> = Arc::new(SolanaRpc::new(
        &config.rpc.http_url,
        Duration::from_millis(config.rpc.connect_timeout_ms),
    ));
    let router = Arc::new(JupiterClient::new(&config.jupiter)?);
    let prices: Arc<dyn PriceSource> = Arc::new(PriceFeed::new(&config.jupiter)?);
    let notifier = build_notifier(&config.telegram)?;
    let store: Arc<dyn AccountStore> = Arc::new(
        JsonAccountStore::open(&config.store.path)
            .with_context(|| format!("Failed to open account store {}", config.store.path))?,
    );

    let pipeline = Arc::new(SwapPipeline::new(
        Arc::clone(&rpc),
        router,
        PipelineOptions::from_config(&config),
    ));

    let parser = Arc::new(MigrationParser::new(
        Arc::clone(&rpc),
        Arc::new(TokenMetadataClient::new(Arc::clone(&rpc))),
        Arc::clone(&prices),
        &config.listener.program_id,
    ));
    let dispatcher = BuyDispatcher::new(
        Arc::clone(&store),
        Arc::clone(&pipeline),
        Arc::clone(&rpc),
        Arc::clone(&notifier),
    );
    let handler = Arc::new(MigrationHandler::new(parser, dispatcher, config.policy.broadcast));
    let listener = Arc::new(ChainEventListener::new(
        &config.listener.instruction_marker,
        SignatureHistory::new(SIGNATURE_HISTORY_CAPACITY),
        handler,
    ));

    let monitor = PositionMonitor::new(store, pipeline, rpc, prices, notifier, config_manager);

    Ok(Services {
        listener,
        ws_config: WebSocketConfig::from_rpc(&config.rpc, &config.listener.program_id),
        monitor,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    info!("🎯 LP Sniper - Main Controller");
    info!("======================================");

    let config_manager = Arc::new(load_config()?);
    let reload_task = config_manager.start_hot_reload();

    let services = match build_services(Arc::clone(&config_manager)) {
        Ok(services) => services,
        Err(e) => {
            error!("Failed to start services: {:#}", e);
            return Err(e);
        }
    };

    let mut orchestrator = ServiceOrchestrator::new();
    orchestrator.start_all_services(services);
    info!("Press Ctrl+C to shutdown all services");

    match signal::ctrl_c().await {
        Ok(()) => info!("🛑 Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    orchestrator.shutdown_all().await;
    if let Some(task) = reload_task {
        task.abort();
    }

    info!("👋 LP Sniper shutdown complete");
    Ok(())
}
