//! Negotiator - deploys cloud apps and wires them to their supporting services

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use negotiator::api::{self, AppState};
use negotiator::client::KubeClientFactory;
use negotiator::config::Config;
use negotiator::configure::{ConfigurerFactory, EnvironmentController, HttpPushLister};
use negotiator::dispatch::Dispatcher;
use negotiator::status::{
    DurablePublisher, KeyValueStore, LogPublisher, MemoryStore, MultiPublisher, RedisStore,
};
use negotiator::telemetry::{init_logging, TelemetryConfig};
use negotiator::template::{FileTemplateLoader, Templates};

/// How often the in-process status store drops expired records
const MEMORY_STORE_SWEEP: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(TelemetryConfig::default())?;

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A TLS crypto provider was already installed");
    }

    let config = Config::parse();
    info!(
        template_dir = %config.template_dir.display(),
        listen_addr = %config.listen_addr,
        "Starting negotiator"
    );

    let loader = FileTemplateLoader::from_dir(&config.template_dir)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load templates: {}", e))?;
    let templates = Arc::new(Templates::new(Arc::new(loader)));

    let store = status_store(&config).await?;
    let durable = Arc::new(DurablePublisher::new(store));
    let publisher = Arc::new(MultiPublisher::new(Arc::new(LogPublisher), durable.clone()));

    let push_lister = Arc::new(HttpPushLister::new(config.cluster_accept_invalid_certs)?);
    let factory = ConfigurerFactory::new(
        publisher.clone(),
        templates.clone(),
        push_lister,
        config.configure_settings(),
    );
    let controller = EnvironmentController::new(Arc::new(factory), publisher);
    let dispatcher = Dispatcher::new(templates.clone(), Arc::new(controller));

    let state = AppState {
        dispatcher: Arc::new(dispatcher),
        clients: Arc::new(KubeClientFactory::new(config.cluster_accept_invalid_certs)),
        templates,
        status: durable,
        auth_key: config.auth_key.clone().filter(|k| !k.is_empty()),
        default_target: config.default_target(),
        deploy_namespace: config.deploy_namespace.clone(),
    };

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", config.listen_addr, e))?;
    info!(addr = %config.listen_addr, "Listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Negotiator shut down");
    Ok(())
}

/// Redis when a host is configured, otherwise the in-process store
async fn status_store(config: &Config) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    match config.redis_host.as_deref().filter(|h| !h.is_empty()) {
        Some(host) => {
            let store = RedisStore::connect(host, config.redis_port, config.redis_password.as_deref())
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to Redis at {}:{}: {}", host, config.redis_port, e))?;
            info!(host = %host, port = config.redis_port, "Using Redis status store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("REDIS_SERVICE_HOST not set; status is kept in memory");
            let store = Arc::new(MemoryStore::new());
            let sweeper = store.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(MEMORY_STORE_SWEEP);
                loop {
                    interval.tick().await;
                    sweeper.cleanup_expired();
                }
            });
            Ok(store)
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
