//! openmonitor server: applies the configured systems and serves the API.

use openmonitor::config::{load_config, ServerConfig};
use openmonitor::db::Store;
use openmonitor::reconcile_atomic;
use openmonitor::scheduler::RetentionManager;
use openmonitor::web::Server;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("openmonitor=info".parse()?))
        .init();

    let cfg = ServerConfig::load();
    tracing::info!("Starting openmonitor on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    let store = Store::open(&cfg.store_config())?;
    tracing::info!("Database initialized successfully");

    if let Some(path) = &cfg.config_path {
        let monitor_config = load_config(path)?;
        tracing::info!("Applying config {} (version {:?})", path, monitor_config.version);
        reconcile_atomic(&store, &monitor_config)?;
    }

    let retention = RetentionManager::new(store.clone(), cfg.retention_period());
    let _retention_task = retention.start().await;

    let server = Server::new(cfg, store);
    server.start().await?;

    retention.stop().await;
    Ok(())
}
