//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize logging and metrics
//! - Build the site, bind the listener, start the config watcher
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener binds last (traffic only when the site is built)

use std::path::Path;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::app::SiteBuilder;
use crate::config::{load_config, watcher::ConfigWatcher, ConfigError};
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::observability::{logging, metrics};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind listener: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to watch config file: {0}")]
    Watch(#[from] notify::Error),
}

/// Start the composer from a config file and serve until shutdown.
///
/// `customize` registers application providers, events or handlers on the
/// default builder.
pub async fn run(
    config_path: &Path,
    customize: impl FnOnce(SiteBuilder) -> SiteBuilder,
) -> Result<(), StartupError> {
    let config = load_config(config_path)?;
    logging::init(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        pages = config.pages.len(),
        datasources = config.datasources.len(),
        "page-composer starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let builder = customize(SiteBuilder::new(&config)?);
    let bind_address = config.server.bind_address.clone();
    let server = HttpServer::new(config, builder)?;

    let (watcher, updates) = ConfigWatcher::new(config_path);
    let _watcher = watcher.run()?;

    let shutdown = Shutdown::new();
    let stop = shutdown.subscribe();
    shutdown.trigger_on_signal();

    let listener = TcpListener::bind(&bind_address).await?;
    server.run(listener, updates, stop).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
