//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize all subsystems in dependency order
//! - Bind the listener and serve until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listener binds last (traffic only when ready)
//! - Draining is bounded by `timeouts.shutdown_secs`

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::validation::validate_config;
use crate::config::{load_config, AppConfig, ConfigError};
use crate::http::server::{HttpServer, ServerDeps};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::spawn_signal_listener;
use crate::observability::tracing::{init_tracing, shutdown_tracing, OtelTracer};
use crate::observability::{logging, metrics};
use crate::outbound::{MemoryCache, MemoryUserStore};
use crate::resilience::BreakerConfigError;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("logging: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),

    #[error("metrics: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("circuit breaker: {0}")]
    Breaker(#[from] BreakerConfigError),

    #[error("bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server: {0}")]
    Serve(#[source] std::io::Error),
}

/// A built server bound to its listener, not yet accepting.
pub struct App {
    config: AppConfig,
    server: HttpServer,
    listener: TcpListener,
}

impl App {
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    pub fn server(&self) -> &HttpServer {
        &self.server
    }

    /// Serve until `shutdown` fires, then drain for at most
    /// `timeouts.shutdown_secs`.
    ///
    /// Subscribes before returning, so a trigger that races the first poll
    /// still stops the server.
    pub fn serve(self, shutdown: &Shutdown) -> impl Future<Output = Result<(), StartupError>> + Send {
        let grace = Duration::from_secs(self.config.timeouts.shutdown_secs);
        let mut stop = shutdown.subscribe();
        let server = self.server.run(self.listener, shutdown.subscribe());

        async move {
            tokio::pin!(server);
            tokio::select! {
                result = &mut server => return result.map_err(StartupError::Serve),
                _ = stop.recv() => {}
            }

            match tokio::time::timeout(grace, &mut server).await {
                Ok(result) => result.map_err(StartupError::Serve),
                Err(_) => {
                    tracing::warn!(
                        grace_secs = grace.as_secs(),
                        "Drain deadline passed, dropping open connections"
                    );
                    Ok(())
                }
            }
        }
    }
}

/// Build the server over `deps` and bind its listener.
pub async fn build_app(config: AppConfig, deps: ServerDeps) -> Result<App, StartupError> {
    let server = HttpServer::new(&config, deps)?;

    let address = config.listener.bind_address.clone();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })?;

    tracing::info!(
        address = %listener.local_addr().map_err(StartupError::Serve)?,
        environment = %config.app.environment,
        "Listening for connections"
    );

    Ok(App {
        config,
        server,
        listener,
    })
}

/// Load configuration, or use defaults when no path is given.
pub fn read_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => {
            let config = AppConfig::default();
            validate_config(&config).map_err(ConfigError::Validation)?;
            Ok(config)
        }
    }
}

/// Run the process: config, logging, tracing, metrics, stores, server.
pub async fn run(config_path: Option<&Path>) -> Result<(), StartupError> {
    let config = read_config(config_path)?;

    logging::init_logging(&config.observability, config.app.development)?;
    tracing::info!(
        name = %config.app.name,
        version = env!("CARGO_PKG_VERSION"),
        "starting"
    );

    let observability = &config.observability;
    if observability.tracing_enabled {
        init_tracing(observability, &config.app.environment);
    }

    if observability.metrics_enabled {
        let addr = observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(observability.metrics_address.clone()))?;
        metrics::init_metrics(addr)?;
    }

    let deps = ServerDeps {
        users: Arc::new(MemoryUserStore::new()),
        cache: Arc::new(MemoryCache::new()),
        tracer: Arc::new(OtelTracer::new(observability.service_name.clone())),
    };
    let tracing_enabled = observability.tracing_enabled;

    let app = build_app(config, deps).await?;

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());
    let result = app.serve(&shutdown).await;

    if tracing_enabled {
        shutdown_tracing();
    }
    tracing::info!("Shutdown complete");
    result
}
