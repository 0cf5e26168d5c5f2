//! # Dialer Server
//!
//! Runs the HTTP API over a [`DialerEngine`] together with the periodic
//! refresh of every active dynamic list.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::create_router;
use crate::config::{DialerConfig, LoggingConfig};
use crate::engine::DialerEngine;
use crate::error::{DialerError, Result};

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over the configured filter when it is set.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| DialerError::configuration(format!("invalid log filter: {}", e)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false);

    let installed = if config.json {
        builder.json().with_writer(std::io::stdout).try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| DialerError::configuration(format!("tracing already initialized: {}", e)))
}

pub struct DialerServer {
    engine: DialerEngine,
    refresh_handle: Option<JoinHandle<()>>,
}

impl DialerServer {
    /// Connect to the configured database and build the engine
    pub async fn new(config: DialerConfig) -> Result<Self> {
        info!("🚀 Creating dialer server");
        let engine = DialerEngine::connect(config).await?;
        Ok(Self::with_engine(engine))
    }

    pub fn with_engine(engine: DialerEngine) -> Self {
        Self {
            engine,
            refresh_handle: None,
        }
    }

    pub fn engine(&self) -> &DialerEngine {
        &self.engine
    }

    /// Seed the predefined lists and dispositions
    pub async fn seed(&self) -> Result<()> {
        let lists = self.engine.ensure_predefined_lists().await?;
        let dispositions = self.engine.ensure_predefined_dispositions().await?;
        info!("✅ Seeded {} lists and {} dispositions", lists, dispositions);
        Ok(())
    }

    /// Spawn the periodic dynamic refresh when an interval is configured
    pub fn start_refresh_task(&mut self) {
        let secs = self.engine.config().population.refresh_interval_secs;
        if secs == 0 {
            info!("⏸️ Periodic dynamic list refresh disabled");
            return;
        }
        if self.refresh_handle.is_some() {
            warn!("Refresh task already running");
            return;
        }

        let engine = self.engine.clone();
        let handle = tokio::spawn(async move {
            Self::refresh_loop(engine, Duration::from_secs(secs)).await;
        });
        self.refresh_handle = Some(handle);
        info!("✅ Started dynamic list refresh every {}s", secs);
    }

    async fn refresh_loop(engine: DialerEngine, period: Duration) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match engine.refresh_all_dynamic().await {
                Ok(results) => {
                    let added: usize = results.iter().map(|r| r.added).sum();
                    if added > 0 {
                        info!("🔄 Refreshed {} dynamic lists, {} items added", results.len(), added);
                    }
                }
                Err(e) => error!("Dynamic list refresh failed: {}", e),
            }
        }
    }

    /// Serve the HTTP API until the process is stopped
    pub async fn serve(&mut self) -> anyhow::Result<()> {
        let addr: SocketAddr = self.engine.config().api.bind_address.parse()?;
        self.start_refresh_task();

        let listener = TcpListener::bind(addr).await?;
        info!("📞 Dialer API listening on {}", addr);

        let app = create_router(self.engine.clone());
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        self.stop().await;
        Ok(())
    }

    pub async fn stop(&mut self) {
        info!("🛑 Stopping dialer server...");
        if let Some(handle) = self.refresh_handle.take() {
            handle.abort();
            let _ = handle.await;
        }
        info!("✅ Dialer server stopped");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
