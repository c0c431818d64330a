//! HTTP server bootstrap and shared state.

use crate::config::{ProbeConfig, EVENT_BUS_CAPACITY};
use crate::events::EventBus;
use crate::poller::StatusPoller;
use crate::registry::JobRegistry;
use crate::renderer::BrowserSession;
use crate::rest;
use crate::scheduler::JobScheduler;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// State shared by every request handler.
pub struct AppState {
    pub started_at: Instant,
    pub registry: Arc<JobRegistry>,
    pub scheduler: JobScheduler,
    pub poller: StatusPoller,
    pub events: Arc<EventBus>,
}

impl AppState {
    /// Wire registry, scheduler, poller, and event bus around `session`.
    pub fn new(session: Arc<dyn BrowserSession>, config: &ProbeConfig) -> Arc<Self> {
        let registry = Arc::new(JobRegistry::new());
        let events = Arc::new(EventBus::new(EVENT_BUS_CAPACITY));
        let scheduler = JobScheduler::new(
            Arc::clone(&registry),
            session,
            Arc::clone(&events),
            config,
        );
        Arc::new(Self {
            started_at: Instant::now(),
            poller: StatusPoller::new(Arc::clone(&registry)),
            registry,
            scheduler,
            events,
        })
    }
}

/// Serve the REST API until Ctrl-C.
pub async fn serve(config: ProbeConfig, session: Arc<dyn BrowserSession>) -> Result<()> {
    let state = AppState::new(session, &config);
    let app = rest::router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!("REST API listening on http://{}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
