//! Run the HTTP service.

use crate::config::ProbeConfig;
use crate::server;
use anyhow::Result;
use tracing::info;

pub async fn run(config: ProbeConfig) -> Result<()> {
    info!("starting streamprobe v{}", env!("CARGO_PKG_VERSION"));
    info!(
        timeout_ms = config.navigation_timeout.as_millis() as u64,
        idle_ms = config.idle_window.as_millis() as u64,
        max_sessions = config.max_sessions,
        "job settings"
    );

    let session = super::browser_session(&config);
    server::serve(config, session).await
}
