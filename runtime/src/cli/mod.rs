//! CLI subcommand implementations for the streamprobe binary.

pub mod doctor;
pub mod probe;
pub mod serve;

use crate::config::ProbeConfig;
use crate::renderer::chromium::ChromiumSession;
use crate::renderer::{BrowserSession, UnavailableBrowser};
use std::sync::Arc;
use tracing::{info, warn};

/// Build the Chromium session, or a stub that fails every run.
pub fn browser_session(config: &ProbeConfig) -> Arc<dyn BrowserSession> {
    match ChromiumSession::new(config.chromium_path.clone(), config.idle_window) {
        Ok(session) => {
            info!("Chromium found at {}", session.chrome_path().display());
            Arc::new(session)
        }
        Err(e) => {
            warn!("Failed to initialize Chromium: {e:#}");
            warn!("Every extraction job will fail until a browser is available");
            Arc::new(UnavailableBrowser)
        }
    }
}

/// Initialize tracing: `RUST_LOG` wins, otherwise `streamprobe=info`
/// (or `debug` with `--verbose`).
pub fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose {
        "streamprobe=debug"
    } else {
        "streamprobe=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
