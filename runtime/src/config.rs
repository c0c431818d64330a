//! Runtime configuration.
//!
//! Defaults, then `STREAMPROBE_*` environment variables, then CLI flags.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default bound on navigation plus network-idle wait.
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Quiet period with no new network request that counts as idle.
pub const DEFAULT_IDLE_WINDOW: Duration = Duration::from_millis(1500);

/// Extra time granted to browser teardown beyond the navigation timeout.
pub const DEFAULT_TEARDOWN_GRACE: Duration = Duration::from_secs(5);

/// Browser sessions allowed to run at once across all jobs.
pub const DEFAULT_MAX_SESSIONS: usize = 4;

/// Largest accepted navigation timeout.
pub const MAX_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(600);

/// Largest accepted session cap. Each session is a full Chromium process.
pub const MAX_SESSIONS: usize = 64;

pub const DEFAULT_BIND: &str = "0.0.0.0:5000";

/// Buffer size of the job event bus.
pub const EVENT_BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub bind: SocketAddr,
    pub navigation_timeout: Duration,
    pub idle_window: Duration,
    pub teardown_grace: Duration,
    pub max_sessions: usize,
    /// Explicit Chromium binary; discovered when `None`.
    pub chromium_path: Option<PathBuf>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.parse().expect("default bind address is valid"),
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            idle_window: DEFAULT_IDLE_WINDOW,
            teardown_grace: DEFAULT_TEARDOWN_GRACE,
            max_sessions: DEFAULT_MAX_SESSIONS,
            chromium_path: None,
        }
    }
}

impl ProbeConfig {
    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("STREAMPROBE_BIND") {
            config.bind = v
                .trim()
                .parse()
                .with_context(|| format!("invalid STREAMPROBE_BIND: {v}"))?;
        }
        if let Some(v) = lookup("STREAMPROBE_TIMEOUT_MS") {
            config.navigation_timeout =
                Duration::from_millis(parse_u64("STREAMPROBE_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = lookup("STREAMPROBE_IDLE_MS") {
            config.idle_window = Duration::from_millis(parse_u64("STREAMPROBE_IDLE_MS", &v)?);
        }
        if let Some(v) = lookup("STREAMPROBE_MAX_SESSIONS") {
            config.max_sessions = parse_u64("STREAMPROBE_MAX_SESSIONS", &v)?
                .try_into()
                .with_context(|| format!("invalid STREAMPROBE_MAX_SESSIONS: {v}"))?;
        }
        if let Some(v) = lookup("STREAMPROBE_CHROMIUM_PATH") {
            config.chromium_path = Some(PathBuf::from(v));
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides on top of this config.
    pub fn with_overrides(
        mut self,
        bind: Option<SocketAddr>,
        timeout_ms: Option<u64>,
        idle_ms: Option<u64>,
        max_sessions: Option<usize>,
    ) -> Result<Self> {
        if let Some(bind) = bind {
            self.bind = bind;
        }
        if let Some(ms) = timeout_ms {
            self.navigation_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = idle_ms {
            self.idle_window = Duration::from_millis(ms);
        }
        if let Some(n) = max_sessions {
            self.max_sessions = n;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.navigation_timeout.is_zero(),
            "navigation timeout must be positive"
        );
        anyhow::ensure!(
            self.navigation_timeout <= MAX_NAVIGATION_TIMEOUT,
            "navigation timeout ({}ms) exceeds the maximum of {}ms",
            self.navigation_timeout.as_millis(),
            MAX_NAVIGATION_TIMEOUT.as_millis()
        );
        anyhow::ensure!(self.max_sessions > 0, "max sessions must be at least 1");
        anyhow::ensure!(
            self.max_sessions <= MAX_SESSIONS,
            "max sessions ({}) exceeds the maximum of {MAX_SESSIONS}",
            self.max_sessions
        );
        anyhow::ensure!(
            self.idle_window < self.navigation_timeout,
            "idle window ({}ms) must be shorter than the navigation timeout ({}ms)",
            self.idle_window.as_millis(),
            self.navigation_timeout.as_millis()
        );
        Ok(())
    }

    /// Hard upper bound on one job: navigation timeout plus teardown grace.
    pub fn job_deadline(&self) -> Duration {
        self.navigation_timeout + self.teardown_grace
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid {key}: {value}"))
}
