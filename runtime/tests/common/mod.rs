//! Shared test doubles for job and API integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use streamprobe::config::ProbeConfig;
use streamprobe::error::SessionError;
use streamprobe::poller::{PollResult, StatusPoller};
use streamprobe::renderer::{BrowserSession, SessionCapture};
use tokio::sync::Notify;

/// What a [`ScriptedSession`] does once released.
#[derive(Clone)]
pub enum Script {
    Capture(SessionCapture),
    Fail(SessionError),
    /// Sleep far past any test timeout.
    Hang,
    Panic,
}

/// Browser stand-in that counts runs and tracks "live browsers" the way the
/// Chromium session does, including when its future is dropped mid-run.
pub struct ScriptedSession {
    script: Script,
    gate: Option<Arc<Notify>>,
    runs: AtomicUsize,
    live: Arc<AtomicUsize>,
}

struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedSession {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            gate: None,
            runs: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Runs block until `gate.notify_one()` is called.
    pub fn gated(script: Script, gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            script,
            gate: Some(gate),
            runs: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn run(&self, _url: &str, _timeout: Duration) -> Result<SessionCapture, SessionError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        let _live = LiveGuard(Arc::clone(&self.live));

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        match &self.script {
            Script::Capture(capture) => Ok(capture.clone()),
            Script::Fail(e) => Err(e.clone()),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!("hang script never finishes")
            }
            Script::Panic => panic!("scripted browser crash"),
        }
    }

    fn live_browsers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

pub fn capture(network: &[&str], dom: &[&str]) -> SessionCapture {
    SessionCapture {
        title: Some("Sample Film".to_string()),
        candidate_urls: network.iter().map(|s| s.to_string()).collect(),
        dom_urls: dom.iter().map(|s| s.to_string()).collect(),
    }
}

/// Config with short bounds so timeout paths settle quickly.
pub fn fast_config() -> ProbeConfig {
    ProbeConfig {
        navigation_timeout: Duration::from_millis(200),
        idle_window: Duration::from_millis(50),
        teardown_grace: Duration::from_millis(100),
        ..ProbeConfig::default()
    }
}

/// Poll until the result is terminal or two seconds pass.
pub async fn wait_terminal(poller: &StatusPoller, id: u64) -> PollResult {
    for _ in 0..400 {
        match poller.poll(id) {
            PollResult::InProgress => tokio::time::sleep(Duration::from_millis(5)).await,
            other => return other,
        }
    }
    panic!("job {id} did not settle");
}
