//! Chromium-backed browser sessions using chromiumoxide.
//!
//! Each run launches its own Chromium process with a throwaway profile
//! directory, so concurrent jobs never share cookies, cache, or service
//! workers.
//!
//! Site isolation is switched off so cross-origin player iframes render in
//! the page's own process; their requests then reach the page's network
//! listener. The DOM channel only reads the top-level document.

use super::{BrowserSession, SessionCapture};
use crate::error::SessionError;
use crate::extractor::{is_dom_candidate, is_network_candidate};
use anyhow::Context;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{EnableParams, EventRequestWillBeSent};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Collects `src` of media elements, resolved against the document URL.
const MEDIA_SOURCES_JS: &str = r#"
Array.from(document.querySelectorAll('video[src], video source[src], source[src]'))
    .map(el => el.src || el.getAttribute('src'))
    .filter(Boolean)
"#;

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. STREAMPROBE_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("STREAMPROBE_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.streamprobe/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".streamprobe/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".streamprobe/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".streamprobe/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".streamprobe/chromium/chrome-linux64/chrome"),
                home.join(".streamprobe/chromium/chrome"),
            ]
        };
        if let Some(found) = candidates.into_iter().find(|c| c.exists()) {
            return Some(found);
        }
    }

    // 3. System PATH
    ["google-chrome", "chromium", "chromium-browser"]
        .into_iter()
        .find_map(|name| which::which(name).ok())
}

/// Launches one Chromium per [`BrowserSession::run`] call.
pub struct ChromiumSession {
    chrome_path: PathBuf,
    idle_window: Duration,
    live: Arc<AtomicUsize>,
}

impl ChromiumSession {
    /// Use `chrome_path` if given, otherwise discover a binary.
    pub fn new(chrome_path: Option<PathBuf>, idle_window: Duration) -> anyhow::Result<Self> {
        let chrome_path = match chrome_path {
            Some(path) => path,
            None => find_chromium()
                .context("Chromium not found. Install it or set STREAMPROBE_CHROMIUM_PATH.")?,
        };
        anyhow::ensure!(
            chrome_path.exists(),
            "Chromium binary does not exist: {}",
            chrome_path.display()
        );
        Ok(Self {
            chrome_path,
            idle_window,
            live: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn chrome_path(&self) -> &Path {
        &self.chrome_path
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn run(&self, url: &str, timeout: Duration) -> Result<SessionCapture, SessionError> {
        let deadline = Instant::now() + timeout;
        let guard = BrowserGuard::launch(&self.chrome_path, Arc::clone(&self.live)).await?;

        let outcome = match guard.browser.as_ref() {
            Some(browser) => observe(browser, url, deadline, timeout, self.idle_window).await,
            None => Err(SessionError::Launch("browser already shut down".to_string())),
        };

        guard.shutdown().await;
        outcome
    }

    fn live_browsers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// Owns one Chromium process for the duration of a run.
///
/// `shutdown` closes the browser gracefully. If the owning task is cancelled
/// or panics first, dropping the guard drops the `Browser`, whose child
/// process is killed on drop.
struct BrowserGuard {
    browser: Option<Browser>,
    handler: JoinHandle<()>,
    live: Arc<AtomicUsize>,
    _profile: TempDir,
}

impl BrowserGuard {
    async fn launch(chrome_path: &Path, live: Arc<AtomicUsize>) -> Result<Self, SessionError> {
        let profile = tempfile::Builder::new()
            .prefix("streamprobe-profile-")
            .tempdir()
            .map_err(|e| SessionError::Launch(format!("failed to create profile dir: {e}")))?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .user_data_dir(profile.path())
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--mute-audio")
            .arg("--disable-site-isolation-trials")
            .arg("--disable-features=IsolateOrigins,site-per-process")
            .arg("--autoplay-policy=no-user-gesture-required")
            .build()
            .map_err(|e| SessionError::Launch(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SessionError::Launch(format!("failed to launch Chromium: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        live.fetch_add(1, Ordering::SeqCst);
        Ok(Self {
            browser: Some(browser),
            handler,
            live,
            _profile: profile,
        })
    }

    async fn shutdown(mut self) {
        let Some(mut browser) = self.browser.take() else {
            return;
        };
        if let Err(e) = browser.close().await {
            warn!("graceful browser close failed: {e}");
        }
        match browser.wait().await {
            Ok(_) => {}
            Err(e) => {
                warn!("waiting for browser exit failed, killing: {e}");
                if let Some(Err(e)) = browser.kill().await {
                    warn!("failed to kill browser: {e}");
                }
            }
        }
    }
}

impl Drop for BrowserGuard {
    fn drop(&mut self) {
        self.handler.abort();
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Navigate and observe one page.
///
/// Navigation must finish before `deadline`. The idle wait then ends at the
/// first quiet `idle_window` or at the deadline; reaching the deadline only
/// counts as a timeout when nothing was captured.
async fn observe(
    browser: &Browser,
    url: &str,
    deadline: Instant,
    timeout: Duration,
    idle_window: Duration,
) -> Result<SessionCapture, SessionError> {
    let timed_out = || SessionError::Timeout {
        timeout_ms: timeout.as_millis() as u64,
    };

    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| SessionError::Launch(format!("failed to create page: {e}")))?;

    if let Err(e) = page.execute(EnableParams::default()).await {
        warn!("failed to enable Network domain: {e}");
    }

    // Subscribe before navigating so the load sequence is fully observed.
    let mut requests = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(|e| SessionError::Launch(format!("failed to observe network: {e}")))?;

    match tokio::time::timeout_at(deadline, page.goto(url)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => return Err(SessionError::Navigation(e.to_string())),
        Err(_) => return Err(timed_out()),
    }

    let mut candidate_urls = Vec::new();
    let mut observed = 0usize;
    let mut hit_deadline = false;
    loop {
        let idle_at = (Instant::now() + idle_window).min(deadline);
        match tokio::time::timeout_at(idle_at, requests.next()).await {
            Ok(Some(event)) => {
                observed += 1;
                let request_url = &event.request.url;
                if is_network_candidate(request_url) {
                    debug!(url = %request_url, "manifest request observed");
                    candidate_urls.push(request_url.clone());
                }
            }
            Ok(None) => break,
            Err(_) => {
                hit_deadline = Instant::now() >= deadline;
                break;
            }
        }
    }

    // The DOM channel gets one idle window of its own past the deadline.
    let dom_urls = tokio::time::timeout(idle_window, media_sources(&page))
        .await
        .unwrap_or_default();
    let title = tokio::time::timeout(idle_window, page.get_title())
        .await
        .ok()
        .and_then(|r| r.ok())
        .flatten()
        .filter(|t| !t.trim().is_empty());

    if let Err(e) = page.close().await {
        debug!("page close failed: {e}");
    }

    debug!(
        requests = observed,
        network = candidate_urls.len(),
        dom = dom_urls.len(),
        "page observed"
    );

    if hit_deadline && candidate_urls.is_empty() && dom_urls.is_empty() {
        return Err(timed_out());
    }

    Ok(SessionCapture {
        title,
        candidate_urls,
        dom_urls,
    })
}

async fn media_sources(page: &Page) -> Vec<String> {
    let value = match page.evaluate(MEDIA_SOURCES_JS).await {
        Ok(result) => result.into_value::<Vec<String>>(),
        Err(e) => {
            debug!("media source query failed: {e}");
            return Vec::new();
        }
    };
    match value {
        Ok(urls) => urls.into_iter().filter(|u| is_dom_candidate(u)).collect(),
        Err(e) => {
            debug!("media source result not a string list: {e:?}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;

    fn session() -> ChromiumSession {
        ChromiumSession::new(None, Duration::from_millis(500)).expect("Chromium not found")
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_dom_sources_captured() {
        let session = session();
        let capture = session
            .run(
                "data:text/html,<title>Clip</title><video src=\"https://cdn.invalid/hls/720p.m3u8\"></video>",
                Duration::from_secs(15),
            )
            .await
            .expect("session failed");

        assert_eq!(capture.title.as_deref(), Some("Clip"));
        assert_eq!(capture.dom_urls, vec!["https://cdn.invalid/hls/720p.m3u8"]);
        assert_eq!(session.live_browsers(), 0);
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_slow_page_times_out_and_tears_down() {
        let app = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "never"
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let session = session();
        let err = session
            .run(&format!("http://{addr}/slow"), Duration::from_secs(2))
            .await
            .unwrap_err();

        assert_eq!(err, SessionError::Timeout { timeout_ms: 2000 });
        assert_eq!(session.live_browsers(), 0);
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_cross_origin_iframe_requests_captured() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // `localhost` and `127.0.0.1` are distinct origins.
        let embed = format!(
            "<title>Embed</title><iframe src=\"http://localhost:{port}/player\"></iframe>"
        );
        let app = Router::new()
            .route(
                "/embed",
                get(move || std::future::ready(axum::response::Html(embed.clone()))),
            )
            .route(
                "/player",
                get(|| async {
                    axum::response::Html("<script>fetch('/hls/master.m3u8')</script>")
                }),
            )
            .route("/hls/master.m3u8", get(|| async { "#EXTM3U\n" }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let session = session();
        let capture = session
            .run(&format!("http://127.0.0.1:{port}/embed"), Duration::from_secs(15))
            .await
            .expect("session failed");

        assert_eq!(
            capture.candidate_urls,
            vec![format!("http://localhost:{port}/hls/master.m3u8")]
        );
        assert_eq!(session.live_browsers(), 0);
    }

    #[test]
    fn test_missing_binary_rejected() {
        let result = ChromiumSession::new(
            Some(PathBuf::from("/nonexistent/streamprobe/chrome")),
            Duration::from_millis(500),
        );
        assert!(result.is_err());
    }
}
