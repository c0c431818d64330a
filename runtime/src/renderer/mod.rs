//! Browser session abstraction.
//!
//! A [`BrowserSession`] drives one isolated browser instance per call and
//! reports what the page revealed: its title, manifest-like request URLs
//! seen on the wire, and manifest URLs found in media elements. The
//! production implementation is Chromium via chromiumoxide.

pub mod chromium;

use crate::error::SessionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What one browser session observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCapture {
    /// Document title, if the page set one.
    pub title: Option<String>,
    /// Network request URLs that passed the network candidate filter, in
    /// observation order.
    pub candidate_urls: Vec<String>,
    /// Manifest URLs read from `<video>`/`<source>` elements.
    pub dom_urls: Vec<String>,
}

/// Runs a page in a fresh, isolated browser and captures manifest candidates.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigate to `url` and observe it until the network goes idle.
    ///
    /// The browser is torn down before this returns, on every path.
    async fn run(&self, url: &str, timeout: Duration) -> Result<SessionCapture, SessionError>;

    /// Browsers currently alive (launched and not yet torn down).
    fn live_browsers(&self) -> usize;
}

/// Session used when no Chromium binary is available.
///
/// Every run fails with [`SessionError::Launch`], so jobs settle into
/// `Failed` while the rest of the service keeps working.
pub struct UnavailableBrowser;

#[async_trait]
impl BrowserSession for UnavailableBrowser {
    async fn run(&self, _url: &str, _timeout: Duration) -> Result<SessionCapture, SessionError> {
        Err(SessionError::Launch(
            "browser not available; set STREAMPROBE_CHROMIUM_PATH".to_string(),
        ))
    }

    fn live_browsers(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unavailable_browser_fails_launch() {
        let session = UnavailableBrowser;
        let err = session
            .run("https://example.com", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Launch(_)));
        assert_eq!(session.live_browsers(), 0);
    }
}
