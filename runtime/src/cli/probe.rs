//! One-shot extraction against a single page, without the job machinery.

use crate::config::ProbeConfig;
use crate::extractor;
use crate::poller::label_links;
use anyhow::{bail, Context, Result};

pub async fn run(url: &str, config: ProbeConfig, json: bool) -> Result<()> {
    let parsed = url::Url::parse(url).with_context(|| format!("invalid URL: {url}"))?;
    if !matches!(parsed.scheme(), "http" | "https" | "file" | "data") {
        bail!("unsupported URL scheme: {}", parsed.scheme());
    }

    let session = super::browser_session(&config);
    let capture = session
        .run(parsed.as_str(), config.navigation_timeout)
        .await
        .context("browser session failed")?;

    let links = extractor::extract(&capture.candidate_urls, &capture.dom_urls);
    let title = capture.title.unwrap_or_default();

    if json {
        let out = serde_json::json!({
            "url": parsed.as_str(),
            "title": title,
            "items": label_links(&title, &links),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Title: {}", if title.is_empty() { "-" } else { title.as_str() });
        if links.is_empty() {
            println!("No manifest links found.");
        }
        for link in label_links(&title, &links) {
            println!("  {:<10} {}", link.label, link.playback_uri);
        }
    }

    if links.is_empty() {
        bail!("no manifest candidates found");
    }
    Ok(())
}
