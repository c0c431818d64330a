//! Manifest candidate filtering and order-preserving deduplication.
//!
//! Network traffic is noisy (segments, variant playlists, ad beacons), so
//! observed request URLs must look like a top-level `master`/`index`
//! playlist. URLs read from `<video>`/`<source>` attributes only need the
//! manifest extension.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// File extension every manifest candidate must contain.
pub const MANIFEST_EXTENSION: &str = ".m3u8";

fn playlist_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(master|index)[^/]*\.m3u8$").expect("static regex is valid")
    })
}

/// Last path segment of a URL, ignoring query string and fragment.
fn file_name(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let path = &url[..end];
    path.rsplit('/').next().unwrap_or(path)
}

/// Whether a DOM-sourced URL is a manifest candidate.
pub fn is_dom_candidate(url: &str) -> bool {
    url.contains(MANIFEST_EXTENSION)
}

/// Whether a network-observed request URL is a manifest candidate.
pub fn is_network_candidate(url: &str) -> bool {
    is_dom_candidate(url) && playlist_name_pattern().is_match(file_name(url))
}

/// Merge network and DOM candidates into one ordered, duplicate-free list.
///
/// Network URLs come first in observation order, then DOM URLs. A URL seen
/// on both channels keeps its earliest position.
pub fn extract<N, D>(network_urls: N, dom_urls: D) -> Vec<String>
where
    N: IntoIterator,
    N::Item: AsRef<str>,
    D: IntoIterator,
    D::Item: AsRef<str>,
{
    let network = network_urls
        .into_iter()
        .filter(|u| is_network_candidate(u.as_ref()))
        .map(|u| u.as_ref().to_string());
    let dom = dom_urls
        .into_iter()
        .filter(|u| is_dom_candidate(u.as_ref()))
        .map(|u| u.as_ref().to_string());

    let mut seen = HashSet::new();
    network.chain(dom).filter(|u| seen.insert(u.clone())).collect()
}
