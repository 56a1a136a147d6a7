//! C5 Page Fetcher.
//!
//! `fetch(url, opts, deadline)` obtains rendered page text/markdown/
//! links for a URL, escalating through a fixed ladder (HEAD → HTTP GET
//! → browser render → rotated-header retry → fixed-delay retry) and
//! stopping at the first rung that yields non-trivial content. Every
//! attempt is bounded by a per-attempt deadline strictly less than the
//! caller's deadline (§4.5).
//!
//! The headless-browser rung is modeled as a `BrowserRenderer` trait
//! object supplied by the caller — actual browser automation is out
//! of this crate's scope (§1), so the default implementation reports
//! `unavailable` and the ladder falls through to the HTTP retries.

pub mod browser;
pub mod cache;
pub mod http;
pub mod metadata;
pub mod useragent;

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use atlas_types::{AtlasError, FetchErrorKind};

pub use browser::{BrowserRenderer, NoopBrowserRenderer, RenderOutcome};
pub use cache::ResultCache;
pub use http::HttpPageFetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMethod {
    Head,
    HttpGet,
    Browser,
    RotatedHeaderRetry,
    DelayedRetry,
}

/// Per-call options. `opts` participates in the cache key alongside
/// the URL, so two callers asking for different rendering modes never
/// share a cache entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FetchOptions {
    pub wait_for_selector: Option<String>,
    pub harvest_json_ld: bool,
    pub intercept_json_endpoints: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub json_ld: Vec<serde_json::Value>,
    #[serde(default)]
    pub candidate_json_endpoints: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub html: String,
    pub markdown: String,
    pub metadata: PageMetadata,
    pub links: Vec<String>,
    pub method: FetchMethod,
    pub http_status: Option<u16>,
}

/// Minimum response length (bytes) to treat content as non-trivial;
/// below this the ladder keeps escalating rather than accepting a
/// near-empty page (§4.5 rung 2).
pub const NON_TRIVIAL_CONTENT_BYTES: usize = 200;

/// Sentinel substring indicating a client-rendered shell with no
/// server-rendered content.
pub const JS_REQUIRED_SENTINEL: &str = "requires JavaScript";

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a URL under `deadline`. Every attempt on the escalation
    /// ladder has its own sub-deadline strictly less than `deadline`;
    /// the overall call never outlives it.
    async fn fetch(
        &self,
        url: &str,
        opts: &FetchOptions,
        deadline: Instant,
    ) -> Result<FetchOutcome, AtlasError>;
}

/// Classify an HTTP status code into the `FetchErrorKind` taxonomy
/// used across the ladder and surfaced to callers for retry hints.
pub fn classify_status(status: u16) -> Option<FetchErrorKind> {
    match status {
        429 => Some(FetchErrorKind::RateLimited),
        403 => Some(FetchErrorKind::Forbidden),
        503 => Some(FetchErrorKind::Unavailable),
        _ => None,
    }
}

pub fn looks_like_captcha(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("captcha") || lower.contains("are you a human") || lower.contains("cf-challenge")
}

pub fn is_non_trivial(body: &str) -> bool {
    body.len() >= NON_TRIVIAL_CONTENT_BYTES && !body.contains(JS_REQUIRED_SENTINEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_status_codes() {
        assert_eq!(classify_status(429), Some(FetchErrorKind::RateLimited));
        assert_eq!(classify_status(403), Some(FetchErrorKind::Forbidden));
        assert_eq!(classify_status(503), Some(FetchErrorKind::Unavailable));
        assert_eq!(classify_status(200), None);
    }

    #[test]
    fn trivial_content_is_rejected() {
        assert!(!is_non_trivial("short"));
        assert!(!is_non_trivial(&("x".repeat(500) + JS_REQUIRED_SENTINEL)));
        assert!(is_non_trivial(&"x".repeat(500)));
    }

    #[test]
    fn captcha_sentinel_detected_case_insensitively() {
        assert!(looks_like_captcha("Please complete the CAPTCHA below"));
        assert!(!looks_like_captcha("welcome to the site"));
    }
}
