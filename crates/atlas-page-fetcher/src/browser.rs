//! Headless-browser rung of the escalation ladder (§4.5 rung 3).
//!
//! Actual browser automation is an out-of-scope external collaborator
//! (§1): this crate defines the trait the ladder calls through, plus
//! a no-op default that always reports `unavailable`, so a deployment
//! without a browser dependency still links and runs — it just never
//! climbs past rung 2.

use std::time::Instant;

use async_trait::async_trait;

use atlas_types::{AtlasError, FetchErrorKind};

use crate::FetchOptions;

#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub html: String,
    pub links: Vec<String>,
    pub candidate_json_endpoints: Vec<String>,
}

/// Cookie-consent selectors the renderer should attempt to click
/// before extracting content, per §4.5's "dismiss common
/// cookie-consent affordances."
pub const COOKIE_CONSENT_SELECTORS: &[&str] = &[
    "#onetrust-accept-btn-handler",
    "button[aria-label='Accept all']",
    ".cookie-consent-accept",
    "#accept-cookies",
    "button:contains('Accept')",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    Selector,
    NetworkIdle,
    FixedDelay,
}

#[async_trait]
pub trait BrowserRenderer: Send + Sync {
    /// Render `url` under `deadline`, blocking known resource
    /// categories (images, media, fonts, analytics, known ad domains)
    /// and drawing the request's user agent from a short rotation.
    async fn render(
        &self,
        url: &str,
        opts: &FetchOptions,
        deadline: Instant,
    ) -> Result<RenderOutcome, AtlasError>;
}

/// Always reports the browser rung as unavailable. The ladder treats
/// this exactly like a real renderer returning `Unavailable` — it
/// falls through to the rotated-header retry.
#[derive(Default)]
pub struct NoopBrowserRenderer;

#[async_trait]
impl BrowserRenderer for NoopBrowserRenderer {
    async fn render(
        &self,
        _url: &str,
        _opts: &FetchOptions,
        _deadline: Instant,
    ) -> Result<RenderOutcome, AtlasError> {
        Err(AtlasError::FetchFailed(FetchErrorKind::Unavailable))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_renderer_reports_unavailable() {
        let renderer = NoopBrowserRenderer;
        let err = renderer
            .render("https://example.com", &FetchOptions::default(), Instant::now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AtlasError::FetchFailed(FetchErrorKind::Unavailable)
        ));
    }
}
