//! `HttpPageFetcher`: the escalation-ladder reference implementation
//! of `PageFetcher` (§4.5). Grounded on the pack's `fetch.rs`
//! (PostHog cyclotron-fetch) for the request/response/error-trace
//! shape, adapted from a queue-driven single HTTP call into a
//! multi-rung ladder with a shared deadline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, instrument, warn};

use atlas_types::{AtlasError, FetchErrorKind};

use crate::browser::BrowserRenderer;
use crate::cache::ResultCache;
use crate::metadata::{extract_links, extract_metadata, html_to_markdown};
use crate::useragent::random_user_agent;
use crate::{classify_status, is_non_trivial, looks_like_captcha, FetchMethod, FetchOptions, FetchOutcome, PageFetcher};

/// Per-rung deadlines, each strictly less than the caller's overall
/// deadline (§4.5's "every attempt is bounded by a per-attempt
/// deadline strictly less than the caller's deadline").
const HEAD_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const HTTP_GET_TIMEOUT: Duration = Duration::from_secs(10);
const BROWSER_TIMEOUT: Duration = Duration::from_secs(8);
const RETRY_TIMEOUT: Duration = Duration::from_secs(10);

const JITTER_MIN_MS: u64 = 1_000;
const JITTER_MAX_MS: u64 = 3_000;
const FIXED_DELAY: Duration = Duration::from_secs(2);

pub struct HttpPageFetcher {
    client: reqwest::Client,
    browser: Arc<dyn BrowserRenderer>,
    cache: Arc<ResultCache>,
}

impl HttpPageFetcher {
    pub fn new(browser: Arc<dyn BrowserRenderer>, cache: Arc<ResultCache>) -> Self {
        Self {
            client: reqwest::Client::new(),
            browser,
            cache,
        }
    }

    /// Shrink `deadline` by a rung's own budget, never producing a
    /// sub-deadline at or after the caller's deadline.
    fn rung_deadline(&self, deadline: Instant, rung_budget: Duration) -> Instant {
        let now = Instant::now();
        let remaining = deadline.saturating_duration_since(now);
        let budget = rung_budget.min(remaining);
        now + budget
    }

    async fn head_probe(&self, url: &str, deadline: Instant) -> Result<(), AtlasError> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        self.client
            .head(url)
            .timeout(timeout)
            .send()
            .await
            .map(|_| ())
            .map_err(classify_transport)
    }

    async fn http_get(
        &self,
        url: &str,
        headers: Option<reqwest::header::HeaderMap>,
        timeout: Duration,
    ) -> Result<(u16, String), AtlasError> {
        let mut request = self.client.get(url).timeout(timeout);
        if let Some(headers) = headers {
            request = request.headers(headers);
        }
        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();

        if let Some(kind) = classify_status(status.as_u16()) {
            return Err(AtlasError::FetchFailed(kind));
        }

        let body = response.text().await.map_err(classify_transport)?;
        if looks_like_captcha(&body) {
            return Err(AtlasError::FetchFailed(FetchErrorKind::Captcha));
        }
        Ok((status.as_u16(), body))
    }

    fn to_outcome(&self, url: &str, html: String, status: Option<u16>, method: FetchMethod, opts: &FetchOptions) -> FetchOutcome {
        let metadata = extract_metadata(&html, opts.harvest_json_ld);
        let links = extract_links(&html, url);
        let markdown = html_to_markdown(&html);
        FetchOutcome {
            html,
            markdown,
            metadata,
            links,
            method,
            http_status: status,
        }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    #[instrument(skip(self, opts), fields(url = %url))]
    async fn fetch(
        &self,
        url: &str,
        opts: &FetchOptions,
        deadline: Instant,
    ) -> Result<FetchOutcome, AtlasError> {
        let cache_key = ResultCache::key(url, opts);
        if let Some(cached) = self.cache.get(cache_key).await {
            debug!("page fetcher cache hit");
            return Ok(cached);
        }

        // Rung 1: HEAD probe. Best-effort content-type/JSON sniff;
        // failure here never aborts the ladder, it just skips the
        // sniff and proceeds to a direct GET.
        let _ = self
            .head_probe(url, self.rung_deadline(deadline, HEAD_PROBE_TIMEOUT))
            .await;

        // Rung 2: direct HTTP GET.
        let get_timeout = self
            .rung_deadline(deadline, HTTP_GET_TIMEOUT)
            .saturating_duration_since(Instant::now());
        let mut last_err = match self.http_get(url, None, get_timeout).await {
            Ok((status, body)) if is_non_trivial(&body) => {
                let outcome = self.to_outcome(url, body, Some(status), FetchMethod::HttpGet, opts);
                self.cache.put(cache_key, outcome.clone()).await;
                return Ok(outcome);
            }
            Ok((_status, body)) if body.is_empty() => {
                AtlasError::FetchFailed(FetchErrorKind::Network("empty response body".into()))
            }
            Ok(_) => AtlasError::FetchFailed(FetchErrorKind::Network(
                "response too small to be non-trivial content".into(),
            )),
            Err(e) => e,
        };

        // Rung 3: headless browser render, aggressive resource
        // blocking delegated to the `BrowserRenderer` implementation.
        let browser_deadline = self.rung_deadline(deadline, BROWSER_TIMEOUT);
        match self.browser.render(url, opts, browser_deadline).await {
            Ok(render) => {
                let mut metadata = extract_metadata(&render.html, opts.harvest_json_ld);
                metadata.candidate_json_endpoints = render.candidate_json_endpoints;
                let markdown = html_to_markdown(&render.html);
                let outcome = FetchOutcome {
                    html: render.html,
                    markdown,
                    metadata,
                    links: render.links,
                    method: FetchMethod::Browser,
                    http_status: None,
                };
                self.cache.put(cache_key, outcome.clone()).await;
                return Ok(outcome);
            }
            Err(e) => {
                warn!(error = %e, "browser rung unavailable, falling through");
                last_err = e;
            }
        }

        // Rung 4: rotated-header HTTP retry with 1-3s jitter.
        let jitter_ms = rand::thread_rng().gen_range(JITTER_MIN_MS..=JITTER_MAX_MS);
        tokio::time::sleep(Duration::from_millis(jitter_ms)).await;

        let mut headers = reqwest::header::HeaderMap::new();
        if let Ok(value) = reqwest::header::HeaderValue::from_str(random_user_agent()) {
            headers.insert(reqwest::header::USER_AGENT, value);
        }
        let retry_timeout = self
            .rung_deadline(deadline, RETRY_TIMEOUT)
            .saturating_duration_since(Instant::now());
        match self.http_get(url, Some(headers), retry_timeout).await {
            Ok((status, body)) if is_non_trivial(&body) => {
                let outcome = self.to_outcome(url, body, Some(status), FetchMethod::RotatedHeaderRetry, opts);
                self.cache.put(cache_key, outcome.clone()).await;
                return Ok(outcome);
            }
            Ok(_) => {}
            Err(e) => last_err = e,
        }

        // Rung 5: fixed-delay retry, last resort.
        tokio::time::sleep(FIXED_DELAY).await;
        let final_timeout = self
            .rung_deadline(deadline, HTTP_GET_TIMEOUT)
            .saturating_duration_since(Instant::now());
        match self.http_get(url, None, final_timeout).await {
            Ok((status, body)) if is_non_trivial(&body) => {
                let outcome = self.to_outcome(url, body, Some(status), FetchMethod::DelayedRetry, opts);
                self.cache.put(cache_key, outcome.clone()).await;
                Ok(outcome)
            }
            Ok(_) => Err(last_err),
            Err(e) => Err(e),
        }
    }
}

fn classify_transport(error: reqwest::Error) -> AtlasError {
    if error.is_timeout() {
        AtlasError::FetchFailed(FetchErrorKind::Network("request timed out".into()))
    } else {
        AtlasError::FetchFailed(FetchErrorKind::Network(error.to_string()))
    }
}
