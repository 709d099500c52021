//! Unauthenticated HTTP fetch strategies
//!
//! The cheapest two backends: a small number of plain GETs against the
//! mobile or desktop search endpoint, extractor applied to whatever comes
//! back. Fast and low-yield, with a real chance of being blocked or served
//! a login wall; request failures are logged and skipped, never fatal.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use rand::seq::SliceRandom;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT},
    Client,
};
use scraper::Html;
use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;

use crate::collect::orchestrator::CandidateGate;
use crate::collect::{encode_query, CollectError, CollectStrategy};
use crate::config::CollectConfig;
use crate::error::Result;
use crate::extract::extract_invite_links;

/// Pool of realistic User-Agent strings for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_6) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.4 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

/// Rate-limited page fetcher shared by both HTTP strategies.
pub struct SearchFetcher {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    max_retries: u32,
    base_delay_ms: u64,
}

impl SearchFetcher {
    pub fn new(config: &CollectConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .gzip(true)
            .cookie_store(true)
            .build()
            .map_err(CollectError::Http)?;

        let rate = NonZeroU32::new(config.rate_limit).unwrap_or(NonZeroU32::new(1).unwrap());
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            rate_limiter,
            max_retries: config.max_retries,
            base_delay_ms: 1000,
        })
    }

    /// Fetch one page with rate limiting and bounded retry.
    pub async fn fetch_page(&self, url: &str) -> std::result::Result<String, CollectError> {
        self.rate_limiter.until_ready().await;

        let mut last_error = CollectError::Status(0);

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay_ms * 2_u64.pow(attempt - 1);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self
                .client
                .get(url)
                .headers(self.build_headers())
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.text().await.map_err(CollectError::Http);
                    }
                    if !Self::should_retry(status.as_u16()) {
                        return Err(CollectError::Status(status.as_u16()));
                    }
                    last_error = CollectError::Status(status.as_u16());
                }
                Err(e) => {
                    last_error = CollectError::Http(e);
                }
            }
        }

        Err(last_error)
    }

    /// Retry on throttling and transient server errors only.
    fn should_retry(status: u16) -> bool {
        matches!(status, 429 | 500 | 502 | 503 | 504)
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(Self::random_user_agent()));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers
    }

    fn random_user_agent() -> &'static str {
        let mut rng = rand::thread_rng();
        USER_AGENTS.choose(&mut rng).unwrap_or(&USER_AGENTS[0])
    }
}

/// Flatten a document to its visible text.
fn page_text(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Plain fetch against the lightweight mobile search endpoint.
pub struct MobileFetchStrategy {
    fetcher: SearchFetcher,
    max_pages: usize,
    base_url: Option<String>,
}

impl MobileFetchStrategy {
    pub fn new(config: &CollectConfig) -> Result<Self> {
        Ok(Self {
            fetcher: SearchFetcher::new(config)?,
            max_pages: config.max_pages,
            base_url: None,
        })
    }

    /// Override the endpoint host for testing with a mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn search_url(&self, keyword: &str) -> String {
        let base = self
            .base_url
            .as_deref()
            .unwrap_or("https://mobile.twitter.com");
        format!(
            "{base}/search?q={}&src=typed_query&f=live",
            encode_query(keyword)
        )
    }
}

#[async_trait]
impl CollectStrategy for MobileFetchStrategy {
    fn name(&self) -> &'static str {
        "mobile"
    }

    async fn run(&self, keyword: &str, gate: &mut CandidateGate) -> Result<()> {
        gate.log("[mobile-fetch] searching mobile endpoint");

        for page in 0..self.max_pages {
            let url = self.search_url(keyword);
            let html = match self.fetcher.fetch_page(&url).await {
                Ok(html) => html,
                Err(e) => {
                    gate.log(&format!("[mobile-fetch] request failed: {e}"));
                    continue;
                }
            };

            // The mobile page renders links as text, so flatten first
            let links = extract_invite_links(&page_text(&html));
            gate.log(&format!(
                "[mobile-fetch] page {} yielded {} invite links",
                page + 1,
                links.len()
            ));
            for link in links {
                gate.offer(&link, &url)?;
            }
        }

        Ok(())
    }
}

/// Headless fetch against the full desktop search endpoint.
pub struct DesktopFetchStrategy {
    fetcher: SearchFetcher,
    max_pages: usize,
    base_url: Option<String>,
}

impl DesktopFetchStrategy {
    pub fn new(config: &CollectConfig) -> Result<Self> {
        Ok(Self {
            fetcher: SearchFetcher::new(config)?,
            max_pages: config.max_pages,
            base_url: None,
        })
    }

    /// Override the endpoint host for testing with a mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn search_url(&self, keyword: &str) -> String {
        let base = self.base_url.as_deref().unwrap_or("https://x.com");
        format!("{base}/search?q={}&f=live", encode_query(keyword))
    }
}

#[async_trait]
impl CollectStrategy for DesktopFetchStrategy {
    fn name(&self) -> &'static str {
        "desktop"
    }

    async fn run(&self, keyword: &str, gate: &mut CandidateGate) -> Result<()> {
        gate.log("[desktop-fetch] searching desktop endpoint");

        for page in 0..self.max_pages {
            let url = self.search_url(keyword);
            let html = match self.fetcher.fetch_page(&url).await {
                Ok(html) => html,
                Err(e) => {
                    gate.log(&format!("[desktop-fetch] request failed: {e}"));
                    continue;
                }
            };

            // Desktop markup embeds links in attributes as well as text
            let links = extract_invite_links(&html);
            gate.log(&format!(
                "[desktop-fetch] page {} yielded {} invite links",
                page + 1,
                links.len()
            ));
            for link in links {
                gate.offer(&link, &url)?;
            }
        }

        Ok(())
    }
}
