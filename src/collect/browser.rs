//! Authenticated browser automation strategy
//!
//! The highest-yield backend: a real Chrome restores the saved session,
//! walks a matrix of search-URL variants and keeps scrolling to trigger the
//! feed's lazy loading. The feed virtualizes its DOM, so rendered posts are
//! scanned after every scroll step rather than once at the end. Page
//! interaction goes through the [`PageDriver`] seam; the strategy guarantees
//! the driver is released on every exit path, including a failure
//! mid-scroll.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::protocol::cdp::{Network, Page};
use headless_chrome::{Browser, LaunchOptions, Tab};
use rand::Rng;

use crate::collect::orchestrator::CandidateGate;
use crate::collect::{encode_query, jitter_secs, CollectError, CollectStrategy};
use crate::config::{CollectConfig, SessionConfig};
use crate::error::Result;
use crate::extract::extract_invite_links;
use crate::session::SessionSnapshot;

/// Post containers in the rendered search feed.
const POST_SELECTOR: &str = "[data-testid='tweet']";

/// Collects the innerHTML of every currently rendered post.
const RENDERED_POSTS_JS: &str = r#"JSON.stringify(Array.from(document.querySelectorAll("[data-testid='tweet']")).map((el) => el.innerHTML))"#;

/// Hides the automation flag the feed's anti-bot checks look for.
const SUPPRESS_WEBDRIVER_JS: &str = r#"
Object.defineProperty(navigator, 'webdriver', {
    get: () => undefined,
});
"#;

/// Minimal page surface the scroll engine needs.
///
/// A seam rather than direct `headless_chrome` calls, so the scroll and
/// teardown behavior can be exercised against a scripted double.
pub trait PageDriver: Send {
    fn navigate(&mut self, url: &str) -> std::result::Result<(), CollectError>;
    fn wait_for_posts(&mut self, timeout: Duration) -> std::result::Result<(), CollectError>;
    fn page_height(&mut self) -> std::result::Result<f64, CollectError>;
    fn scroll_to_bottom(&mut self) -> std::result::Result<(), CollectError>;
    fn rendered_posts(&mut self) -> std::result::Result<Vec<String>, CollectError>;
    fn page_content(&mut self) -> std::result::Result<String, CollectError>;
    fn reload(&mut self) -> std::result::Result<(), CollectError>;
    fn close(&mut self);
}

/// Launches drivers with a restored session.
pub trait DriverFactory: Send + Sync {
    fn launch(
        &self,
        snapshot: &SessionSnapshot,
    ) -> std::result::Result<Box<dyn PageDriver>, CollectError>;
}

/// Real Chrome factory.
pub struct ChromeFactory {
    config: CollectConfig,
}

impl ChromeFactory {
    pub fn new(config: CollectConfig) -> Self {
        Self { config }
    }

    fn random_viewport(&self) -> (u32, u32) {
        let mut rng = rand::thread_rng();
        let (w_min, w_max) = self.config.viewport_width;
        let (h_min, h_max) = self.config.viewport_height;
        (
            rng.gen_range(w_min..=w_max.max(w_min)),
            rng.gen_range(h_min..=h_max.max(h_min)),
        )
    }
}

impl DriverFactory for ChromeFactory {
    fn launch(
        &self,
        snapshot: &SessionSnapshot,
    ) -> std::result::Result<Box<dyn PageDriver>, CollectError> {
        let args: Vec<&OsStr> = vec![
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-gpu"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-infobars"),
        ];

        let options = LaunchOptions {
            headless: false,
            window_size: Some(self.random_viewport()),
            args,
            idle_browser_timeout: Duration::from_secs(self.config.idle_timeout_secs),
            ..Default::default()
        };

        let browser = Browser::new(options).map_err(|e| CollectError::Driver(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| CollectError::Driver(e.to_string()))?;
        tab.set_default_timeout(Duration::from_secs(self.config.page_load_timeout_secs));

        tab.enable_debugger()
            .map_err(|e| CollectError::Driver(e.to_string()))?;
        tab.call_method(Page::AddScriptToEvaluateOnNewDocument {
            source: SUPPRESS_WEBDRIVER_JS.to_string(),
            world_name: None,
            include_command_line_api: None,
            run_immediately: None,
        })
        .map_err(|e| CollectError::Driver(e.to_string()))?;

        restore_cookies(&tab, snapshot);

        Ok(Box::new(ChromeDriver {
            browser: Some(browser),
            tab: Some(tab),
        }))
    }
}

fn restore_cookies(tab: &Arc<Tab>, snapshot: &SessionSnapshot) {
    for cookie in &snapshot.cookies {
        let result = tab.call_method(Network::SetCookie {
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            url: None,
            domain: Some(cookie.domain.clone()),
            path: Some(cookie.path.clone()),
            secure: Some(cookie.secure),
            http_only: Some(cookie.http_only),
            same_site: None,
            expires: cookie.expires,
            priority: None,
            same_party: None,
            source_scheme: None,
            source_port: None,
            partition_key: None,
        });
        if let Err(e) = result {
            tracing::warn!(cookie = %cookie.name, error = %e, "failed to restore cookie");
        }
    }
}

/// `PageDriver` over one live Chrome tab.
pub struct ChromeDriver {
    browser: Option<Browser>,
    tab: Option<Arc<Tab>>,
}

impl ChromeDriver {
    fn tab(&self) -> std::result::Result<&Arc<Tab>, CollectError> {
        self.tab
            .as_ref()
            .ok_or_else(|| CollectError::Driver("browser already closed".to_string()))
    }
}

impl PageDriver for ChromeDriver {
    fn navigate(&mut self, url: &str) -> std::result::Result<(), CollectError> {
        self.tab()?
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map(|_| ())
            .map_err(|e| CollectError::PageLoad(e.to_string()))
    }

    fn wait_for_posts(&mut self, timeout: Duration) -> std::result::Result<(), CollectError> {
        self.tab()?
            .wait_for_element_with_custom_timeout(POST_SELECTOR, timeout)
            .map(|_| ())
            .map_err(|e| CollectError::ContentWait(e.to_string()))
    }

    fn page_height(&mut self) -> std::result::Result<f64, CollectError> {
        let result = self
            .tab()?
            .evaluate("document.body.scrollHeight", false)
            .map_err(|e| CollectError::Driver(e.to_string()))?;
        Ok(result.value.and_then(|v| v.as_f64()).unwrap_or(0.0))
    }

    fn scroll_to_bottom(&mut self) -> std::result::Result<(), CollectError> {
        self.tab()?
            .evaluate("window.scrollTo(0, document.body.scrollHeight)", false)
            .map(|_| ())
            .map_err(|e| CollectError::Driver(e.to_string()))
    }

    fn rendered_posts(&mut self) -> std::result::Result<Vec<String>, CollectError> {
        let result = self
            .tab()?
            .evaluate(RENDERED_POSTS_JS, false)
            .map_err(|e| CollectError::Driver(e.to_string()))?;

        match result.value {
            Some(serde_json::Value::String(raw)) => serde_json::from_str(&raw)
                .map_err(|e| CollectError::Driver(format!("bad post payload: {e}"))),
            _ => Ok(Vec::new()),
        }
    }

    fn page_content(&mut self) -> std::result::Result<String, CollectError> {
        self.tab()?
            .get_content()
            .map_err(|e| CollectError::Driver(e.to_string()))
    }

    fn reload(&mut self) -> std::result::Result<(), CollectError> {
        self.tab()?
            .reload(false, None)
            .map(|_| ())
            .map_err(|e| CollectError::PageLoad(e.to_string()))
    }

    fn close(&mut self) {
        self.tab.take();
        // Dropping the Browser tears down the child process
        self.browser.take();
    }
}

/// Authenticated, scroll-driven collection backend.
pub struct BrowserStrategy {
    factory: Arc<dyn DriverFactory>,
    config: CollectConfig,
    snapshot_path: PathBuf,
    keep_open: bool,
}

impl BrowserStrategy {
    pub fn new(config: CollectConfig, session: &SessionConfig) -> Self {
        Self {
            factory: Arc::new(ChromeFactory::new(config.clone())),
            config,
            snapshot_path: session.snapshot_path.clone(),
            keep_open: false,
        }
    }

    /// Swap the Chrome factory for a test double.
    pub fn with_factory(
        factory: Arc<dyn DriverFactory>,
        config: CollectConfig,
        snapshot_path: PathBuf,
    ) -> Self {
        Self {
            factory,
            config,
            snapshot_path,
            keep_open: false,
        }
    }

    /// Keep the browser open for manual inspection after the run; teardown
    /// then waits for the operator to confirm on stdin.
    pub fn keep_open(mut self, keep_open: bool) -> Self {
        self.keep_open = keep_open;
        self
    }

    async fn harvest(
        &self,
        driver: &mut dyn PageDriver,
        keyword: &str,
        gate: &mut CandidateGate,
    ) -> Result<()> {
        let urls = search_url_matrix(keyword);

        for (index, url) in urls.iter().enumerate() {
            gate.log(&format!(
                "[worker] opening search page {}/{}: {url}",
                index + 1,
                urls.len()
            ));

            if let Err(e) = driver.navigate(url) {
                gate.log(&format!("[worker] page load failed, skipping: {e}"));
                continue;
            }
            tokio::time::sleep(Duration::from_secs(self.config.initial_wait_secs)).await;

            match driver.wait_for_posts(Duration::from_secs(
                self.config.content_wait_timeout_secs,
            )) {
                Ok(()) => gate.log("[worker] post content loaded"),
                // Scan whatever did render
                Err(e) => gate.log(&format!("[worker] posts never settled: {e}")),
            }

            self.scroll_and_scan(driver, url, gate).await?;

            if index + 1 < urls.len() {
                let pause = jitter_secs(self.config.url_pause_secs);
                gate.log(&format!(
                    "[worker] pausing {pause:.1}s before the next search page"
                ));
                tokio::time::sleep(Duration::from_secs_f64(pause)).await;
            }
        }

        // Whole-page pass catches links outside post containers
        gate.log("[worker] final extraction from full page content");
        match driver.page_content() {
            Ok(content) => {
                for link in extract_invite_links(&content) {
                    gate.offer(&link, "page_content")?;
                }
            }
            Err(e) => gate.log(&format!("[worker] final extraction failed: {e}")),
        }

        Ok(())
    }

    async fn scroll_and_scan(
        &self,
        driver: &mut dyn PageDriver,
        url: &str,
        gate: &mut CandidateGate,
    ) -> Result<()> {
        for round in 0..self.config.scroll_rounds {
            gate.log(&format!(
                "[worker] scroll round {}/{}",
                round + 1,
                self.config.scroll_rounds
            ));

            let mut stalled = 0u32;
            for step in 0..self.config.scrolls_per_round {
                let before = driver.page_height()?;
                driver.scroll_to_bottom()?;

                let wait = jitter_secs(self.config.scroll_wait_secs);
                tokio::time::sleep(Duration::from_secs_f64(wait)).await;

                let after = driver.page_height()?;
                tracing::debug!(
                    round = round + 1,
                    step = step + 1,
                    before,
                    after,
                    "scroll step"
                );

                if (after - before).abs() < f64::EPSILON {
                    stalled += 1;
                    gate.log(&format!(
                        "[worker] page height unchanged ({stalled}/{})",
                        self.config.stall_limit
                    ));
                    if stalled >= self.config.stall_limit {
                        gate.log("[worker] content stalled, ending round early");
                        break;
                    }
                } else {
                    stalled = 0;
                }

                self.scan_rendered(driver, url, gate)?;
            }

            // Reload resets the feed's client-side render limit
            if round + 1 < self.config.scroll_rounds {
                gate.log("[worker] reloading page before next round");
                match driver.reload() {
                    Ok(()) => {
                        tokio::time::sleep(Duration::from_secs(self.config.initial_wait_secs))
                            .await
                    }
                    Err(e) => gate.log(&format!("[worker] reload failed: {e}")),
                }
            }
        }

        Ok(())
    }

    fn scan_rendered(
        &self,
        driver: &mut dyn PageDriver,
        url: &str,
        gate: &mut CandidateGate,
    ) -> Result<()> {
        let posts = driver.rendered_posts()?;
        let mut hits = 0usize;

        for html in &posts {
            if !html.contains("t.me") {
                continue;
            }
            for link in extract_invite_links(html) {
                hits += 1;
                gate.offer(&link, url)?;
            }
        }

        if hits > 0 {
            gate.log(&format!(
                "[worker] scanned {} posts, {} invite links so far this run",
                posts.len(),
                gate.seen_count()
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CollectStrategy for BrowserStrategy {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn run(&self, keyword: &str, gate: &mut CandidateGate) -> Result<()> {
        let snapshot = SessionSnapshot::load(&self.snapshot_path)?;
        gate.log(&format!(
            "[worker] restored session snapshot ({} cookies)",
            snapshot.cookies.len()
        ));

        let mut driver = self.factory.launch(&snapshot)?;
        gate.log("[worker] browser launched");

        let outcome = self.harvest(driver.as_mut(), keyword, gate).await;

        if self.keep_open && outcome.is_ok() {
            gate.log("[worker] keeping browser open; press Enter to close it");
            wait_for_operator();
        }

        // Release runs on success and failure alike
        driver.close();
        gate.log("[worker] browser closed");

        outcome
    }
}

/// Search-URL variants for one keyword: base query crossed with the
/// live/non-live time filter. The feed is non-deterministic and a single
/// query undercounts.
fn search_url_matrix(keyword: &str) -> Vec<String> {
    let query = encode_query(keyword);
    let bases = [format!("https://x.com/search?q={query}")];
    let filters = ["", "&f=live"];

    let mut urls = Vec::new();
    for base in &bases {
        for filter in &filters {
            let url = format!("{base}{filter}");
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }
    urls
}

fn wait_for_operator() {
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);
}
