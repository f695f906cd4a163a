//! Headless browser rendering for client-side generated pages.
//!
//! A browser is launched per call and closed on every exit path, including
//! navigation timeouts. Browsers are never shared between calls, so
//! throughput is bounded by launch cost; pooling contexts is not attempted.

pub mod chromium;

pub use chromium::{ChromiumLauncher, find_chromium};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::domain_headers::DomainHeaderTable;
use super::error::CrawlError;
use super::factory::EngineKind;
use super::markdown::html_to_markdown;
use super::result::CrawlResult;
use super::runtime::offload;
use super::validation::validate_url;
use super::{CrawlEngine, CrawlOptions};
use crate::user_agent::{ACCEPT_LANGUAGE, DEFAULT_USER_AGENT};

/// Default budget for launch, navigation and HTML capture.
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Default wait for the network to go idle after the load event.
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on shutting a browser down once a call is finished.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity and headers applied to a page before navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderProfile {
    pub user_agent: String,
    pub accept_language: String,
    /// Additional request headers, such as per-domain overrides.
    pub extra_headers: Vec<(String, String)>,
    /// How long to wait for network idle once the page has loaded.
    pub settle_timeout: Duration,
}

/// What a navigation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// Status of the main document response.
    pub status: u16,
    /// Serialized DOM after scripts ran.
    pub html: String,
    /// URL after redirects.
    pub final_url: String,
}

/// Starts browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launches a fresh browser for one crawl.
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, CrawlError>;

    /// Sessions launched and not yet closed.
    fn open_sessions(&self) -> usize;
}

/// One launched browser, used for a single page load.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigates to `url`, waits for the network to settle and captures the DOM.
    async fn render(&mut self, url: &str, profile: &RenderProfile) -> Result<RenderedPage, CrawlError>;

    /// Shuts the browser down and releases its resources.
    async fn close(self: Box<Self>);
}

/// Settings for [`BrowserRenderEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserRenderConfig {
    pub user_agent: String,
    pub navigation_timeout: Duration,
    pub settle_timeout: Duration,
    /// Bound on `close`; a session still closing then is dropped, which kills its process.
    pub close_timeout: Duration,
    /// Browser executable; discovered when unset.
    pub chromium_path: Option<PathBuf>,
    pub domain_headers: DomainHeaderTable,
}

impl Default for BrowserRenderConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            settle_timeout: DEFAULT_SETTLE_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            chromium_path: None,
            domain_headers: DomainHeaderTable::builtin(),
        }
    }
}

/// Crawl engine that renders pages in headless Chromium and returns Markdown.
pub struct BrowserRenderEngine {
    config: BrowserRenderConfig,
    launcher: Arc<dyn BrowserLauncher>,
}

impl BrowserRenderEngine {
    /// Creates an engine that launches Chromium.
    #[must_use]
    pub fn new(config: BrowserRenderConfig) -> Self {
        let launcher = Arc::new(ChromiumLauncher::new(
            config.chromium_path.clone(),
            config.navigation_timeout,
        ));
        Self::with_launcher(config, launcher)
    }

    /// Creates an engine with a custom launcher.
    #[must_use]
    pub fn with_launcher(config: BrowserRenderConfig, launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self { config, launcher }
    }

    #[must_use]
    pub fn config(&self) -> &BrowserRenderConfig {
        &self.config
    }

    /// Browsers currently running for in-flight calls.
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.launcher.open_sessions()
    }

    fn profile_for(&self, url: &str) -> RenderProfile {
        RenderProfile {
            user_agent: self.config.user_agent.clone(),
            accept_language: ACCEPT_LANGUAGE.to_string(),
            extra_headers: self.config.domain_headers.headers_for(url),
            settle_timeout: self.config.settle_timeout,
        }
    }

    /// Launches, renders and always closes, all within the navigation budget.
    async fn capture(&self, url: &str) -> Result<RenderedPage, CrawlError> {
        let budget = self.config.navigation_timeout;
        let deadline = tokio::time::Instant::now() + budget;
        let timed_out =
            || CrawlError::network(format!("navigation timed out after {}s: {url}", budget.as_secs()));

        let mut session = tokio::time::timeout_at(deadline, self.launcher.launch())
            .await
            .map_err(|_| timed_out())??;

        let profile = self.profile_for(url);
        let outcome = tokio::time::timeout_at(deadline, session.render(url, &profile)).await;
        if tokio::time::timeout(self.config.close_timeout, session.close())
            .await
            .is_err()
        {
            warn!(url, "browser did not close in time; dropped session");
        }
        debug!(url, open_sessions = self.open_sessions(), "browser session closed");

        outcome.map_err(|_| timed_out())?
    }

    async fn render(&self, url: &str) -> Result<CrawlResult, CrawlError> {
        let started = Instant::now();
        let page = self.capture(url).await?;

        if page.status >= 400 {
            return Err(CrawlError::network_status(
                format!("HTTP {} for url: {url}", page.status),
                page.status,
            ));
        }

        let RenderedPage {
            status,
            html,
            final_url,
        } = page;
        let base_url = final_url.clone();
        let extracted = offload(move || html_to_markdown(&html, &base_url)).await??;
        if extracted.markdown.trim().is_empty() {
            return Err(CrawlError::content_extraction(
                "No content extracted from rendered page",
            ));
        }

        let render_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(CrawlResult::success(url, extracted.markdown, status)
            .with_images(extracted.images)
            .with_metadata_entry("source", self.name())
            .with_metadata_entry("final_url", final_url)
            .with_metadata_entry("render_ms", render_ms)
            .with_metadata_entry("title", extracted.title))
    }
}

impl std::fmt::Debug for BrowserRenderEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserRenderEngine")
            .field("config", &self.config)
            .field("open_sessions", &self.open_sessions())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CrawlEngine for BrowserRenderEngine {
    fn name(&self) -> &'static str {
        "browser_render"
    }

    fn kind(&self) -> EngineKind {
        EngineKind::BrowserRender
    }

    #[instrument(skip(self, _options), fields(engine = "browser_render"))]
    async fn acrawl(&self, url: &str, _options: &CrawlOptions) -> CrawlResult {
        if !validate_url(url) {
            warn!(url, "rejecting invalid URL");
            return CrawlResult::invalid_url(url);
        }

        match self.render(url).await {
            Ok(result) => {
                info!(url, status = result.status_code(), content_len = result.content().len(), "browser render succeeded");
                result
            }
            Err(error) => {
                warn!(url, error = %error, kind = %error.kind(), "browser render failed");
                CrawlResult::from_error(url, &error).with_metadata_entry("source", self.name())
            }
        }
    }

    fn cleanup(&self) {
        // Browsers are scoped to a single call; nothing outlives it.
        debug!(open_sessions = self.open_sessions(), "browser render cleanup");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_carries_domain_overrides() {
        let engine = BrowserRenderEngine::new(BrowserRenderConfig::default());
        let profile = engine.profile_for("https://blog.csdn.net/x/article/details/1");
        assert_eq!(profile.accept_language, ACCEPT_LANGUAGE);
        assert!(profile.extra_headers.iter().any(|(name, _)| name == "Referer"));
        assert!(engine.profile_for("https://example.com/").extra_headers.is_empty());
    }

    #[test]
    fn test_default_budgets() {
        let config = BrowserRenderConfig::default();
        assert_eq!(config.navigation_timeout, DEFAULT_NAVIGATION_TIMEOUT);
        assert!(config.settle_timeout < config.navigation_timeout);
        assert_eq!(config.close_timeout, DEFAULT_CLOSE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_invalid_url_never_launches() {
        let engine = BrowserRenderEngine::new(BrowserRenderConfig::default());
        let result = engine.acrawl("ftp://example.com/file", &CrawlOptions::default()).await;
        assert_eq!(result.status_code(), 400);
        assert_eq!(result.error(), Some("Invalid URL"));
        assert_eq!(engine.open_sessions(), 0);
    }
}
