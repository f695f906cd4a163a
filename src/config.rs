//! Crawler settings assembled from environment variables.
//!
//! Lookups go through an injectable function so callers (and tests) can
//! supply values without touching the process environment.

use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use crate::crawler::browser::{DEFAULT_NAVIGATION_TIMEOUT, DEFAULT_SETTLE_TIMEOUT};
use crate::crawler::{
    ApiExtractConfig, BrowserRenderConfig, CrawlError, DEFAULT_HTTP_TIMEOUT,
    DirectFetchConfig, DomainHeaderTable, EngineKind, ExtractDepth,
};
use crate::user_agent::resolve_user_agent;

/// Default engine identifier.
pub const ENV_DEFAULT_ENGINE: &str = "CRAWLER_DEFAULT_TYPE";
/// Tavily API key.
pub const ENV_API_KEY: &str = "TAVILY_API_KEY";
/// Tavily API base URL.
pub const ENV_API_URL: &str = "TAVILY_API_URL";
/// User agent override shared by every engine.
pub const ENV_USER_AGENT: &str = "USER_AGENT";
/// Browser executable for the render engine.
pub const ENV_CHROMIUM_PATH: &str = "CHROMIUM_PATH";
/// HTTP/API request timeout in seconds.
pub const ENV_HTTP_TIMEOUT: &str = "CRAWLER_HTTP_TIMEOUT_SECS";
/// Browser navigation timeout in seconds.
pub const ENV_BROWSER_TIMEOUT: &str = "CRAWLER_BROWSER_TIMEOUT_SECS";

/// Accepted range for timeout settings, in seconds.
pub const TIMEOUT_RANGE_SECS: std::ops::RangeInclusive<u64> = 1..=3600;

/// Settings for the factory and every engine it builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlerSettings {
    pub default_engine: EngineKind,
    pub api: ApiExtractConfig,
    pub direct: DirectFetchConfig,
    pub browser: BrowserRenderConfig,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            default_engine: EngineKind::ApiExtract,
            api: ApiExtractConfig::default(),
            direct: DirectFetchConfig::default(),
            browser: BrowserRenderConfig::default(),
        }
    }
}

impl CrawlerSettings {
    /// Reads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown engine identifier or an
    /// out-of-range timeout. A missing API key is not an error here.
    pub fn from_env() -> Result<Self, CrawlError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`; blank values count as unset.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CrawlError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::default().with_env_overrides(lookup)
    }

    /// Applies variables found through `lookup` on top of `self`.
    ///
    /// Unset and blank variables leave the current value alone.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, CrawlError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(engine) = get(ENV_DEFAULT_ENGINE) {
            self.default_engine = engine.parse()?;
        }
        if let Some(user_agent) = get(ENV_USER_AGENT) {
            self = self.with_user_agent(&user_agent);
        }
        if let Some(secs) = get(ENV_HTTP_TIMEOUT) {
            self = self.with_http_timeout(parse_timeout_secs(ENV_HTTP_TIMEOUT, &secs)?);
        }
        if let Some(secs) = get(ENV_BROWSER_TIMEOUT) {
            self = self.with_browser_timeout(parse_timeout_secs(ENV_BROWSER_TIMEOUT, &secs)?);
        }
        if let Some(api_key) = get(ENV_API_KEY) {
            self.api.api_key = Some(api_key);
        }
        if let Some(base_url) = get(ENV_API_URL) {
            self.api.base_url = base_url;
        }
        if let Some(path) = get(ENV_CHROMIUM_PATH) {
            self.browser.chromium_path = Some(PathBuf::from(path));
        }

        debug!(
            default_engine = %self.default_engine,
            api_key_present = self.api.api_key.is_some(),
            http_timeout_secs = self.direct.timeout.as_secs(),
            browser_timeout_secs = self.browser.navigation_timeout.as_secs(),
            "crawler settings loaded"
        );
        Ok(self)
    }

    /// Uses `user_agent` for every engine; blank restores the default.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        let resolved = resolve_user_agent(Some(user_agent));
        self.api.user_agent.clone_from(&resolved);
        self.direct.user_agent.clone_from(&resolved);
        self.browser.user_agent = resolved;
        self
    }

    /// Timeout for HTTP fetches and API calls.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.api.timeout = timeout;
        self.direct.timeout = timeout;
        self
    }

    /// Overall budget for a browser render.
    #[must_use]
    pub fn with_browser_timeout(mut self, timeout: Duration) -> Self {
        self.browser.navigation_timeout = timeout;
        self.browser.settle_timeout = DEFAULT_SETTLE_TIMEOUT.min(timeout);
        self
    }

    #[must_use]
    pub fn with_default_engine(mut self, kind: EngineKind) -> Self {
        self.default_engine = kind;
        self
    }

    /// Extraction effort requested from the API.
    #[must_use]
    pub fn with_extract_depth(mut self, depth: ExtractDepth) -> Self {
        self.api.extract_depth = depth;
        self
    }

    /// Whether the API should return image URLs.
    #[must_use]
    pub fn with_include_images(mut self, include_images: bool) -> Self {
        self.api.include_images = include_images;
        self
    }

    /// Replaces the domain header table used by the fetch and render engines.
    #[must_use]
    pub fn with_domain_headers(mut self, table: DomainHeaderTable) -> Self {
        self.direct.domain_headers = table.clone();
        self.browser.domain_headers = table;
        self
    }

    /// Effective timeouts: (HTTP, browser).
    #[must_use]
    pub fn timeouts(&self) -> (Duration, Duration) {
        (self.direct.timeout, self.browser.navigation_timeout)
    }
}

/// Parses a timeout in whole seconds within [`TIMEOUT_RANGE_SECS`].
///
/// # Errors
///
/// Returns a configuration error naming `key` when the value is not an
/// integer or is out of range.
pub fn parse_timeout_secs(key: &str, value: &str) -> Result<Duration, CrawlError> {
    let secs: u64 = value.trim().parse().map_err(|_| {
        CrawlError::configuration(format!("{key} must be a whole number of seconds, got '{value}'"))
    })?;
    if !TIMEOUT_RANGE_SECS.contains(&secs) {
        return Err(CrawlError::configuration(format!(
            "{key} must be between {} and {} seconds, got {secs}",
            TIMEOUT_RANGE_SECS.start(),
            TIMEOUT_RANGE_SECS.end()
        )));
    }
    Ok(Duration::from_secs(secs))
}

/// Default timeouts: (HTTP, browser).
#[must_use]
pub fn default_timeouts() -> (Duration, Duration) {
    (DEFAULT_HTTP_TIMEOUT, DEFAULT_NAVIGATION_TIMEOUT)
}
