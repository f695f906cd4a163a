//! Content acquisition engines behind one shared contract.
//!
//! Every engine turns a URL into a [`CrawlResult`]. Failures never escape as
//! errors from [`CrawlEngine::crawl`] or [`CrawlEngine::acrawl`]; they are
//! classified by [`CrawlError`] and folded into the result.
//!
//! # Architecture
//!
//! - [`CrawlEngine`] - Async trait every engine implements
//! - [`ApiExtractEngine`] - Managed extraction API (Tavily)
//! - [`DirectFetchEngine`] - HTTP GET with a browser header profile and a loader fallback
//! - [`BrowserRenderEngine`] - Headless Chromium render converted to Markdown
//! - [`EngineFactory`] - Lazily built, cached engine per [`EngineKind`]
//! - [`EscalationChain`] - Optional ordered retry across engines
//!
//! # Example
//!
//! ```no_run
//! use webcrawl_core::config::CrawlerSettings;
//! use webcrawl_core::crawler::{CrawlOptions, EngineFactory, EngineKind};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = EngineFactory::new(CrawlerSettings::from_env()?);
//! let engine = factory.get(Some(EngineKind::DirectFetch));
//! let result = engine.acrawl("https://example.com", &CrawlOptions::default()).await;
//! println!("{} -> {}", result.url(), result.status_code());
//! # Ok(())
//! # }
//! ```

mod api_extract;
pub mod browser;
mod direct_fetch;
mod domain_headers;
mod encoding;
mod error;
mod escalation;
mod factory;
mod http_client;
pub mod markdown;
mod result;
mod runtime;
mod validation;

pub use api_extract::{
    ApiExtractConfig, ApiExtractEngine, ClientBuilderFn, DEFAULT_API_URL, ExtractClient,
    ExtractDepth, ExtractFormat, ExtractResponse, ExtractedPage, FailedExtraction, TavilyClient,
};
pub use browser::{
    BrowserLauncher, BrowserRenderConfig, BrowserRenderEngine, BrowserSession, RenderProfile,
    RenderedPage,
};
pub use direct_fetch::{
    DirectFetchConfig, DirectFetchEngine, DocumentLoader, LoadContext, WebPageLoader,
};
pub use domain_headers::{DomainHeaderRule, DomainHeaderTable};
pub use encoding::decode_body;
pub use error::{CrawlError, ErrorKind, FAILURE_STATUS};
pub use escalation::EscalationChain;
pub use factory::{EngineFactory, EngineKind};
pub use http_client::DEFAULT_HTTP_TIMEOUT;
pub use result::{CrawlResult, INVALID_URL_ERROR, INVALID_URL_STATUS};
pub use validation::validate_url;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Proxy mapping applied to direct fetches, keyed by request scheme.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Proxy for `http://` requests.
    pub http: Option<String>,
    /// Proxy for `https://` requests.
    pub https: Option<String>,
}

impl ProxyConfig {
    /// Uses the same proxy for both schemes.
    #[must_use]
    pub fn all(proxy: impl Into<String>) -> Self {
        let proxy = proxy.into();
        Self {
            http: Some(proxy.clone()),
            https: Some(proxy),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.http.is_none() && self.https.is_none()
    }
}

/// Per-call transport options.
///
/// Only the direct fetch engine honors them; other engines ignore them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlOptions {
    /// Skip TLS certificate verification.
    pub ignore_ssl: bool,
    /// Route requests through a proxy.
    pub proxy: Option<ProxyConfig>,
}

impl CrawlOptions {
    /// True when the shared session can serve the request unchanged.
    #[must_use]
    pub fn is_default(&self) -> bool {
        !self.ignore_ssl && self.proxy.as_ref().is_none_or(ProxyConfig::is_empty)
    }
}

/// Trait that all crawl engines implement.
///
/// # Object Safety
///
/// This trait uses `async_trait` to support dynamic dispatch via
/// `Arc<dyn CrawlEngine>`, which the factory cache relies on.
///
/// # Concurrency
///
/// Calls for different URLs on one instance may run concurrently; any state
/// shared between calls must be safe for that.
#[async_trait]
pub trait CrawlEngine: Send + Sync {
    /// Provenance name written into result metadata.
    fn name(&self) -> &'static str;

    /// Identifier this engine is registered under.
    fn kind(&self) -> EngineKind;

    /// Crawls `url` without blocking the caller's executor.
    async fn acrawl(&self, url: &str, options: &CrawlOptions) -> CrawlResult;

    /// Crawls `url`, blocking the calling thread until the result is ready.
    ///
    /// Safe to call from inside an async runtime; the work then runs on a
    /// separate worker thread.
    fn crawl(&self, url: &str, options: &CrawlOptions) -> CrawlResult {
        runtime::block_on(self.acrawl(url, options))
            .unwrap_or_else(|error| CrawlResult::from_error(url, &error))
    }

    /// Releases engine-owned resources. Idempotent.
    fn cleanup(&self);
}
