//! Ordered fallback across engines.
//!
//! Lives above the factory: engines themselves never retry with another
//! engine. A chain moves on only when an attempt failed in a way another
//! engine might fix (the page was unreachable or yielded nothing usable).

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use super::error::ErrorKind;
use super::factory::{EngineFactory, EngineKind};
use super::result::{CrawlResult, INVALID_URL_ERROR};
use super::{CrawlEngine, CrawlOptions};

/// Tries engines in order until one succeeds.
#[derive(Clone)]
pub struct EscalationChain {
    engines: Vec<Arc<dyn CrawlEngine>>,
}

impl EscalationChain {
    /// Builds a chain of engines taken from `factory`, in `kinds` order.
    ///
    /// Repeated kinds are tried once.
    #[must_use]
    pub fn new(factory: &EngineFactory, kinds: &[EngineKind]) -> Self {
        let mut seen = Vec::with_capacity(kinds.len());
        let engines = kinds
            .iter()
            .filter(|kind| {
                if seen.contains(*kind) {
                    false
                } else {
                    seen.push(**kind);
                    true
                }
            })
            .map(|kind| factory.get(Some(*kind)))
            .collect();
        Self { engines }
    }

    /// Builds a chain from already constructed engines.
    #[must_use]
    pub fn from_engines(engines: Vec<Arc<dyn CrawlEngine>>) -> Self {
        Self { engines }
    }

    /// Kinds in the order they will be tried.
    #[must_use]
    pub fn kinds(&self) -> Vec<EngineKind> {
        self.engines.iter().map(|engine| engine.kind()).collect()
    }

    /// Whether a failed result justifies trying the next engine.
    #[must_use]
    pub fn should_escalate(result: &CrawlResult) -> bool {
        // A page answering 400 is a network failure; only validation
        // rejections carry no error kind.
        let rejected_url =
            result.error() == Some(INVALID_URL_ERROR) && result.error_kind().is_none();
        if result.is_success() || rejected_url {
            return false;
        }
        matches!(
            result.error_kind(),
            Some(kind) if kind == ErrorKind::Network.as_str()
                || kind == ErrorKind::ContentExtraction.as_str()
        )
    }

    /// Crawls `url` with each engine in turn.
    ///
    /// Returns the first successful result, or the last attempt's result.
    /// `metadata.attempted_engines` lists every engine tried.
    pub async fn acrawl(&self, url: &str, options: &CrawlOptions) -> CrawlResult {
        let mut attempted: Vec<Value> = Vec::with_capacity(self.engines.len());
        let mut last: Option<CrawlResult> = None;

        for engine in &self.engines {
            attempted.push(Value::from(engine.name()));
            let result = engine.acrawl(url, options).await;
            if !Self::should_escalate(&result) {
                if result.is_success() && attempted.len() > 1 {
                    info!(url, engine = engine.name(), attempts = attempted.len(), "escalation succeeded");
                }
                return result.with_metadata_entry("attempted_engines", attempted);
            }
            debug!(url, engine = engine.name(), error = result.error().unwrap_or_default(), "escalating to next engine");
            last = Some(result);
        }

        last.unwrap_or_else(|| CrawlResult::failure(url, super::FAILURE_STATUS, "no crawl engines configured"))
            .with_metadata_entry("attempted_engines", attempted)
    }

    /// Blocking variant of [`acrawl`](Self::acrawl).
    pub fn crawl(&self, url: &str, options: &CrawlOptions) -> CrawlResult {
        super::runtime::block_on(self.acrawl(url, options))
            .unwrap_or_else(|error| CrawlResult::from_error(url, &error))
    }
}

impl std::fmt::Debug for EscalationChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscalationChain")
            .field("engines", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::CrawlError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        kind: EngineKind,
        outcome: fn(&str) -> CrawlResult,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(kind: EngineKind, outcome: fn(&str) -> CrawlResult) -> Arc<Self> {
            Arc::new(Self {
                kind,
                outcome,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CrawlEngine for Scripted {
        fn name(&self) -> &'static str {
            self.kind.as_str()
        }

        fn kind(&self) -> EngineKind {
            self.kind
        }

        async fn acrawl(&self, url: &str, _options: &CrawlOptions) -> CrawlResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)(url)
        }

        fn cleanup(&self) {}
    }

    fn empty_page(url: &str) -> CrawlResult {
        CrawlResult::from_error(url, &CrawlError::content_extraction("No content extracted"))
    }

    fn rendered(url: &str) -> CrawlResult {
        CrawlResult::success(url, "# rendered", 200)
    }

    fn missing_key(url: &str) -> CrawlResult {
        CrawlResult::from_error(url, &CrawlError::configuration("TAVILY_API_KEY environment variable is required"))
    }

    #[tokio::test]
    async fn test_escalates_on_content_extraction_failure() {
        let direct = Scripted::new(EngineKind::DirectFetch, empty_page);
        let browser = Scripted::new(EngineKind::BrowserRender, rendered);
        let chain = EscalationChain::from_engines(vec![direct.clone(), browser.clone()]);

        let result = chain.acrawl("https://example.com", &CrawlOptions::default()).await;
        assert!(result.is_success());
        assert_eq!(
            result.metadata()["attempted_engines"],
            serde_json::json!(["direct_fetch", "browser_render"])
        );
        assert_eq!(direct.calls.load(Ordering::SeqCst), 1);
        assert_eq!(browser.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stops_on_configuration_error() {
        let api = Scripted::new(EngineKind::ApiExtract, missing_key);
        let browser = Scripted::new(EngineKind::BrowserRender, rendered);
        let chain = EscalationChain::from_engines(vec![api.clone(), browser.clone()]);

        let result = chain.acrawl("https://example.com", &CrawlOptions::default()).await;
        assert_eq!(result.error_kind(), Some("configuration"));
        assert_eq!(browser.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_returns_last_failure_when_all_fail() {
        let direct = Scripted::new(EngineKind::DirectFetch, empty_page);
        let browser = Scripted::new(EngineKind::BrowserRender, empty_page);
        let chain = EscalationChain::from_engines(vec![direct, browser]);

        let result = chain.acrawl("https://example.com", &CrawlOptions::default()).await;
        assert!(result.is_error());
        assert_eq!(result.metadata()["attempted_engines"].as_array().map(Vec::len), Some(2));
    }

    fn bad_request_page(url: &str) -> CrawlResult {
        CrawlResult::from_error(url, &CrawlError::network_status(format!("HTTP 400 for url: {url}"), 400))
    }

    #[test]
    fn test_invalid_url_never_escalates() {
        assert!(!EscalationChain::should_escalate(&CrawlResult::invalid_url("nope")));
    }

    #[tokio::test]
    async fn test_escalates_when_page_answers_400() {
        let direct = Scripted::new(EngineKind::DirectFetch, bad_request_page);
        let browser = Scripted::new(EngineKind::BrowserRender, rendered);
        let chain = EscalationChain::from_engines(vec![direct.clone(), browser.clone()]);

        let result = chain.acrawl("https://example.com/form", &CrawlOptions::default()).await;
        assert!(result.is_success());
        assert_eq!(
            result.metadata()["attempted_engines"],
            serde_json::json!(["direct_fetch", "browser_render"])
        );
        assert_eq!(browser.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_new_deduplicates_kinds() {
        let factory = EngineFactory::new(crate::config::CrawlerSettings::default());
        let chain = EscalationChain::new(
            &factory,
            &[EngineKind::DirectFetch, EngineKind::DirectFetch, EngineKind::BrowserRender],
        );
        assert_eq!(chain.kinds(), vec![EngineKind::DirectFetch, EngineKind::BrowserRender]);
    }
}
