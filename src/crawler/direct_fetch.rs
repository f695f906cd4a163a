//! Direct HTTP fetch engine with a document-loader fallback.
//!
//! One persistent session carries the browser header profile and is reused
//! across calls for connection pooling. Per-domain header overrides and
//! per-call TLS/proxy options never touch that shared session: overrides go
//! on the individual request and non-default options get a one-off client.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::HeaderMap;
use tracing::{debug, info, instrument, warn};

use super::domain_headers::DomainHeaderTable;
use super::encoding::decode_body;
use super::error::CrawlError;
use super::factory::EngineKind;
use super::http_client::{DEFAULT_HTTP_TIMEOUT, SessionSpec, build_session};
use super::markdown::visible_text;
use super::result::CrawlResult;
use super::runtime::{block_on, offload};
use super::validation::{host_of, validate_url};
use super::{CrawlEngine, CrawlOptions};
use crate::user_agent::DEFAULT_USER_AGENT;

/// Settings for [`DirectFetchEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectFetchConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub domain_headers: DomainHeaderTable,
}

impl Default for DirectFetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_HTTP_TIMEOUT,
            domain_headers: DomainHeaderTable::builtin(),
        }
    }
}

/// Request settings a fallback loader must reuse.
#[derive(Debug, Clone, Copy)]
pub struct LoadContext<'a> {
    pub user_agent: &'a str,
    pub timeout: Duration,
    /// Domain overrides already resolved for this URL.
    pub extra_headers: &'a [(String, String)],
    pub options: &'a CrawlOptions,
}

/// Secondary path used when the primary fetch yields no text.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Loads `url` and returns its text content.
    async fn load(&self, url: &str, context: &LoadContext<'_>) -> Result<String, CrawlError>;
}

/// Re-fetches the page and returns its visible text.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebPageLoader;

#[async_trait]
impl DocumentLoader for WebPageLoader {
    async fn load(&self, url: &str, context: &LoadContext<'_>) -> Result<String, CrawlError> {
        let client = build_session(&SessionSpec {
            user_agent: context.user_agent,
            timeout: context.timeout,
            browser_profile: true,
            options: context.options,
        })?;

        let mut request = client.get(url);
        for (name, value) in context.extra_headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|error| CrawlError::from_reqwest(url, &error))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|error| CrawlError::from_reqwest(url, &error))?;

        let host = host_of(url);
        offload(move || {
            let (html, _) = decode_body(&bytes, host.as_deref());
            visible_text(&html)
        })
        .await
    }
}

/// Crawl engine issuing a plain GET with a realistic browser profile.
pub struct DirectFetchEngine {
    config: DirectFetchConfig,
    session: RwLock<Option<Client>>,
    loader: Arc<dyn DocumentLoader>,
}

impl DirectFetchEngine {
    /// Creates an engine using [`WebPageLoader`] as the fallback.
    #[must_use]
    pub fn new(config: DirectFetchConfig) -> Self {
        Self::with_loader(config, Arc::new(WebPageLoader))
    }

    /// Creates an engine with a custom fallback loader.
    #[must_use]
    pub fn with_loader(config: DirectFetchConfig, loader: Arc<dyn DocumentLoader>) -> Self {
        Self {
            config,
            session: RwLock::new(None),
            loader,
        }
    }

    #[must_use]
    pub fn config(&self) -> &DirectFetchConfig {
        &self.config
    }

    /// True while the shared session is open.
    #[must_use]
    pub fn has_session(&self) -> bool {
        self.session.read().is_ok_and(|slot| slot.is_some())
    }

    fn spec<'a>(&'a self, options: &'a CrawlOptions) -> SessionSpec<'a> {
        SessionSpec {
            user_agent: &self.config.user_agent,
            timeout: self.config.timeout,
            browser_profile: true,
            options,
        }
    }

    fn session_for(&self, options: &CrawlOptions) -> Result<Client, CrawlError> {
        if !options.is_default() {
            debug!(ignore_ssl = options.ignore_ssl, "building one-off session for call options");
            return build_session(&self.spec(options));
        }

        if let Some(client) = self.session.read().ok().and_then(|slot| slot.clone()) {
            return Ok(client);
        }

        let client = build_session(&self.spec(options))?;
        if let Ok(mut slot) = self.session.write() {
            if let Some(existing) = slot.as_ref() {
                return Ok(existing.clone());
            }
            debug!("initialized shared HTTP session");
            *slot = Some(client.clone());
        }
        Ok(client)
    }

    async fn fetch(&self, url: &str, options: &CrawlOptions) -> Result<CrawlResult, CrawlError> {
        let client = self.session_for(options)?;
        let overrides = self.config.domain_headers.headers_for(url);
        if !overrides.is_empty() {
            debug!(url, count = overrides.len(), "applying domain header overrides");
        }

        let mut request = client.get(url);
        for (name, value) in &overrides {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|error| CrawlError::from_reqwest(url, &error))?;

        let status = response.status().as_u16();
        let headers = flatten_headers(response.headers());
        let bytes = response
            .bytes()
            .await
            .map_err(|error| CrawlError::from_reqwest(url, &error))?;

        let host = host_of(url);
        let (mut content, encoding) =
            offload(move || decode_body(&bytes, host.as_deref())).await?;

        if content.trim().is_empty() {
            debug!(url, "primary fetch returned no text; using document loader");
            let context = LoadContext {
                user_agent: &self.config.user_agent,
                timeout: self.config.timeout,
                extra_headers: &overrides,
                options,
            };
            content = self.loader.load(url, &context).await?;
            if content.trim().is_empty() {
                return Err(CrawlError::content_extraction("No content extracted"));
            }
        }

        Ok(CrawlResult::success(url, content, status)
            .with_headers(headers)
            .with_metadata_entry("source", url)
            .with_metadata_entry("encoding", encoding))
    }

    async fn run(&self, url: &str, options: &CrawlOptions, method: Option<&str>) -> CrawlResult {
        if !validate_url(url) {
            warn!(url, "rejecting invalid URL");
            return CrawlResult::invalid_url(url);
        }

        match self.fetch(url, options).await {
            Ok(result) => {
                info!(url, status = result.status_code(), content_len = result.content().len(), "direct fetch succeeded");
                match method {
                    Some(method) => result.with_metadata_entry("method", method),
                    None => result,
                }
            }
            Err(error) => {
                warn!(url, error = %error, kind = %error.kind(), "direct fetch failed");
                CrawlResult::from_error(url, &error)
            }
        }
    }
}

/// Response headers as a flat map; repeated names are joined with `, `.
fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut flat: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        flat.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    flat
}

impl std::fmt::Debug for DirectFetchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectFetchEngine")
            .field("config", &self.config)
            .field("has_session", &self.has_session())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CrawlEngine for DirectFetchEngine {
    fn name(&self) -> &'static str {
        "direct_fetch"
    }

    fn kind(&self) -> EngineKind {
        EngineKind::DirectFetch
    }

    #[instrument(skip(self, options), fields(engine = "direct_fetch"))]
    async fn acrawl(&self, url: &str, options: &CrawlOptions) -> CrawlResult {
        self.run(url, options, Some("async")).await
    }

    fn crawl(&self, url: &str, options: &CrawlOptions) -> CrawlResult {
        block_on(self.run(url, options, None))
            .unwrap_or_else(|error| CrawlResult::from_error(url, &error))
    }

    fn cleanup(&self) {
        if let Ok(mut slot) = self.session.write()
            && slot.take().is_some()
        {
            debug!("closed shared HTTP session");
        }
    }
}

impl Drop for DirectFetchEngine {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_flatten_headers_joins_repeats() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));
        headers.insert("content-type", HeaderValue::from_static("text/html"));
        let flat = flatten_headers(&headers);
        assert_eq!(flat.get("set-cookie").map(String::as_str), Some("a=1, b=2"));
        assert_eq!(flat.get("content-type").map(String::as_str), Some("text/html"));
    }

    #[test]
    fn test_invalid_url_never_opens_session() {
        let engine = DirectFetchEngine::new(DirectFetchConfig::default());
        let result = engine.crawl("not a url", &CrawlOptions::default());
        assert_eq!(result.status_code(), 400);
        assert_eq!(result.error(), Some("Invalid URL"));
        assert!(result.content().is_empty());
        assert!(!engine.has_session());
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let engine = DirectFetchEngine::new(DirectFetchConfig::default());
        engine.cleanup();
        engine.cleanup();
        assert!(!engine.has_session());
    }

    #[test]
    fn test_non_default_options_do_not_replace_shared_session() {
        let engine = DirectFetchEngine::new(DirectFetchConfig::default());
        let insecure = CrawlOptions {
            ignore_ssl: true,
            proxy: None,
        };
        assert!(engine.session_for(&insecure).is_ok());
        assert!(!engine.has_session());
        assert!(engine.session_for(&CrawlOptions::default()).is_ok());
        assert!(engine.has_session());
    }
}
