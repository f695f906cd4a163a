//! Engine backed by the Tavily extraction API.
//!
//! The HTTP client is built lazily on the first crawl and cached for the
//! engine's lifetime. Only successful builds are cached: a missing API key or
//! a failed client setup is reported on that crawl and retried on the next.

use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::error::CrawlError;
use super::factory::EngineKind;
use super::http_client::{DEFAULT_HTTP_TIMEOUT, SessionSpec, build_session};
use super::result::CrawlResult;
use super::validation::validate_url;
use super::{CrawlEngine, CrawlOptions};
use crate::user_agent::DEFAULT_USER_AGENT;

/// Default Tavily API base URL.
pub const DEFAULT_API_URL: &str = "https://api.tavily.com";

const MAX_ERROR_DETAIL_CHARS: usize = 200;

/// How much effort the API spends extracting content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractDepth {
    Basic,
    #[default]
    Advanced,
}

impl ExtractDepth {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Advanced => "advanced",
        }
    }
}

impl FromStr for ExtractDepth {
    type Err = CrawlError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "advanced" => Ok(Self::Advanced),
            other => Err(CrawlError::configuration(format!(
                "unknown extract depth '{other}' (expected basic or advanced)"
            ))),
        }
    }
}

/// Output format requested from the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractFormat {
    #[default]
    Markdown,
    Text,
}

/// Settings for [`ApiExtractEngine`].
#[derive(Clone, PartialEq, Eq)]
pub struct ApiExtractConfig {
    /// API key; required on first use.
    pub api_key: Option<String>,
    pub base_url: String,
    pub extract_depth: ExtractDepth,
    pub format: ExtractFormat,
    pub include_images: bool,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for ApiExtractConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_API_URL.to_string(),
            extract_depth: ExtractDepth::default(),
            format: ExtractFormat::default(),
            include_images: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for ApiExtractConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiExtractConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("extract_depth", &self.extract_depth)
            .field("format", &self.format)
            .field("include_images", &self.include_images)
            .field("user_agent", &self.user_agent)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// One successfully extracted page.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExtractedPage {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub raw_content: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// One URL the API could not extract.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FailedExtraction {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of an extraction response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExtractResponse {
    #[serde(default)]
    pub results: Vec<ExtractedPage>,
    #[serde(default)]
    pub failed_results: Vec<FailedExtraction>,
    #[serde(default)]
    pub response_time: Option<f64>,
}

/// Content pulled out of an [`ExtractResponse`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedExtract {
    pub content: String,
    pub images: Vec<String>,
    pub response_time: Option<f64>,
}

/// Parses the first result of a single-URL batch response.
///
/// # Errors
///
/// Returns a content-extraction error when there is no result or its
/// content is blank.
pub(crate) fn parse_response(response: ExtractResponse) -> Result<ParsedExtract, CrawlError> {
    let Some(first) = response.results.into_iter().next() else {
        let message = response.failed_results.first().map_or_else(
            || "No content extracted".to_string(),
            |failed| {
                format!(
                    "Extraction failed: {}",
                    failed.error.as_deref().unwrap_or("Unknown error")
                )
            },
        );
        return Err(CrawlError::content_extraction(message));
    };

    let content = first.raw_content.as_deref().unwrap_or_default().trim();
    if content.is_empty() {
        return Err(CrawlError::content_extraction("Empty content extracted"));
    }

    Ok(ParsedExtract {
        content: content.to_string(),
        images: first.images,
        response_time: response.response_time,
    })
}

/// Client for a batch extraction endpoint.
#[async_trait]
pub trait ExtractClient: Send + Sync {
    /// Extracts content for `urls` in one request.
    async fn extract(&self, urls: &[String]) -> Result<ExtractResponse, CrawlError>;
}

#[derive(Serialize)]
struct ExtractRequest<'a> {
    urls: &'a [String],
    extract_depth: ExtractDepth,
    include_images: bool,
    format: ExtractFormat,
}

/// HTTP client for the Tavily `/extract` endpoint.
#[derive(Clone)]
pub struct TavilyClient {
    http: Client,
    endpoint: String,
    api_key: String,
    extract_depth: ExtractDepth,
    format: ExtractFormat,
    include_images: bool,
}

impl TavilyClient {
    /// Creates a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no API key is set, or a network
    /// error when the HTTP client cannot be built.
    pub fn new(config: &ApiExtractConfig) -> Result<Self, CrawlError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                CrawlError::configuration("TAVILY_API_KEY environment variable is required")
            })?;

        let options = CrawlOptions::default();
        let http = build_session(&SessionSpec {
            user_agent: &config.user_agent,
            timeout: config.timeout,
            browser_profile: false,
            options: &options,
        })
        .map_err(|error| {
            CrawlError::network(format!("Failed to initialize Tavily client: {error}"))
        })?;

        Ok(Self {
            http,
            endpoint: format!("{}/extract", config.base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            extract_depth: config.extract_depth,
            format: config.format,
            include_images: config.include_images,
        })
    }
}

impl std::fmt::Debug for TavilyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TavilyClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("extract_depth", &self.extract_depth)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ExtractClient for TavilyClient {
    async fn extract(&self, urls: &[String]) -> Result<ExtractResponse, CrawlError> {
        let body = ExtractRequest {
            urls,
            extract_depth: self.extract_depth,
            include_images: self.include_images,
            format: self.format,
        };
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|error| CrawlError::from_reqwest(&self.endpoint, &error))?;

        let status = response.status();
        if !status.is_success() {
            let detail = error_detail(&response.text().await.unwrap_or_default());
            let code = status.as_u16();
            return Err(match code {
                401 | 403 => CrawlError::authentication(format!("HTTP {code}: {detail}")),
                429 => CrawlError::rate_limit(format!("HTTP {code}: {detail}")),
                // The upstream status describes the API, not the crawled page.
                _ => CrawlError::network(format!("Tavily extraction error: HTTP {code}: {detail}")),
            });
        }

        response.json::<ExtractResponse>().await.map_err(|error| {
            CrawlError::content_extraction(format!("Invalid response format: {error}"))
        })
    }
}

/// Pulls a readable message out of an API error body.
fn error_detail(body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let message = parsed.as_ref().and_then(|value| {
        let detail = value.get("detail")?;
        detail
            .get("error")
            .and_then(Value::as_str)
            .or_else(|| detail.as_str())
    });
    let message = message.unwrap_or(body).trim();
    if message.is_empty() {
        return "no detail".to_string();
    }
    message.chars().take(MAX_ERROR_DETAIL_CHARS).collect()
}

/// Builds an extraction client from config.
pub type ClientBuilderFn =
    Arc<dyn Fn(&ApiExtractConfig) -> Result<Arc<dyn ExtractClient>, CrawlError> + Send + Sync>;

fn tavily_builder() -> ClientBuilderFn {
    Arc::new(|config: &ApiExtractConfig| {
        Ok(Arc::new(TavilyClient::new(config)?) as Arc<dyn ExtractClient>)
    })
}

/// Crawl engine that delegates extraction to the Tavily API.
pub struct ApiExtractEngine {
    config: ApiExtractConfig,
    builder: ClientBuilderFn,
    client: RwLock<Option<Arc<dyn ExtractClient>>>,
    init_lock: tokio::sync::Mutex<()>,
}

impl ApiExtractEngine {
    /// Creates an engine that talks to Tavily.
    #[must_use]
    pub fn new(config: ApiExtractConfig) -> Self {
        Self::with_client_builder(config, tavily_builder())
    }

    /// Creates an engine whose client comes from `builder`.
    #[must_use]
    pub fn with_client_builder(config: ApiExtractConfig, builder: ClientBuilderFn) -> Self {
        Self {
            config,
            builder,
            client: RwLock::new(None),
            init_lock: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ApiExtractConfig {
        &self.config
    }

    /// True once a client has been built and not yet released.
    #[must_use]
    pub fn has_client(&self) -> bool {
        self.cached_client().is_some()
    }

    fn cached_client(&self) -> Option<Arc<dyn ExtractClient>> {
        self.client.read().ok().and_then(|slot| slot.clone())
    }

    async fn client(&self) -> Result<Arc<dyn ExtractClient>, CrawlError> {
        if let Some(client) = self.cached_client() {
            return Ok(client);
        }

        let _guard = self.init_lock.lock().await;
        if let Some(client) = self.cached_client() {
            return Ok(client);
        }

        debug!(base_url = %self.config.base_url, "initializing extraction client");
        let client = (self.builder)(&self.config)?;
        if let Ok(mut slot) = self.client.write() {
            *slot = Some(Arc::clone(&client));
        }
        Ok(client)
    }

    async fn extract(&self, url: &str) -> Result<ParsedExtract, CrawlError> {
        let client = self.client().await?;
        let response = client.extract(&[url.to_string()]).await?;
        parse_response(response)
    }
}

impl std::fmt::Debug for ApiExtractEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiExtractEngine")
            .field("config", &self.config)
            .field("has_client", &self.has_client())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CrawlEngine for ApiExtractEngine {
    fn name(&self) -> &'static str {
        "api_extract"
    }

    fn kind(&self) -> EngineKind {
        EngineKind::ApiExtract
    }

    #[instrument(skip(self, _options), fields(engine = "api_extract"))]
    async fn acrawl(&self, url: &str, _options: &CrawlOptions) -> CrawlResult {
        if !validate_url(url) {
            warn!(url, "rejecting invalid URL");
            return CrawlResult::invalid_url(url);
        }

        match self.extract(url).await {
            Ok(parsed) => {
                info!(url, content_len = parsed.content.len(), "API extraction succeeded");
                CrawlResult::success(url, parsed.content, 200)
                    .with_images(parsed.images)
                    .with_metadata_entry("source", self.name())
                    .with_metadata_entry("response_time", parsed.response_time)
            }
            Err(error) => {
                warn!(url, error = %error, kind = %error.kind(), "API extraction failed");
                CrawlResult::from_error(url, &error).with_metadata_entry("source", self.name())
            }
        }
    }

    fn cleanup(&self) {
        if let Ok(mut slot) = self.client.write()
            && slot.take().is_some()
        {
            debug!("released extraction client");
        }
    }
}
