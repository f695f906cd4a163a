//! Agent-facing crawl tool.
//!
//! Turns a URL into a JSON record derived from [`CrawlResult`]. Nothing
//! escapes this boundary: engine panics and malformed input become
//! error-shaped records.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{error, warn};

use crate::crawler::{
    CrawlEngine, CrawlError, CrawlOptions, CrawlResult, EngineFactory, EngineKind,
    FAILURE_STATUS, INVALID_URL_STATUS,
};

/// Input accepted by the tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlerInput {
    /// The URL of the web page to crawl.
    pub url: String,
}

/// Record returned to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlToolOutput {
    pub url: String,
    pub success: bool,
    pub content: String,
    pub status_code: u16,
    pub error: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl CrawlToolOutput {
    fn failed(url: &str, status_code: u16, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            success: false,
            content: String::new(),
            status_code,
            error: Some(error.into()),
            images: Vec::new(),
            metadata: Map::new(),
        }
    }

    /// One-line human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.success {
            format!("Successfully crawled {} ({} chars)", self.url, self.content.len())
        } else {
            let reason = self.error.clone().unwrap_or_else(|| {
                format!("Failed to crawl {} with status code {}", self.url, self.status_code)
            });
            format!("Error crawling {}: {reason}", self.url)
        }
    }

    /// Serializes the record; never fails.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|error| {
            json!({
                "url": self.url,
                "success": false,
                "content": "",
                "status_code": FAILURE_STATUS,
                "error": format!("failed to serialize crawl output: {error}"),
            })
            .to_string()
        })
    }
}

impl From<&CrawlResult> for CrawlToolOutput {
    fn from(result: &CrawlResult) -> Self {
        Self {
            url: result.url().to_string(),
            success: result.is_success(),
            content: result.content().to_string(),
            status_code: result.status_code(),
            error: result.error().map(str::to_string),
            images: result.images().to_vec(),
            metadata: result.metadata().clone(),
        }
    }
}

impl From<CrawlResult> for CrawlToolOutput {
    fn from(result: CrawlResult) -> Self {
        Self::from(&result)
    }
}

/// Crawl tool bound to an engine factory.
#[derive(Debug, Clone, Copy)]
pub struct CrawlerTool<'f> {
    factory: &'f EngineFactory,
    engine: Option<EngineKind>,
}

impl CrawlerTool<'static> {
    /// Tool backed by the process-wide factory.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the environment is invalid.
    pub fn from_env() -> Result<Self, CrawlError> {
        Ok(Self::new(EngineFactory::global()?))
    }
}

impl<'f> CrawlerTool<'f> {
    /// Tool name exposed to agents.
    pub const NAME: &'static str = "web_crawler";

    /// Tool description exposed to agents.
    pub const DESCRIPTION: &'static str =
        "Crawls a given URL to extract its content. Uses the configured default crawler engine.";

    /// Uses the factory's default engine.
    #[must_use]
    pub fn new(factory: &'f EngineFactory) -> Self {
        Self {
            factory,
            engine: None,
        }
    }

    /// Pins the tool to one engine.
    #[must_use]
    pub fn with_engine(mut self, kind: EngineKind) -> Self {
        self.engine = Some(kind);
        self
    }

    /// Engine used for calls.
    #[must_use]
    pub fn engine_kind(&self) -> EngineKind {
        self.engine.unwrap_or_else(|| self.factory.default_kind())
    }

    /// JSON schema of [`CrawlerInput`].
    #[must_use]
    pub fn input_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL of the web page to crawl."
                }
            },
            "required": ["url"]
        })
    }

    /// Crawls `url`, blocking the calling thread.
    #[must_use]
    pub fn invoke(&self, url: &str) -> CrawlToolOutput {
        let engine = self.factory.get(self.engine);
        let options = CrawlOptions::default();
        match catch_unwind(AssertUnwindSafe(|| engine.crawl(url, &options))) {
            Ok(result) => CrawlToolOutput::from(&result),
            Err(payload) => panicked(url, engine.as_ref(), payload.as_ref()),
        }
    }

    /// Crawls `url` without blocking the async runtime.
    pub async fn ainvoke(&self, url: &str) -> CrawlToolOutput {
        let engine = self.factory.get(self.engine);
        let options = CrawlOptions::default();
        match AssertUnwindSafe(engine.acrawl(url, &options))
            .catch_unwind()
            .await
        {
            Ok(result) => CrawlToolOutput::from(&result),
            Err(payload) => panicked(url, engine.as_ref(), payload.as_ref()),
        }
    }

    /// Crawls `url` and returns the JSON record.
    #[must_use]
    pub fn run(&self, url: &str) -> String {
        self.invoke(url).to_json()
    }

    /// Async variant of [`run`](Self::run).
    pub async fn arun(&self, url: &str) -> String {
        self.ainvoke(url).await.to_json()
    }

    /// Accepts raw `{"url": ...}` input, as sent by an agent.
    pub async fn run_json(&self, raw: &str) -> String {
        match serde_json::from_str::<CrawlerInput>(raw) {
            Ok(input) => self.arun(&input.url).await,
            Err(error) => {
                warn!(error = %error, "rejecting malformed tool input");
                CrawlToolOutput::failed("", INVALID_URL_STATUS, format!("Invalid tool input: {error}"))
                    .to_json()
            }
        }
    }
}

fn panicked(url: &str, engine: &dyn CrawlEngine, payload: &(dyn Any + Send)) -> CrawlToolOutput {
    let message = payload
        .downcast_ref::<&str>()
        .map(|text| (*text).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    error!(url, engine = engine.name(), panic = %message, "crawl engine panicked");
    CrawlToolOutput::failed(
        url,
        FAILURE_STATUS,
        format!("An unexpected error occurred while crawling {url}: {message}"),
    )
}
