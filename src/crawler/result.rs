//! The outcome record every engine produces.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde::ser::{SerializeStruct, Serializer};
use serde_json::{Map, Value};

use super::error::CrawlError;

/// Status code for URLs rejected by validation.
pub const INVALID_URL_STATUS: u16 = 400;

/// Error text for URLs rejected by validation.
pub const INVALID_URL_ERROR: &str = "Invalid URL";

/// Result of one crawl attempt.
///
/// Built once at the end of an attempt and never modified afterwards: fields
/// are private and the only mutators are the consuming `with_*` builders used
/// while the result is being assembled.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlResult {
    url: String,
    content: String,
    status_code: u16,
    headers: BTreeMap<String, String>,
    images: Vec<String>,
    metadata: Map<String, Value>,
    error: Option<String>,
    timestamp: f64,
}

impl CrawlResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(url: impl Into<String>, content: impl Into<String>, status_code: u16) -> Self {
        Self::new(url.into(), content.into(), status_code, None)
    }

    /// Creates a failure result with an explicit status code and message.
    #[must_use]
    pub fn failure(url: impl Into<String>, status_code: u16, error: impl Into<String>) -> Self {
        Self::new(url.into(), String::new(), status_code, Some(error.into()))
    }

    /// Creates the result returned for URLs that fail validation.
    #[must_use]
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::failure(url, INVALID_URL_STATUS, INVALID_URL_ERROR)
    }

    /// Converts a [`CrawlError`] into a failure result for `url`.
    ///
    /// The error kind is recorded under `metadata.error_kind`.
    #[must_use]
    pub fn from_error(url: impl Into<String>, error: &CrawlError) -> Self {
        Self::failure(url, error.status_code(), error.to_string())
            .with_metadata_entry("error_kind", error.kind().as_str())
    }

    fn new(url: String, content: String, status_code: u16, error: Option<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or_default();
        Self {
            url,
            content,
            status_code,
            headers: BTreeMap::new(),
            images: Vec::new(),
            metadata: Map::new(),
            error: error.filter(|message| !message.is_empty()),
            timestamp,
        }
    }

    /// Attaches response headers.
    #[must_use]
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Attaches discovered image URLs.
    #[must_use]
    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    /// Merges engine provenance into the metadata map.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata.extend(metadata);
        self
    }

    /// Sets a single metadata entry.
    #[must_use]
    pub fn with_metadata_entry(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// The requested URL, verbatim.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Extracted text or Markdown; empty on failure.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    #[must_use]
    pub fn images(&self) -> &[String] {
        &self.images
    }

    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Failure description, `None` on success.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Creation time in seconds since the Unix epoch.
    #[must_use]
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Label recorded by [`from_error`](Self::from_error), if any.
    #[must_use]
    pub fn error_kind(&self) -> Option<&str> {
        self.metadata.get("error_kind").and_then(Value::as_str)
    }

    /// 2xx status, non-empty content and no error.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code) && !self.content.is_empty() && self.error.is_none()
    }

    /// An error message is present or the status is 400 or above.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some() || self.status_code >= 400
    }
}

impl Serialize for CrawlResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("CrawlResult", 9)?;
        state.serialize_field("url", &self.url)?;
        state.serialize_field("content", &self.content)?;
        state.serialize_field("status_code", &self.status_code)?;
        state.serialize_field("headers", &self.headers)?;
        state.serialize_field("images", &self.images)?;
        state.serialize_field("metadata", &self.metadata)?;
        state.serialize_field("error", &self.error)?;
        state.serialize_field("timestamp", &self.timestamp)?;
        state.serialize_field("is_success", &self.is_success())?;
        state.end()
    }
}
