//! Error types shared by every crawl engine.
//!
//! The set of kinds is closed. Engines never let one of these escape
//! `crawl`/`acrawl`; they are converted into a [`CrawlResult`](super::CrawlResult)
//! carrying the message and an `error_kind` metadata label.

use thiserror::Error;

/// Status code reported for failures that have no real HTTP status.
pub const FAILURE_STATUS: u16 = 500;

/// Errors that can occur while acquiring content for a URL.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CrawlError {
    /// A required credential or setting is absent or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transport failure: DNS, connect, TLS, timeout, non-2xx status, client setup.
    #[error("{message}")]
    Network {
        /// Human-readable failure description.
        message: String,
        /// Real HTTP status when the server answered with one.
        status: Option<u16>,
    },

    /// The request succeeded but nothing usable could be derived from it.
    #[error("{0}")]
    ContentExtraction(String),

    /// Upstream API refused the request because of request volume.
    #[error("rate limited: {0}")]
    RateLimit(String),

    /// Upstream API rejected the credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),
}

/// Stable label for a [`CrawlError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Network,
    ContentExtraction,
    RateLimit,
    Authentication,
}

impl ErrorKind {
    /// Returns the label written into result metadata.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Network => "network",
            Self::ContentExtraction => "content_extraction",
            Self::RateLimit => "rate_limit",
            Self::Authentication => "authentication",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CrawlError {
    /// Creates a `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a `Network` error without an HTTP status.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            status: None,
        }
    }

    /// Creates a `Network` error carrying the status the server answered with.
    #[must_use]
    pub fn network_status(message: impl Into<String>, status: u16) -> Self {
        Self::Network {
            message: message.into(),
            status: Some(status),
        }
    }

    /// Creates a `ContentExtraction` error.
    #[must_use]
    pub fn content_extraction(message: impl Into<String>) -> Self {
        Self::ContentExtraction(message.into())
    }

    /// Creates a `RateLimit` error.
    #[must_use]
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit(message.into())
    }

    /// Creates an `Authentication` error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    /// Classifies a reqwest failure for `url`.
    ///
    /// Status errors keep the real status code so the result reports it.
    #[must_use]
    pub fn from_reqwest(url: &str, error: &reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return Self::network_status(
                format!("HTTP {} for url: {url}", status.as_u16()),
                status.as_u16(),
            );
        }
        if error.is_timeout() {
            return Self::network(format!("request timed out: {url}"));
        }
        if error.is_connect() {
            return Self::network(format!("connection failed for {url}: {error}"));
        }
        Self::network(format!("request failed for {url}: {error}"))
    }

    /// Returns the kind label for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Network { .. } => ErrorKind::Network,
            Self::ContentExtraction(_) => ErrorKind::ContentExtraction,
            Self::RateLimit(_) => ErrorKind::RateLimit,
            Self::Authentication(_) => ErrorKind::Authentication,
        }
    }

    /// Status code a failure result should carry.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Network {
                status: Some(status),
                ..
            } => *status,
            _ => FAILURE_STATUS,
        }
    }

    /// Whether a caller could reasonably retry the same request later.
    ///
    /// Informational only; no engine retries on its own.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { status, .. } => status.is_none_or(|s| s >= 500 || s == 408),
            Self::RateLimit(_) => true,
            Self::Configuration(_) | Self::ContentExtraction(_) | Self::Authentication(_) => false,
        }
    }
}
