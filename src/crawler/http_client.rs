//! Shared HTTP session construction policy for the HTTP-based engines.
//!
//! Centralizes the browser header profile, timeouts, redirect policy, TLS and
//! proxy handling so the direct fetch session, its fallback loader and the
//! extraction API client stay consistent.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder, Proxy};
use tracing::{debug, warn};

use super::CrawlOptions;
use super::error::CrawlError;
use crate::user_agent::BROWSER_HEADERS;

/// Default whole-request timeout for HTTP and API calls.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_REDIRECTS: usize = 10;

/// Inputs for one session build.
#[derive(Debug, Clone)]
pub(crate) struct SessionSpec<'a> {
    pub user_agent: &'a str,
    pub timeout: Duration,
    /// Send the browser header profile as session defaults.
    pub browser_profile: bool,
    pub options: &'a CrawlOptions,
}

/// Builds an HTTP session using the shared policy.
///
/// # Errors
///
/// Returns a network error when the client cannot be constructed, including
/// invalid proxy URLs.
pub(crate) fn build_session(spec: &SessionSpec<'_>) -> Result<Client, CrawlError> {
    match try_build(spec, false) {
        Ok(client) => Ok(client),
        Err(BuildFailure::Panic) => {
            // Some sandboxed environments panic while querying system proxy
            // settings. Retry with environment proxies only.
            warn!("HTTP session hit system proxy panic; using env-proxy fallback builder");
            match try_build(spec, true) {
                Ok(client) => Ok(client),
                Err(BuildFailure::Panic) => Err(CrawlError::network(
                    "Failed to initialize HTTP session: client construction panicked",
                )),
                Err(BuildFailure::Build(error)) => Err(session_error(&error)),
            }
        }
        Err(BuildFailure::Build(error)) => Err(session_error(&error)),
    }
}

fn session_error(error: &BuildError) -> CrawlError {
    CrawlError::network(format!("Failed to initialize HTTP session: {error}"))
}

#[derive(Debug)]
enum BuildError {
    Client(reqwest::Error),
    Proxy(String, reqwest::Error),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client(error) => write!(f, "{error}"),
            Self::Proxy(proxy, error) => write!(f, "invalid proxy {proxy}: {error}"),
        }
    }
}

enum BuildFailure {
    Panic,
    Build(BuildError),
}

fn try_build(spec: &SessionSpec<'_>, disable_system_proxy_lookup: bool) -> Result<Client, BuildFailure> {
    catch_unwind(AssertUnwindSafe(|| {
        let mut builder = base_builder(spec);
        if let Some(proxy) = spec.options.proxy.as_ref().filter(|proxy| !proxy.is_empty()) {
            builder = builder.no_proxy();
            if let Some(http) = proxy.http.as_deref() {
                let resolved = Proxy::http(http)
                    .map_err(|error| BuildFailure::Build(BuildError::Proxy(http.to_string(), error)))?;
                builder = builder.proxy(resolved);
            }
            if let Some(https) = proxy.https.as_deref() {
                let resolved = Proxy::https(https)
                    .map_err(|error| BuildFailure::Build(BuildError::Proxy(https.to_string(), error)))?;
                builder = builder.proxy(resolved);
            }
        } else if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder
            .build()
            .map_err(|error| BuildFailure::Build(BuildError::Client(error)))
    }))
    .map_err(|_| BuildFailure::Panic)?
}

fn base_builder(spec: &SessionSpec<'_>) -> ClientBuilder {
    debug!(
        timeout_secs = spec.timeout.as_secs(),
        ignore_ssl = spec.options.ignore_ssl,
        browser_profile = spec.browser_profile,
        "building HTTP session"
    );
    let mut builder = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT.min(spec.timeout))
        .timeout(spec.timeout)
        .user_agent(spec.user_agent)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .deflate(true);

    if spec.browser_profile {
        builder = builder.default_headers(browser_header_map());
    }
    if spec.options.ignore_ssl {
        builder = builder.danger_accept_invalid_certs(true);
    }
    builder
}

/// The browser profile as a header map.
pub(crate) fn browser_header_map() -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(BROWSER_HEADERS.len());
    for (name, value) in BROWSER_HEADERS {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    headers
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    let names: &[&str] = match scheme {
        "https" => &["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"],
        "http" => &["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"],
        _ => return None,
    };
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
