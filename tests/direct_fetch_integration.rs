//! Integration tests for the direct fetch engine against a mock server.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use webcrawl_core::crawler::{
    CrawlEngine, CrawlError, CrawlOptions, DirectFetchConfig, DirectFetchEngine, DocumentLoader,
    DomainHeaderRule, DomainHeaderTable, LoadContext,
};
use webcrawl_core::user_agent::{ACCEPT_LANGUAGE, DEFAULT_USER_AGENT};
use wiremock::matchers::{header, headers, method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

/// Loader that records calls and returns fixed text.
struct RecordingLoader {
    calls: AtomicUsize,
    text: String,
    seen_headers: Mutex<Vec<(String, String)>>,
}

impl RecordingLoader {
    fn new(text: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            text: text.to_string(),
            seen_headers: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl DocumentLoader for RecordingLoader {
    async fn load(&self, _url: &str, context: &LoadContext<'_>) -> Result<String, CrawlError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_headers
            .lock()
            .unwrap()
            .extend(context.extra_headers.iter().cloned());
        Ok(self.text.clone())
    }
}

fn engine_with_loader(loader: Arc<RecordingLoader>) -> DirectFetchEngine {
    DirectFetchEngine::with_loader(DirectFetchConfig::default(), loader)
}

#[tokio::test]
async fn test_fetch_returns_body_headers_and_metadata() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path("/article"))
        // wiremock splits request header values on ',' before comparing.
        .and(headers("user-agent", DEFAULT_USER_AGENT.split(',').map(str::trim).collect()))
        .and(headers("accept-language", ACCEPT_LANGUAGE.split(',').map(str::trim).collect()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body><p>Hello from the mock</p></body></html>")
                .insert_header("content-type", "text/html")
                .insert_header("x-served-by", "mock"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let loader = RecordingLoader::new("unused");
    let engine = engine_with_loader(Arc::clone(&loader));
    let url = format!("{}/article", mock_server.uri());
    let result = engine.acrawl(&url, &CrawlOptions::default()).await;

    assert!(result.is_success(), "unexpected failure: {:?}", result.error());
    assert_eq!(result.status_code(), 200);
    assert!(result.content().contains("Hello from the mock"));
    assert_eq!(result.headers().get("x-served-by").map(String::as_str), Some("mock"));
    assert_eq!(result.metadata()["source"], url.as_str());
    assert_eq!(result.metadata()["method"], "async");
    assert_eq!(result.metadata()["encoding"], "UTF-8");
    assert_eq!(loader.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_body_uses_loader_exactly_once() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(200).set_body_string("  \n  "))
        .mount(&mock_server)
        .await;

    let loader = RecordingLoader::new("loaded by the fallback");
    let engine = engine_with_loader(Arc::clone(&loader));
    let result = engine
        .acrawl(&format!("{}/empty", mock_server.uri()), &CrawlOptions::default())
        .await;

    assert!(result.is_success());
    assert_eq!(result.content(), "loaded by the fallback");
    assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_body_and_empty_loader_is_content_extraction_error() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path("/blank"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let loader = RecordingLoader::new("");
    let engine = engine_with_loader(Arc::clone(&loader));
    let result = engine
        .acrawl(&format!("{}/blank", mock_server.uri()), &CrawlOptions::default())
        .await;

    assert!(result.is_error());
    assert_eq!(result.status_code(), 500);
    assert_eq!(result.error(), Some("No content extracted"));
    assert_eq!(result.error_kind(), Some("content_extraction"));
    assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_http_error_carries_status() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
        .mount(&mock_server)
        .await;

    let loader = RecordingLoader::new("unused");
    let engine = engine_with_loader(Arc::clone(&loader));
    let result = engine
        .acrawl(&format!("{}/missing", mock_server.uri()), &CrawlOptions::default())
        .await;

    assert!(result.is_error());
    assert_eq!(result.status_code(), 404);
    assert_eq!(result.error_kind(), Some("network"));
    assert!(result.content().is_empty());
    assert_eq!(loader.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrent_calls_do_not_mix_results() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };

    for index in 0..8 {
        Mock::given(method("GET"))
            .and(path(format!("/page/{index}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("body for page {index}")))
            .mount(&mock_server)
            .await;
    }

    let engine = Arc::new(DirectFetchEngine::new(DirectFetchConfig::default()));
    let options = CrawlOptions::default();
    let urls: Vec<String> = (0..8)
        .map(|index| format!("{}/page/{index}", mock_server.uri()))
        .collect();
    let results =
        futures_util::future::join_all(urls.iter().map(|url| engine.acrawl(url, &options))).await;

    for (index, (url, result)) in urls.iter().zip(&results).enumerate() {
        assert_eq!(result.url(), url);
        assert_eq!(result.content(), format!("body for page {index}"));
    }
    assert!(engine.has_session());
}

#[tokio::test]
async fn test_cleanup_twice_then_crawl_reopens_session() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path("/again"))
        .respond_with(ResponseTemplate::new(200).set_body_string("still here"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let engine = DirectFetchEngine::new(DirectFetchConfig::default());
    let url = format!("{}/again", mock_server.uri());

    assert!(engine.acrawl(&url, &CrawlOptions::default()).await.is_success());
    assert!(engine.has_session());

    engine.cleanup();
    engine.cleanup();
    assert!(!engine.has_session());

    let result = engine.acrawl(&url, &CrawlOptions::default()).await;
    assert!(result.is_success());
    assert_eq!(result.content(), "still here");
    assert!(engine.has_session());
}

#[tokio::test]
async fn test_domain_overrides_reach_request_and_loader() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path("/guarded"))
        .and(header("referer", "https://origin.test/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .expect(1)
        .mount(&mock_server)
        .await;

    let table = DomainHeaderTable::new().with_rule(DomainHeaderRule::new(
        "127.0.0.1",
        &[("Referer", "https://origin.test/")],
    ));
    let config = DirectFetchConfig {
        domain_headers: table,
        ..DirectFetchConfig::default()
    };
    let loader = RecordingLoader::new("guarded text");
    let engine = DirectFetchEngine::with_loader(config, Arc::clone(&loader) as Arc<dyn DocumentLoader>);

    let result = engine
        .acrawl(&format!("{}/guarded", mock_server.uri()), &CrawlOptions::default())
        .await;

    assert!(result.is_success(), "unexpected failure: {:?}", result.error());
    assert_eq!(
        loader.seen_headers.lock().unwrap().as_slice(),
        &[("Referer".to_string(), "https://origin.test/".to_string())]
    );
}

#[tokio::test]
async fn test_call_options_use_one_off_session() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path("/options"))
        .respond_with(ResponseTemplate::new(200).set_body_string("with options"))
        .mount(&mock_server)
        .await;

    let engine = DirectFetchEngine::new(DirectFetchConfig::default());
    let options = CrawlOptions {
        ignore_ssl: true,
        proxy: None,
    };
    let result = engine
        .acrawl(&format!("{}/options", mock_server.uri()), &options)
        .await;

    assert!(result.is_success());
    assert!(!engine.has_session(), "per-call options must not replace the shared session");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_blocking_crawl_inside_runtime() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path("/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_string("sync body"))
        .mount(&mock_server)
        .await;

    let engine = DirectFetchEngine::new(DirectFetchConfig::default());
    let url = format!("{}/sync", mock_server.uri());
    let result = tokio::task::block_in_place(|| engine.crawl(&url, &CrawlOptions::default()));

    assert!(result.is_success());
    assert_eq!(result.content(), "sync body");
    assert!(result.metadata().get("method").is_none());
}

#[tokio::test]
async fn test_gbk_page_is_decoded() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };

    let (bytes, _, _) = encoding_rs::GBK
        .encode("<html><body><p>中文网页内容，这里有一些中文文本用于检测编码是否正确。</p></body></html>");
    Mock::given(method("GET"))
        .and(path("/gbk"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(bytes.into_owned(), "text/html; charset=utf-8"),
        )
        .mount(&mock_server)
        .await;

    let engine = DirectFetchEngine::new(DirectFetchConfig::default());
    let result = engine
        .acrawl(&format!("{}/gbk", mock_server.uri()), &CrawlOptions::default())
        .await;

    assert!(result.is_success());
    assert!(result.content().contains("中文网页内容"), "decoded: {}", result.content());
}

#[test]
fn test_invalid_url_uniform_across_paths() {
    let engine = DirectFetchEngine::new(DirectFetchConfig::default());
    for url in ["", "example.com", "ftp://example.com", "https://exa mple.com/<x>"] {
        let result = engine.crawl(url, &CrawlOptions::default());
        assert_eq!(result.status_code(), 400, "url {url:?}");
        assert_eq!(result.error(), Some("Invalid URL"));
        assert!(result.content().is_empty());
        assert!(result.is_error() && !result.is_success());
    }
}
