//! Chromium launcher using chromiumoxide.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::EventLifecycleEvent;
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{
    BrowserLauncher, BrowserSession, DEFAULT_NAVIGATION_TIMEOUT, RenderProfile, RenderedPage,
};
use crate::crawler::error::CrawlError;

/// Environment variable naming the browser executable.
pub const CHROMIUM_PATH_ENV: &str = "CHROMIUM_PATH";

/// Reads the main document status from Navigation Timing; 200 when unavailable.
const STATUS_SCRIPT: &str = "(() => { \
    const entry = performance.getEntriesByType('navigation')[0]; \
    return entry && entry.responseStatus ? entry.responseStatus : 200; \
})()";

const DEFAULT_STATUS: u16 = 200;

static PROFILE_SEQUENCE: AtomicUsize = AtomicUsize::new(0);

/// Finds a Chromium-family browser executable.
///
/// Checks `CHROMIUM_PATH`, then common binary names on `PATH`.
#[must_use]
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(configured) = std::env::var(CHROMIUM_PATH_ENV) {
        let path = PathBuf::from(configured.trim());
        if path.exists() {
            return Some(path);
        }
    }

    let names = [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
        "chrome",
    ];
    let search_path = std::env::var_os("PATH")?;
    std::env::split_paths(&search_path)
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

/// Launches one headless Chromium per session.
#[derive(Debug)]
pub struct ChromiumLauncher {
    executable: Option<PathBuf>,
    request_timeout: Duration,
    open: Arc<AtomicUsize>,
}

impl Default for ChromiumLauncher {
    fn default() -> Self {
        Self::new(None, DEFAULT_NAVIGATION_TIMEOUT)
    }
}

impl ChromiumLauncher {
    /// Creates a launcher; without an explicit executable one is discovered at launch.
    ///
    /// `request_timeout` bounds every CDP command, navigation included, so it
    /// must match the engine's navigation budget.
    #[must_use]
    pub fn new(executable: Option<PathBuf>, request_timeout: Duration) -> Self {
        Self {
            executable,
            request_timeout,
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Timeout applied to CDP commands of launched browsers.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    fn profile_dir() -> PathBuf {
        let sequence = PROFILE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!(
            "webcrawl-chromium-{}-{sequence}",
            std::process::id()
        ))
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, CrawlError> {
        let executable = self.executable.clone().or_else(find_chromium).ok_or_else(|| {
            CrawlError::configuration(format!(
                "no Chromium executable found; set {CHROMIUM_PATH_ENV}"
            ))
        })?;

        let profile_dir = Self::profile_dir();
        let config = BrowserConfig::builder()
            .chrome_executable(&executable)
            .user_data_dir(&profile_dir)
            .request_timeout(self.request_timeout)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg("--disable-blink-features=AutomationControlled")
            .build()
            .map_err(|error| CrawlError::network(format!("failed to configure browser: {error}")))?;

        let (browser, mut handler) = match Browser::launch(config).await {
            Ok(launched) => launched,
            Err(error) => {
                remove_profile_dir(&profile_dir);
                return Err(CrawlError::network(format!(
                    "failed to launch browser {}: {error}",
                    executable.display()
                )));
            }
        };

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        self.open.fetch_add(1, Ordering::SeqCst);
        debug!(profile_dir = %profile_dir.display(), "launched Chromium");
        Ok(Box::new(ChromiumSession {
            browser,
            handler_task,
            profile_dir,
            open: Arc::clone(&self.open),
            released: false,
        }))
    }

    fn open_sessions(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

/// A running Chromium process with its private profile directory.
pub struct ChromiumSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    profile_dir: PathBuf,
    open: Arc<AtomicUsize>,
    released: bool,
}

impl ChromiumSession {
    async fn prepare(page: &Page, profile: &RenderProfile) -> Result<(), CrawlError> {
        page.execute(EnableParams::default())
            .await
            .map_err(|error| cdp_error("enable network domain", &error))?;

        let user_agent = SetUserAgentOverrideParams::builder()
            .user_agent(profile.user_agent.clone())
            .accept_language(profile.accept_language.clone())
            .build()
            .map_err(|error| CrawlError::network(format!("invalid user agent override: {error}")))?;
        page.execute(user_agent)
            .await
            .map_err(|error| cdp_error("set user agent", &error))?;

        if !profile.extra_headers.is_empty() {
            let headers: Map<String, Value> = profile
                .extra_headers
                .iter()
                .map(|(name, value)| (name.clone(), Value::String(value.clone())))
                .collect();
            page.execute(SetExtraHttpHeadersParams::new(Headers::new(Value::Object(headers))))
                .await
                .map_err(|error| cdp_error("set extra headers", &error))?;
        }
        Ok(())
    }

    /// Drops everything that does not need the browser to cooperate.
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.handler_task.abort();
        remove_profile_dir(&self.profile_dir);
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn render(&mut self, url: &str, profile: &RenderProfile) -> Result<RenderedPage, CrawlError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|error| cdp_error("open page", &error))?;
        Self::prepare(&page, profile).await?;

        let mut lifecycle = page
            .event_listener::<EventLifecycleEvent>()
            .await
            .map_err(|error| cdp_error("subscribe to lifecycle events", &error))?;
        let main_frame = page
            .mainframe()
            .await
            .map_err(|error| cdp_error("resolve main frame", &error))?;

        page.goto(url)
            .await
            .map_err(|error| CrawlError::network(format!("navigation failed for {url}: {error}")))?;

        let main_frame_id: Option<&str> = main_frame.as_ref().map(|frame| frame.as_ref());
        let mut tracker = SettleTracker::new(main_frame_id);
        let settled = tokio::time::timeout(profile.settle_timeout, async {
            while let Some(event) = lifecycle.next().await {
                if tracker.observe(event.frame_id.as_ref(), event.loader_id.as_ref(), &event.name) {
                    break;
                }
            }
        })
        .await;
        if settled.is_err() {
            debug!(url, "network did not go idle; capturing current DOM");
        }

        let status = match page.evaluate(STATUS_SCRIPT).await {
            Ok(evaluation) => evaluation.into_value::<u16>().unwrap_or(DEFAULT_STATUS),
            Err(error) => {
                debug!(url, error = %error, "navigation status unavailable");
                DEFAULT_STATUS
            }
        };

        let html = page
            .content()
            .await
            .map_err(|error| cdp_error("read page content", &error))?;
        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());

        Ok(RenderedPage {
            status,
            html,
            final_url,
        })
    }

    async fn close(mut self: Box<Self>) {
        if let Err(error) = self.browser.close().await {
            warn!(error = %error, "failed to close Chromium cleanly; killing it");
            // An unanswered close leaves the process running and wait() would never return.
            if let Some(Err(error)) = self.browser.kill().await {
                warn!(error = %error, "failed to kill Chromium");
            }
        }
        if let Err(error) = self.browser.wait().await {
            debug!(error = %error, "failed to reap Chromium process");
        }
        self.release();
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        // chromiumoxide kills a browser that was not closed when it is dropped.
        self.release();
    }
}

/// Waits for `networkIdle` of the navigation's own document loader.
///
/// Events from other frames, and from loaders whose `init` was not seen
/// (the `about:blank` document), are ignored.
#[derive(Debug)]
struct SettleTracker<'a> {
    main_frame: Option<&'a str>,
    loader: Option<String>,
}

impl<'a> SettleTracker<'a> {
    fn new(main_frame: Option<&'a str>) -> Self {
        Self {
            main_frame,
            loader: None,
        }
    }

    /// Returns true once the navigated document went network idle.
    fn observe(&mut self, frame_id: &str, loader_id: &str, name: &str) -> bool {
        if self.main_frame.is_some_and(|main| main != frame_id) {
            return false;
        }
        match name {
            "init" => {
                self.loader = Some(loader_id.to_string());
                false
            }
            "networkIdle" => self.loader.as_deref() == Some(loader_id),
            _ => false,
        }
    }
}

fn cdp_error(action: &str, error: &chromiumoxide::error::CdpError) -> CrawlError {
    CrawlError::network(format!("browser failed to {action}: {error}"))
}

fn remove_profile_dir(path: &Path) {
    if let Err(error) = std::fs::remove_dir_all(path)
        && error.kind() != std::io::ErrorKind::NotFound
    {
        debug!(path = %path.display(), error = %error, "failed to remove browser profile");
    }
}
