//! Engine selection and the process-wide engine cache.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::CrawlEngine;
use super::api_extract::ApiExtractEngine;
use super::browser::BrowserRenderEngine;
use super::direct_fetch::DirectFetchEngine;
use super::error::CrawlError;
use crate::config::CrawlerSettings;

/// Identifier of a concrete engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Managed extraction API (`tavily`).
    ApiExtract,
    /// Plain HTTP GET (`requests`).
    DirectFetch,
    /// Headless browser render (`custom`).
    BrowserRender,
}

impl EngineKind {
    /// All engines, cheapest first.
    pub const ALL: [Self; 3] = [Self::ApiExtract, Self::DirectFetch, Self::BrowserRender];

    /// Canonical identifier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApiExtract => "api_extract",
            Self::DirectFetch => "direct_fetch",
            Self::BrowserRender => "browser_render",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = CrawlError;

    /// Accepts canonical identifiers and the deployment aliases
    /// `tavily`, `requests` and `custom`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "tavily" | "api" | "api_extract" => Ok(Self::ApiExtract),
            "requests" | "direct" | "direct_fetch" => Ok(Self::DirectFetch),
            "custom" | "browser" | "playwright" | "browser_render" => Ok(Self::BrowserRender),
            _ => Err(CrawlError::configuration(format!(
                "unsupported crawler engine '{}' (expected tavily, requests or custom)",
                value.trim()
            ))),
        }
    }
}

/// Builds engines on first request and caches one instance per kind.
///
/// The first caller for a kind creates the engine; every later caller gets
/// the same instance until [`shutdown`](Self::shutdown).
pub struct EngineFactory {
    settings: CrawlerSettings,
    engines: DashMap<EngineKind, Arc<dyn CrawlEngine>>,
}

static GLOBAL_FACTORY: OnceLock<EngineFactory> = OnceLock::new();

impl EngineFactory {
    #[must_use]
    pub fn new(settings: CrawlerSettings) -> Self {
        Self {
            settings,
            engines: DashMap::new(),
        }
    }

    /// Process-wide factory configured from the environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the environment names an unknown
    /// engine or an invalid timeout. Nothing is cached in that case.
    pub fn global() -> Result<&'static Self, CrawlError> {
        if let Some(factory) = GLOBAL_FACTORY.get() {
            return Ok(factory);
        }
        let settings = CrawlerSettings::from_env()?;
        Ok(GLOBAL_FACTORY.get_or_init(|| Self::new(settings)))
    }

    /// Registers a prebuilt engine under its own kind, replacing any cached one.
    #[must_use]
    pub fn with_engine(self, engine: Arc<dyn CrawlEngine>) -> Self {
        self.engines.insert(engine.kind(), engine);
        self
    }

    #[must_use]
    pub fn settings(&self) -> &CrawlerSettings {
        &self.settings
    }

    /// Engine used when a call does not name one.
    #[must_use]
    pub fn default_kind(&self) -> EngineKind {
        self.settings.default_engine
    }

    /// Returns the cached engine for `kind`, or the default engine.
    #[must_use]
    pub fn get(&self, kind: Option<EngineKind>) -> Arc<dyn CrawlEngine> {
        let kind = kind.unwrap_or(self.settings.default_engine);
        let entry = self.engines.entry(kind).or_insert_with(|| {
            debug!(engine = %kind, "creating crawl engine");
            self.build(kind)
        });
        Arc::clone(entry.value())
    }

    /// Resolves an engine identifier or alias.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown identifier.
    pub fn get_by_name(&self, name: &str) -> Result<Arc<dyn CrawlEngine>, CrawlError> {
        let kind = name.parse::<EngineKind>()?;
        Ok(self.get(Some(kind)))
    }

    /// Kinds with a live cached engine.
    #[must_use]
    pub fn cached_kinds(&self) -> Vec<EngineKind> {
        let mut kinds: Vec<EngineKind> = self.engines.iter().map(|entry| *entry.key()).collect();
        kinds.sort();
        kinds
    }

    /// Cleans up and drops every cached engine.
    pub fn shutdown(&self) {
        let kinds = self.cached_kinds();
        for kind in kinds {
            if let Some((_, engine)) = self.engines.remove(&kind) {
                engine.cleanup();
            }
        }
        info!("crawl engines shut down");
    }

    fn build(&self, kind: EngineKind) -> Arc<dyn CrawlEngine> {
        match kind {
            EngineKind::ApiExtract => Arc::new(ApiExtractEngine::new(self.settings.api.clone())),
            EngineKind::DirectFetch => {
                Arc::new(DirectFetchEngine::new(self.settings.direct.clone()))
            }
            EngineKind::BrowserRender => {
                Arc::new(BrowserRenderEngine::new(self.settings.browser.clone()))
            }
        }
    }
}

impl fmt::Debug for EngineFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineFactory")
            .field("default_engine", &self.settings.default_engine)
            .field("cached", &self.cached_kinds())
            .finish_non_exhaustive()
    }
}
