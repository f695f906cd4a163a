//! Webcrawl Core Library
//!
//! Pluggable web content acquisition for automated agents: a URL goes in,
//! a uniform [`CrawlResult`] comes out, whichever engine produced it.
//!
//! # Architecture
//!
//! - [`crawler`] - Result model, error taxonomy, engines, factory and escalation
//! - [`config`] - Settings assembled from the environment
//! - [`tool`] - JSON boundary consumed by agent loops
//! - [`user_agent`] - Browser identity shared by the HTTP engines

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod crawler;
pub mod tool;
pub mod user_agent;

// Re-export commonly used types
pub use config::CrawlerSettings;
pub use crawler::{
    CrawlEngine, CrawlError, CrawlOptions, CrawlResult, EngineFactory, EngineKind, ErrorKind,
    EscalationChain, ProxyConfig, validate_url,
};
pub use tool::{CrawlToolOutput, CrawlerInput, CrawlerTool};
