//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use webcrawl_core::crawler::EngineKind;

/// Default number of URLs crawled at once.
pub const DEFAULT_CONCURRENCY: u8 = 4;

/// Crawl web pages and print one JSON record per URL.
///
/// Engines: `tavily` (extraction API), `requests` (plain HTTP fetch) and
/// `custom` (headless browser render). URLs come from arguments or stdin.
#[derive(Parser, Debug)]
#[command(name = "webcrawl")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to crawl (read from stdin, one per line, when omitted)
    pub urls: Vec<String>,

    /// Engine to use instead of the configured default
    #[arg(short, long)]
    pub engine: Option<EngineKind>,

    /// Engines to try, in order, when the first one fails (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    pub fallback: Vec<EngineKind>,

    /// Config file (defaults to $XDG_CONFIG_HOME/webcrawl/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Skip TLS certificate verification for direct fetches
    #[arg(long)]
    pub ignore_ssl: bool,

    /// Proxy for direct fetches, e.g. http://127.0.0.1:8080
    #[arg(long)]
    pub proxy: Option<String>,

    /// Maximum URLs crawled at once (1-16)
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub concurrency: u8,

    /// Use the blocking crawl path instead of the async one
    #[arg(long)]
    pub sync: bool,

    /// Print the readable summary instead of JSON
    #[arg(long)]
    pub summary: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
