//! CLI entry point for the webcrawl tool.

use std::io::{self, IsTerminal, Read};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::StreamExt;
use futures_util::stream;
use tracing::{debug, info, warn};
use webcrawl_core::crawler::{
    CrawlEngine, CrawlOptions, CrawlResult, EngineFactory, EngineKind, EscalationChain,
    ProxyConfig,
};
use webcrawl_core::{CrawlToolOutput, CrawlerSettings};

mod app_config;
mod cli;

use cli::Args;

/// How one invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOutcome {
    Success,
    Partial,
    Failure,
}

impl RunOutcome {
    fn from_counts(succeeded: usize, failed: usize) -> Self {
        if failed == 0 {
            Self::Success
        } else if succeeded > 0 {
            Self::Partial
        } else {
            Self::Failure
        }
    }

    fn exit_code(self) -> ExitCode {
        match self {
            Self::Success => ExitCode::SUCCESS,
            Self::Partial => ExitCode::from(1),
            Self::Failure => ExitCode::from(2),
        }
    }
}

/// Engine or fallback chain selected for this run.
enum Crawler {
    Single(Arc<dyn CrawlEngine>),
    Chain(EscalationChain),
}

impl Crawler {
    async fn acrawl(&self, url: &str, options: &CrawlOptions) -> CrawlResult {
        match self {
            Self::Single(engine) => engine.acrawl(url, options).await,
            Self::Chain(chain) => chain.acrawl(url, options).await,
        }
    }

    fn crawl(&self, url: &str, options: &CrawlOptions) -> CrawlResult {
        match self {
            Self::Single(engine) => engine.crawl(url, options),
            Self::Chain(chain) => chain.crawl(url, options),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // stdout is reserved for crawl records
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let urls = read_urls(&args)?;
    if urls.is_empty() {
        info!("No input provided. Pass URLs as arguments or pipe them via stdin.");
        info!("Example: echo 'https://example.com' | webcrawl --engine requests");
        return Ok(ExitCode::SUCCESS);
    }

    let settings = load_settings(&args)?;
    let factory = EngineFactory::new(settings);
    let crawler = select_crawler(&factory, &args);
    let options = crawl_options(&args);

    info!(urls = urls.len(), engine = %args.engine.unwrap_or(factory.default_kind()), "crawling");

    let results: Vec<CrawlResult> = if args.sync {
        let mut results = Vec::with_capacity(urls.len());
        for url in &urls {
            results.push(tokio::task::block_in_place(|| crawler.crawl(url, &options)));
        }
        results
    } else {
        stream::iter(urls.iter())
            .map(|url| crawler.acrawl(url, &options))
            .buffered(usize::from(args.concurrency))
            .collect()
            .await
    };

    let mut succeeded = 0;
    for result in &results {
        if result.is_success() {
            succeeded += 1;
        } else {
            warn!(url = result.url(), status = result.status_code(), error = result.error().unwrap_or_default(), "crawl failed");
        }
        let output = CrawlToolOutput::from(result);
        if args.summary {
            println!("{}", output.summary());
        } else {
            println!("{}", output.to_json());
        }
    }

    factory.shutdown();

    let failed = results.len() - succeeded;
    info!(succeeded, failed, "crawl complete");
    Ok(RunOutcome::from_counts(succeeded, failed).exit_code())
}

fn read_urls(args: &Args) -> Result<Vec<String>> {
    let raw = if !args.urls.is_empty() {
        args.urls.join("\n")
    } else if !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read URLs from stdin")?;
        buffer
    } else {
        String::new()
    };

    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// CLI flag > environment > config file > built-in default.
fn load_settings(args: &Args) -> Result<CrawlerSettings> {
    let loaded = app_config::load_file_config(args.config.as_deref())?;
    let mut settings = CrawlerSettings::default();
    if let Some(file_config) = &loaded.config {
        debug!(path = ?loaded.path, "applying config file");
        settings = file_config.apply(settings);
    }

    let mut settings = settings
        .with_env_overrides(|key| std::env::var(key).ok())
        .context("Invalid crawler environment")?;

    if let Some(kind) = args.engine {
        settings = settings.with_default_engine(kind);
    }
    Ok(settings)
}

fn select_crawler(factory: &EngineFactory, args: &Args) -> Crawler {
    if args.fallback.is_empty() {
        return Crawler::Single(factory.get(args.engine));
    }
    let mut kinds: Vec<EngineKind> = vec![args.engine.unwrap_or(factory.default_kind())];
    kinds.extend(args.fallback.iter().copied());
    let chain = EscalationChain::new(factory, &kinds);
    debug!(engines = ?chain.kinds(), "using fallback chain");
    Crawler::Chain(chain)
}

fn crawl_options(args: &Args) -> CrawlOptions {
    CrawlOptions {
        ignore_ssl: args.ignore_ssl,
        proxy: args.proxy.clone().map(ProxyConfig::all),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_outcome_from_counts() {
        assert_eq!(RunOutcome::from_counts(3, 0), RunOutcome::Success);
        assert_eq!(RunOutcome::from_counts(0, 0), RunOutcome::Success);
        assert_eq!(RunOutcome::from_counts(2, 1), RunOutcome::Partial);
        assert_eq!(RunOutcome::from_counts(0, 2), RunOutcome::Failure);
    }

    #[test]
    fn test_crawl_options_from_flags() {
        let args = Args::try_parse_from(["webcrawl", "--ignore-ssl", "--proxy", "http://p:1"])
            .unwrap();
        let options = crawl_options(&args);
        assert!(options.ignore_ssl);
        assert_eq!(options.proxy, Some(ProxyConfig::all("http://p:1")));

        let args = Args::try_parse_from(["webcrawl"]).unwrap();
        assert!(crawl_options(&args).is_default());
    }

    #[test]
    fn test_select_crawler_builds_chain_with_primary_first() {
        let factory = EngineFactory::new(CrawlerSettings::default());
        let args =
            Args::try_parse_from(["webcrawl", "-e", "requests", "-f", "custom"]).unwrap();
        let Crawler::Chain(chain) = select_crawler(&factory, &args) else {
            panic!("fallback flag must select a chain");
        };
        assert_eq!(
            chain.kinds(),
            vec![EngineKind::DirectFetch, EngineKind::BrowserRender]
        );
    }

    #[test]
    fn test_select_crawler_single_engine() {
        let factory = EngineFactory::new(CrawlerSettings::default());
        let args = Args::try_parse_from(["webcrawl", "-e", "requests"]).unwrap();
        let Crawler::Single(engine) = select_crawler(&factory, &args) else {
            panic!("no fallback must select a single engine");
        };
        assert_eq!(engine.kind(), EngineKind::DirectFetch);
    }
}
