//! Bridges between the blocking `crawl` contract and async engine internals.
//!
//! Engines are written against async transports. `crawl` hands the engine's
//! future to a small process-wide worker runtime and blocks the calling
//! thread until it completes; CPU-bound work inside `acrawl` is moved onto
//! the blocking pool so cooperative tasks keep running.

use std::future::Future;
use std::sync::LazyLock;

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

use super::error::CrawlError;

/// Async worker threads driving blocking `crawl` calls.
const WORKER_THREADS: usize = 2;

/// Upper bound on threads used for offloaded parsing/conversion.
const MAX_BLOCKING_THREADS: usize = 16;

static WORKER_POOL: LazyLock<Result<Runtime, String>> = LazyLock::new(|| {
    debug!(
        worker_threads = WORKER_THREADS,
        max_blocking_threads = MAX_BLOCKING_THREADS,
        "starting crawl worker pool"
    );
    Builder::new_multi_thread()
        .worker_threads(WORKER_THREADS)
        .max_blocking_threads(MAX_BLOCKING_THREADS)
        .thread_name("crawl-worker")
        .enable_all()
        .build()
        .map_err(|error| error.to_string())
});

/// Runs `future` to completion on the worker pool, blocking the caller.
///
/// Safe to call from inside an async runtime: the future is then driven from
/// a scoped OS thread instead of the caller's executor thread, which would
/// otherwise panic on a nested `block_on`.
///
/// # Errors
///
/// Returns a network error if the worker pool could not be started or the
/// driving thread panicked.
pub(crate) fn block_on<F>(future: F) -> Result<F::Output, CrawlError>
where
    F: Future + Send,
    F::Output: Send,
{
    let pool = WORKER_POOL
        .as_ref()
        .map_err(|error| CrawlError::network(format!("crawl worker pool unavailable: {error}")))?;

    if Handle::try_current().is_err() {
        return Ok(pool.block_on(future));
    }

    std::thread::scope(|scope| {
        scope
            .spawn(|| pool.block_on(future))
            .join()
            .map_err(|_| CrawlError::network("crawl worker thread panicked"))
    })
}

/// Runs CPU-bound `work` on the blocking pool of the current runtime.
///
/// # Errors
///
/// Returns a content-extraction error if the task panicked or was cancelled.
pub(crate) async fn offload<T, F>(work: F) -> Result<T, CrawlError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|error| CrawlError::content_extraction(format!("extraction task failed: {error}")))
}
