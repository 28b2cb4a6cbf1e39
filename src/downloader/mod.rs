//! Downloader module: the concurrent download pipeline
//!
//! This module provides:
//! - `RateLimiter`: token bucket shared by the pagination loop and every worker
//! - `RetryingFetcher`: HTTP GET with bounded retries and quadratic backoff
//! - `WorkerPool`: fixed number of workers over bounded job and result queues
//! - `ProgressTracker`: totals and throughput derived from the result stream
//! - `Coordinator`: pagination, result consumption and the shutdown protocol

mod coordinator;
mod fetcher;
mod in_flight;
mod job;
mod limiter;
mod pool;
mod progress;

pub use coordinator::Coordinator;
pub use fetcher::{build_http_client, Contents, FetchError, RetryingFetcher};
pub use in_flight::InFlight;
pub use job::{Job, JobResult};
pub use limiter::{RateLimitError, RateLimiter};
pub use pool::{PoolError, WorkerPool};
pub use progress::{Progress, ProgressTracker};
