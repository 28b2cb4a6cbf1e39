//! Download coordinator
//!
//! This module orchestrates one download run, including:
//! - Paging through the listing source and submitting one job per post
//! - Filtering, downloading and persisting posts on the worker pool
//! - Consuming results into the progress tracker
//! - The shutdown and drain protocol
//!
//! # Lifecycle
//!
//! `Stopped -> Running -> ShuttingDown -> Stopped`. A shutdown request (from
//! [`Coordinator::request_shutdown`], [`Coordinator::stop`], the volume cap or
//! an empty page) stops the pagination loop; every job already submitted is
//! still processed and accounted for before `run` returns.

use super::fetcher::{FetchError, RetryingFetcher};
use super::in_flight::InFlight;
use super::job::{Job, JobResult};
use super::limiter::RateLimiter;
use super::pool::WorkerPool;
use super::progress::{Progress, ProgressTracker};
use crate::booru::{self, media_name, ListingSource, Post};
use crate::config::Config;
use crate::state::RunState;
use crate::{ConfigError, HarvestError, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use url::Url;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Main download coordinator
pub struct Coordinator {
    config: Arc<Config>,
    source: Arc<dyn ListingSource>,
    fetcher: Arc<RetryingFetcher>,
    progress: Arc<ProgressTracker>,
    state: Arc<watch::Sender<RunState>>,
    /// Token of the current (or last) run
    shutdown: Mutex<CancellationToken>,
}

impl Coordinator {
    /// Creates a coordinator over an explicit listing source
    pub fn new(
        config: Config,
        source: Arc<dyn ListingSource>,
        fetcher: Arc<RetryingFetcher>,
    ) -> Self {
        let (state, _) = watch::channel(RunState::Stopped);

        Self {
            config: Arc::new(config),
            source,
            fetcher,
            progress: Arc::new(ProgressTracker::new()),
            state: Arc::new(state),
            shutdown: Mutex::new(CancellationToken::new()),
        }
    }

    /// Builds the HTTP client and picks the listing source from `config`
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(HarvestError)` - Invalid URL or proxy, or unsupported booru
    pub fn from_config(config: Config) -> Result<Self> {
        let fetcher = Arc::new(RetryingFetcher::from_config(&config).map_err(FetchError::Client)?);

        let base = Url::parse(&config.source.url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", config.source.url, e)))?;
        let source = booru::source_for(&base, Arc::clone(&fetcher))?;

        Ok(Self::new(config, source, fetcher))
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Whether a run is in progress, including its drain
    ///
    /// Stays true while `ShuttingDown`; use [`Coordinator::state`] to tell a
    /// draining run from an active one.
    pub fn is_running(&self) -> bool {
        self.state() != RunState::Stopped
    }

    /// Snapshot of the current run's progress
    ///
    /// Each call closes the speed sample, so poll from a single place.
    pub fn progress(&self) -> Progress {
        self.progress.snapshot()
    }

    fn lock_shutdown(&self) -> MutexGuard<'_, CancellationToken> {
        self.shutdown.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Asks the current run to stop submitting work; never blocks
    ///
    /// Safe to call any number of times, from any task, including signal
    /// handlers. A request made before `run` starts is kept, and that run
    /// drains at once.
    pub fn request_shutdown(&self) {
        let token = self.lock_shutdown();
        signal_shutdown(&token, &self.state);
    }

    /// Requests shutdown and waits until the run has fully drained
    ///
    /// Returns at once when no run is in progress.
    pub async fn stop(&self) {
        {
            let token = self.lock_shutdown();
            if self.state() == RunState::Stopped {
                return;
            }
            signal_shutdown(&token, &self.state);
        }

        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| *s == RunState::Stopped).await;
    }

    /// Runs until shutdown is requested, then drains
    ///
    /// # Returns
    ///
    /// * `Ok(Progress)` - Final progress after every submitted job resolved
    /// * `Err(HarvestError::AlreadyRunning)` - Another run is in progress
    /// * `Err(HarvestError::Pool)` - The worker pool refused a job
    pub async fn run(&self) -> Result<Progress> {
        let token = self.begin()?;
        self.progress.reset();

        tracing::info!(
            "Starting download from {} with {} workers",
            self.source.host(),
            self.config.download.workers
        );

        let outcome = self.execute(&token).await;

        {
            // The next run starts without a pending shutdown request
            let mut shutdown = self.lock_shutdown();
            *shutdown = CancellationToken::new();
            self.state.send_replace(RunState::Stopped);
        }
        let progress = self.progress.snapshot();
        tracing::info!(
            "Run finished: {} downloaded, {} skipped, {} failed ({:.02} GB)",
            progress.downloaded,
            progress.skipped,
            progress.failed,
            progress.downloaded_gb()
        );

        outcome.map(|()| progress)
    }

    /// Moves `Stopped -> Running` and hands out the run's shutdown token
    ///
    /// The token is replaced only when a run ends, so a shutdown requested
    /// while stopped still reaches this run.
    fn begin(&self) -> Result<CancellationToken> {
        let shutdown = self.lock_shutdown();

        let started = self.state.send_if_modified(|state| {
            if state.can_transition_to(RunState::Running) {
                *state = RunState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(HarvestError::AlreadyRunning);
        }

        Ok(shutdown.clone())
    }

    async fn execute(&self, token: &CancellationToken) -> Result<()> {
        // Limiter, pool and in-flight counter live for this run only
        let limiter = RateLimiter::from_config(&self.config);
        let pool: WorkerPool<Job, JobResult> = WorkerPool::new(self.config.worker_count());
        let in_flight = InFlight::new();

        let results = pool.results()?;
        let processor = Arc::new(JobProcessor {
            config: Arc::clone(&self.config),
            fetcher: Arc::clone(&self.fetcher),
            limiter: limiter.clone(),
        });
        pool.start(move |job| {
            let processor = Arc::clone(&processor);
            async move { processor.process(job).await }
        })?;

        let consumer = ResultConsumer {
            progress: Arc::clone(&self.progress),
            in_flight: in_flight.clone(),
            download_limit: self.config.download_limit_bytes(),
            token: token.clone(),
            state: Arc::clone(&self.state),
        };
        let consumer = tokio::spawn(consumer.run(results));

        let paginated = self.paginate(&pool, &limiter, &in_flight, token).await;

        // Whatever ended the loop, no more jobs are submitted from here on
        signal_shutdown(token, &self.state);
        tracing::info!("[Main] Waiting for {} in-flight downloads", in_flight.count());
        in_flight.wait_idle().await;
        pool.shutdown().await;
        consumer.await?;

        paginated
    }

    async fn paginate(
        &self,
        pool: &WorkerPool<Job, JobResult>,
        limiter: &RateLimiter,
        in_flight: &InFlight,
        token: &CancellationToken,
    ) -> Result<()> {
        let tags = self.config.source.tags.as_str();
        let max_failures = self.config.download.max_page_failures;
        let mut page = self.config.source.from_page.max(1);
        let mut failures = 0u32;

        while !token.is_cancelled() {
            if limiter.acquire(token).await.is_err() {
                break;
            }

            tracing::info!("[Main] On page {}", page);
            let posts = match self.source.get_page(page, tags).await {
                Ok(posts) => {
                    failures = 0;
                    posts
                }
                Err(e) => {
                    failures += 1;
                    if max_failures > 0 && failures >= max_failures {
                        tracing::warn!(
                            "[Main] Skipping page {} after {} failed attempts: {}",
                            page,
                            failures,
                            e
                        );
                        failures = 0;
                        page = page.saturating_add(1);
                    } else {
                        tracing::error!("[Main] Failed to fetch page {}: {}", page, e);
                    }
                    continue;
                }
            };

            if posts.is_empty() {
                tracing::info!("[Main] Page {} has no posts", page);
                if self.config.download.stop_on_empty_page {
                    tracing::info!("[Main] Reached the end of the listing. Stopping...");
                    signal_shutdown(token, &self.state);
                    break;
                }
            }

            for post in posts {
                if token.is_cancelled() {
                    tracing::debug!("[Main] Shutdown requested, not submitting the rest of page {}", page);
                    return Ok(());
                }

                in_flight.add();
                if let Err(e) = pool.submit(Job::new(post)).await {
                    in_flight.done();
                    return Err(e.into());
                }
            }

            page = page.saturating_add(1);
        }

        Ok(())
    }
}

/// Cancels `token` and marks a running coordinator as shutting down
fn signal_shutdown(token: &CancellationToken, state: &watch::Sender<RunState>) {
    state.send_if_modified(|state| {
        if *state == RunState::Running {
            *state = RunState::ShuttingDown;
            true
        } else {
            false
        }
    });
    token.cancel();
}

/// Per-job work executed on the pool
struct JobProcessor {
    config: Arc<Config>,
    fetcher: Arc<RetryingFetcher>,
    limiter: RateLimiter,
}

impl JobProcessor {
    async fn process(&self, job: Job) -> JobResult {
        let mut post = job.into_post();
        let name = media_name(post.media_url()).to_string();

        if let Some(reason) = self.skip_reason(post.as_ref()) {
            tracing::info!("[Worker] Skipping {}, {}", name, reason);
            return JobResult::skipped(post.metadata());
        }

        // Jobs already queued still run during a drain, so this wait is not cancellable
        self.limiter.wait().await;

        let directory = self.config.output.directory.as_path();
        if let Err(e) = post.save_media(directory, &self.fetcher).await {
            tracing::warn!("[Worker] Failed to save {}: {}", name, e);
            return JobResult::failed(Some(post.metadata()));
        }

        if !self.config.output.no_metadata {
            if let Err(e) = post.save_metadata(directory).await {
                tracing::warn!("[Worker] Failed to save metadata for {}: {}", name, e);
                return JobResult::failed(Some(post.metadata()));
            }
        }

        JobResult::success(post.metadata())
    }

    fn skip_reason(&self, post: &dyn Post) -> Option<String> {
        let filter = &self.config.filter;

        if filter.only_images && !post.is_image() {
            return Some("it's not an image".to_string());
        }
        if filter.only_videos && !post.is_video() {
            return Some("it's not a video".to_string());
        }
        if self.config.exceeds_file_size_cap(post.size()) {
            return Some(format!(
                "it's too large ({:.02}MB)",
                post.size() as f64 / BYTES_PER_MB
            ));
        }
        None
    }
}

/// Single reader of the result stream
struct ResultConsumer {
    progress: Arc<ProgressTracker>,
    in_flight: InFlight,
    download_limit: Option<u64>,
    token: CancellationToken,
    state: Arc<watch::Sender<RunState>>,
}

impl ResultConsumer {
    async fn run(self, mut results: mpsc::Receiver<JobResult>) {
        while let Some(result) = results.recv().await {
            let volume = self.progress.record(&result);

            match result.info() {
                Some(info) if result.is_success() => {
                    tracing::info!("[Result] {} ({:.02}MB)", info.hash, info.size as f64 / BYTES_PER_MB)
                }
                Some(info) if result.is_failure() => tracing::warn!("[Result] Fail on {}", info.url),
                None => tracing::warn!("[Result] Fail on unknown post"),
                _ => {}
            }

            if let Some(limit) = self.download_limit {
                if result.is_success() && volume >= limit && !self.token.is_cancelled() {
                    tracing::info!("Download limit has been reached. Stopping...");
                    signal_shutdown(&self.token, &self.state);
                }
            }

            self.in_flight.done();
        }

        tracing::debug!("Result stream closed");
    }
}
