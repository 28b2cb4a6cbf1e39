//! Throughput and cumulative totals derived from the result stream
//!
//! The tracker is fed only by the result consumer. Snapshots may be taken
//! from any task; each snapshot closes the current speed sample, so the
//! reported speed covers the time since the previous snapshot.

use super::job::JobResult;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

const BYTES_PER_KB: f64 = 1024.0;
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Read-only view of a run's progress
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Successful results
    pub downloaded: u64,
    /// All consumed results
    pub total: u64,
    /// Results filtered out
    pub skipped: u64,
    /// Results that failed after admission
    pub failed: u64,
    /// Bytes per second since the previous snapshot
    pub speed_bps: f64,
    /// Bytes saved by successful results
    pub downloaded_bytes: u64,
    /// Wall-clock start of the run, if one has started
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed: Duration,
}

impl Progress {
    pub fn speed_kbps(&self) -> f64 {
        self.speed_bps / BYTES_PER_KB
    }

    pub fn downloaded_gb(&self) -> f64 {
        self.downloaded_bytes as f64 / BYTES_PER_GB
    }
}

#[derive(Debug)]
struct Inner {
    downloaded: u64,
    total: u64,
    skipped: u64,
    failed: u64,
    downloaded_bytes: u64,
    started_at: Option<DateTime<Utc>>,
    started: Instant,
    sample_start: Instant,
    sample_bytes: u64,
}

impl Inner {
    fn fresh(started_at: Option<DateTime<Utc>>) -> Self {
        let now = Instant::now();
        Self {
            downloaded: 0,
            total: 0,
            skipped: 0,
            failed: 0,
            downloaded_bytes: 0,
            started_at,
            started: now,
            sample_start: now,
            sample_bytes: 0,
        }
    }
}

#[derive(Debug)]
pub struct ProgressTracker {
    inner: Mutex<Inner>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::fresh(None)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Zeroes every counter and restarts both clocks
    pub fn reset(&self) {
        *self.lock() = Inner::fresh(Some(Utc::now()));
    }

    /// Accounts for one consumed result
    ///
    /// # Returns
    ///
    /// Cumulative downloaded bytes after this result
    pub fn record(&self, result: &JobResult) -> u64 {
        let mut inner = self.lock();
        inner.total += 1;

        if result.is_success() {
            let size = result.size();
            inner.downloaded += 1;
            inner.downloaded_bytes += size;
            inner.sample_bytes += size;
        } else if result.is_skip() {
            inner.skipped += 1;
        } else {
            inner.failed += 1;
        }

        inner.downloaded_bytes
    }

    /// Takes a snapshot and starts a new speed sample
    pub fn snapshot(&self) -> Progress {
        let mut inner = self.lock();
        let now = Instant::now();

        let window = now.duration_since(inner.sample_start).as_secs_f64();
        let speed_bps = if window > 0.0 {
            inner.sample_bytes as f64 / window
        } else {
            0.0
        };
        inner.sample_bytes = 0;
        inner.sample_start = now;

        Progress {
            downloaded: inner.downloaded,
            total: inner.total,
            skipped: inner.skipped,
            failed: inner.failed,
            speed_bps,
            downloaded_bytes: inner.downloaded_bytes,
            started_at: inner.started_at,
            elapsed: now.duration_since(inner.started),
        }
    }
}
