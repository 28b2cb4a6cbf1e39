//! Fixed-size worker pool over bounded queues
//!
//! A `WorkerPool<J, R>` runs a processing function on exactly `N` tokio tasks.
//! Jobs flow through a job queue of capacity `N`; every accepted job yields
//! exactly one result on a result queue of capacity `N`.
//!
//! The result queue must be consumed while the pool runs. Workers block on a
//! full result queue, so an unconsumed pool cannot drain.

use crate::state::PoolState;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Contract violations reported by the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("worker pool already started")]
    AlreadyStarted,

    #[error("worker pool not started")]
    NotStarted,

    #[error("worker pool is closed to new jobs")]
    Closed,

    #[error("worker pool results already taken")]
    ResultsTaken,
}

pub struct WorkerPool<J, R> {
    workers: usize,
    state: watch::Sender<PoolState>,
    jobs_tx: Mutex<Option<mpsc::Sender<J>>>,
    jobs_rx: Mutex<Option<mpsc::Receiver<J>>>,
    results_tx: Mutex<Option<mpsc::Sender<R>>>,
    results_rx: Mutex<Option<mpsc::Receiver<R>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<J, R> WorkerPool<J, R>
where
    J: Send + 'static,
    R: Send + 'static,
{
    /// Creates an idle pool with `workers` workers (at least one)
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let (jobs_tx, jobs_rx) = mpsc::channel(workers);
        let (results_tx, results_rx) = mpsc::channel(workers);
        let (state, _) = watch::channel(PoolState::Idle);

        Self {
            workers,
            state,
            jobs_tx: Mutex::new(Some(jobs_tx)),
            jobs_rx: Mutex::new(Some(jobs_rx)),
            results_tx: Mutex::new(Some(results_tx)),
            results_rx: Mutex::new(Some(results_rx)),
            handles: Mutex::new(Vec::with_capacity(workers)),
        }
    }

    pub fn state(&self) -> PoolState {
        *self.state.borrow()
    }

    /// Spawns the workers, each running `process` on the jobs it pulls
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Workers spawned, pool is `Running`
    /// * `Err(PoolError::AlreadyStarted)` - The pool was started before
    /// * `Err(PoolError::Closed)` - The pool was shut down without starting
    pub fn start<F, Fut>(&self, process: F) -> Result<(), PoolError>
    where
        F: Fn(J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let mut outcome = Ok(());
        self.state.send_if_modified(|state| {
            if state.can_transition_to(PoolState::Running) {
                *state = PoolState::Running;
                return true;
            }
            outcome = Err(match *state {
                PoolState::Closed => PoolError::Closed,
                _ => PoolError::AlreadyStarted,
            });
            false
        });
        outcome?;

        let jobs_rx = lock(&self.jobs_rx).take().ok_or(PoolError::AlreadyStarted)?;
        let results_tx = lock(&self.results_tx).take().ok_or(PoolError::Closed)?;

        let jobs_rx = Arc::new(tokio::sync::Mutex::new(jobs_rx));
        let process = Arc::new(process);

        let mut handles = lock(&self.handles);
        for id in 0..self.workers {
            handles.push(tokio::spawn(worker_loop(
                id,
                Arc::clone(&jobs_rx),
                results_tx.clone(),
                Arc::clone(&process),
            )));
        }

        tracing::debug!("Started worker pool with {} workers", self.workers);
        Ok(())
    }

    /// Enqueues a job, waiting while the job queue is full
    pub async fn submit(&self, job: J) -> Result<(), PoolError> {
        let state = self.state();
        match state {
            PoolState::Idle => return Err(PoolError::NotStarted),
            PoolState::Running => {}
            PoolState::Draining | PoolState::Closed => return Err(PoolError::Closed),
        }

        let sender = lock(&self.jobs_tx).clone().ok_or(PoolError::Closed)?;
        sender.send(job).await.map_err(|_| PoolError::Closed)
    }

    /// Takes the result stream
    ///
    /// Results arrive in completion order. The stream ends once the pool is
    /// shut down and every worker has exited. It can be taken only once.
    pub fn results(&self) -> Result<mpsc::Receiver<R>, PoolError> {
        lock(&self.results_rx).take().ok_or(PoolError::ResultsTaken)
    }

    /// Stops accepting jobs and waits for every accepted job to finish
    ///
    /// Returns once all workers have exited and their results are queued for
    /// the consumer. Concurrent and repeated calls wait for the same drain.
    pub async fn shutdown(&self) {
        let mut previous = PoolState::Closed;
        self.state.send_if_modified(|state| {
            previous = *state;
            match *state {
                PoolState::Idle => *state = PoolState::Closed,
                PoolState::Running => *state = PoolState::Draining,
                PoolState::Draining | PoolState::Closed => return false,
            }
            true
        });

        match previous {
            PoolState::Idle => {
                lock(&self.jobs_tx).take();
                lock(&self.jobs_rx).take();
                lock(&self.results_tx).take();
                tracing::debug!("Closed worker pool that was never started");
            }
            PoolState::Running => {
                // Closing the job queue lets workers exit once it is empty
                lock(&self.jobs_tx).take();

                let handles = std::mem::take(&mut *lock(&self.handles));
                for handle in handles {
                    if let Err(e) = handle.await {
                        tracing::error!("Worker task ended abnormally: {}", e);
                    }
                }

                self.state.send_replace(PoolState::Closed);
                tracing::debug!("Worker pool drained");
            }
            PoolState::Draining | PoolState::Closed => {
                let mut rx = self.state.subscribe();
                let _ = rx.wait_for(|state| *state == PoolState::Closed).await;
            }
        }
    }
}

async fn worker_loop<J, R, F, Fut>(
    id: usize,
    jobs: Arc<tokio::sync::Mutex<mpsc::Receiver<J>>>,
    results: mpsc::Sender<R>,
    process: Arc<F>,
) where
    F: Fn(J) -> Fut,
    Fut: Future<Output = R>,
{
    loop {
        let job = jobs.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };

        let result = process(job).await;
        if results.send(result).await.is_err() {
            tracing::warn!("[Worker {}] Result stream dropped, discarding result", id);
        }
    }

    tracing::trace!("[Worker {}] Exiting", id);
}
