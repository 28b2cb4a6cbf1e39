/// Lifecycle state definitions for the download pipeline
///
/// Both state machines only ever move forward; the only way back to the
/// start is a fresh run, which builds a fresh pool.
use std::fmt;

/// Represents the lifecycle of a coordinator run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    /// No run in progress
    Stopped,

    /// The pagination loop is discovering and submitting jobs
    Running,

    /// Shutdown requested: no new jobs, in-flight jobs are draining
    ShuttingDown,
}

impl RunState {
    /// Returns true if the transition `self -> next` is allowed
    ///
    /// Allowed: Stopped -> Running -> ShuttingDown -> Stopped, plus
    /// Running -> Stopped for a run that ends without a shutdown request.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        matches!(
            (self, next),
            (Self::Stopped, Self::Running)
                | (Self::Running, Self::ShuttingDown)
                | (Self::Running, Self::Stopped)
                | (Self::ShuttingDown, Self::Stopped)
        )
    }

    /// Returns true while a run exists (running or draining)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::ShuttingDown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Represents the lifecycle of a worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolState {
    /// Created, workers not yet spawned
    Idle,

    /// Workers are consuming jobs
    Running,

    /// No more submissions; workers finish the queued jobs and exit
    Draining,

    /// All workers exited and the result stream is closed
    Closed,
}

impl PoolState {
    /// Returns true if the pool still accepts submissions
    pub fn accepts_jobs(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns true if the transition `self -> next` is allowed
    pub fn can_transition_to(&self, next: PoolState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Idle, Self::Closed)
                | (Self::Running, Self::Draining)
                | (Self::Draining, Self::Closed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
