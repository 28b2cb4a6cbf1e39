//! State module for tracking pipeline lifecycles
//!
//! This module provides the lifecycle states of a download run and of the
//! worker pool that serves it.
//!
//! # Components
//!
//! - `RunState`: Lifecycle of one coordinator run (stopped, running, shutting down)
//! - `PoolState`: Lifecycle of a worker pool (idle, running, draining, closed)

mod run_state;

// Re-export main types
pub use run_state::{PoolState, RunState};
