//! Booru-Harvester: a polite bulk downloader for booru image boards
//!
//! This crate pages through a booru's post listings and downloads the media
//! behind every post, while bounding concurrency and request rate and
//! draining cleanly on interruption.

pub mod booru;
pub mod config;
pub mod downloader;
pub mod output;
pub mod state;

use thiserror::Error;

/// Main error type for Booru-Harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] downloader::FetchError),

    #[error("Worker pool error: {0}")]
    Pool(#[from] downloader::PoolError),

    #[error("Booru error: {0}")]
    Booru(#[from] booru::BooruError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("A run is already in progress")]
    AlreadyRunning,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Booru-Harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Version string printed in the banner and by `--version`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export commonly used types
pub use config::Config;
pub use downloader::{Coordinator, Progress};
pub use state::{PoolState, RunState};
