//! Configuration module for Booru-Harvester
//!
//! This module handles loading, parsing, normalising and validating TOML
//! configuration files. Command-line flags are applied on top of the loaded
//! values by the binary, which then calls [`finalize`] again.
//!
//! # Example
//!
//! ```no_run
//! use booru_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvester.toml")).unwrap();
//! println!("Harvesting with {} workers", config.download.workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, DownloadConfig, FilterConfig, OutputConfig, SourceConfig, DEFAULT_BOORU_URL,
    DEFAULT_OUTPUT_DIR,
};

// Re-export parser functions
pub use parser::{compute_config_hash, finalize, load_config, load_config_with_hash, parse_config};
pub use validation::MAX_WORKERS;
