//! Output module for presenting run progress and summaries
//!
//! This module handles:
//! - The start-up banner
//! - The periodic one-line progress report
//! - The end-of-run summary

pub mod stats;

pub use stats::{format_progress_line, format_summary, print_banner, print_summary};
