//! Progress and summary formatting
//!
//! These are the only places the library writes to stdout.

use crate::config::Config;
use crate::downloader::Progress;
use crate::VERSION;

/// Prints the start-up banner
pub fn print_banner(config: &Config) {
    println!("booru-harvester {}", VERSION);
    println!("  Source: {}", config.source.url);
    if !config.source.tags.is_empty() {
        println!("  Tags: {}", config.source.tags);
    }
    println!(
        "  Workers: {}, starting at page {}",
        config.download.workers, config.source.from_page
    );
    println!("  Output: {}", config.output.directory.display());
    println!();
}

/// One-line progress report: downloaded/total, speed and volume
///
/// # Example
///
/// ```
/// use booru_harvester::output::format_progress_line;
/// use booru_harvester::Progress;
/// use std::time::Duration;
///
/// let progress = Progress {
///     downloaded: 3,
///     total: 4,
///     skipped: 1,
///     failed: 0,
///     speed_bps: 2048.0,
///     downloaded_bytes: 0,
///     started_at: None,
///     elapsed: Duration::from_secs(2),
/// };
/// assert_eq!(
///     format_progress_line(&progress),
///     "Downloaded 3/4 | 2.00 KB/s | 0.000 GB"
/// );
/// ```
pub fn format_progress_line(progress: &Progress) -> String {
    format!(
        "Downloaded {}/{} | {:.2} KB/s | {:.3} GB",
        progress.downloaded,
        progress.total,
        progress.speed_kbps(),
        progress.downloaded_gb()
    )
}

/// Multi-line end-of-run summary
pub fn format_summary(progress: &Progress) -> String {
    let mut lines = vec![
        "=== Run Summary ===".to_string(),
        format!("  Posts processed: {}", progress.total),
        format!("  Downloaded: {}", progress.downloaded),
        format!("  Skipped: {}", progress.skipped),
        format!("  Failed: {}", progress.failed),
        format!("  Volume: {:.3} GB", progress.downloaded_gb()),
    ];

    if let Some(started_at) = progress.started_at {
        lines.push(format!(
            "  Started: {}",
            started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }

    let secs = progress.elapsed.as_secs_f64();
    lines.push(format!("  Elapsed: {:.1}s", secs));
    if secs > 0.0 {
        let average_kbps = progress.downloaded_bytes as f64 / secs / 1024.0;
        lines.push(format!("  Average speed: {:.2} KB/s", average_kbps));
    }

    lines.join("\n")
}

pub fn print_summary(progress: &Progress) {
    println!();
    println!("{}", format_summary(progress));
}
