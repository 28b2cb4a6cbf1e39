use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default booru the harvester pages through
pub const DEFAULT_BOORU_URL: &str = "https://danbooru.donmai.us/";

/// Default output directory name
pub const DEFAULT_OUTPUT_DIR: &str = "output";

const BYTES_PER_MIB: u64 = 1024 * 1024;
const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Main configuration structure for Booru-Harvester
///
/// Every key is optional; a missing key takes the same default as the
/// corresponding command-line flag.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub download: DownloadConfig,
    pub filter: FilterConfig,
    pub output: OutputConfig,
}

/// Where posts are listed from
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SourceConfig {
    /// Base URL of the booru
    pub url: String,

    /// Tag query passed verbatim to the listing endpoint
    pub tags: String,

    /// First listing page to fetch (0 is treated as 1)
    pub from_page: u32,

    /// Optional proxy (http, https, socks5 or socks5h)
    pub proxy: Option<String>,

    /// User-Agent header sent with every request
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BOORU_URL.to_string(),
            tags: String::new(),
            from_page: 1,
            proxy: None,
            user_agent: format!("booru-harvester/{}", crate::VERSION),
        }
    }
}

/// Concurrency, rate and retry behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DownloadConfig {
    /// Number of concurrent workers (also the rate limiter's burst size)
    pub workers: u32,

    /// Retries after the first attempt for transient failures
    pub max_retries: u32,

    /// Backoff time unit; attempt k waits k² units before attempt k+1
    pub retry_backoff_ms: u64,

    /// One request token is added every interval
    pub rate_interval_ms: u64,

    /// Consecutive failures after which a listing page is skipped (0 = never skip)
    pub max_page_failures: u32,

    /// Request shutdown when a listing page comes back empty
    pub stop_on_empty_page: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            max_retries: 3,
            retry_backoff_ms: 1000,
            rate_interval_ms: 1000,
            max_page_failures: 0,
            stop_on_empty_page: false,
        }
    }
}

/// Which posts are downloaded and how much in total
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FilterConfig {
    /// Save only images
    pub only_images: bool,

    /// Save only videos
    pub only_videos: bool,

    /// Per-file size cap in megabytes (0 = no cap)
    pub max_filesize_mb: u64,

    /// Stop after this many gigabytes were downloaded (0 = no cap)
    pub download_limit_gb: f64,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Directory media and metadata files are written to
    pub directory: PathBuf,

    /// Do not write `<hash>_metadata.json` files
    pub no_metadata: bool,

    /// Output nothing to the console
    pub silent: bool,

    /// How often the progress line is printed (0 = never)
    pub progress_interval_ms: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_OUTPUT_DIR),
            no_metadata: false,
            silent: false,
            progress_interval_ms: 1000,
        }
    }
}

impl Config {
    /// Number of workers as a `usize`
    pub fn worker_count(&self) -> usize {
        self.download.workers as usize
    }

    /// Interval at which the rate limiter refills one token
    pub fn rate_interval(&self) -> Duration {
        Duration::from_millis(self.download.rate_interval_ms)
    }

    /// Backoff time unit for retried requests
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.download.retry_backoff_ms)
    }

    /// Whether a file of `size` bytes is over the per-file cap
    ///
    /// The size is compared in whole MiB, rounded down, so a 2.5 MiB file
    /// passes a 2 MiB cap. A cap of 0 means no limit.
    pub fn exceeds_file_size_cap(&self, size: u64) -> bool {
        match self.filter.max_filesize_mb {
            0 => false,
            max_mb => size / BYTES_PER_MIB > max_mb,
        }
    }

    /// Cumulative volume cap in bytes, `None` when uncapped
    pub fn download_limit_bytes(&self) -> Option<u64> {
        if self.filter.download_limit_gb > 0.0 {
            Some((self.filter.download_limit_gb * BYTES_PER_GIB) as u64)
        } else {
            None
        }
    }

    /// Interval of the periodic progress line, `None` when disabled
    pub fn progress_interval(&self) -> Option<Duration> {
        match self.output.progress_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_cli_defaults() {
        let config = Config::default();

        assert_eq!(config.source.url, DEFAULT_BOORU_URL);
        assert_eq!(config.source.from_page, 1);
        assert_eq!(config.download.workers, 8);
        assert_eq!(config.download.max_retries, 3);
        assert_eq!(config.output.directory, PathBuf::from("output"));
        assert!(!config.exceeds_file_size_cap(u64::MAX));
        assert!(config.download_limit_bytes().is_none());
    }

    #[test]
    fn test_size_caps() {
        let mut config = Config::default();
        config.filter.max_filesize_mb = 2;
        config.filter.download_limit_gb = 1.0;

        assert!(!config.exceeds_file_size_cap(2 * 1024 * 1024));
        assert!(!config.exceeds_file_size_cap(5 * 1024 * 1024 / 2));
        assert!(config.exceeds_file_size_cap(3 * 1024 * 1024));
        assert_eq!(config.download_limit_bytes(), Some(1024 * 1024 * 1024));
    }

    #[test]
    fn test_progress_interval_zero_disables() {
        let mut config = Config::default();
        config.output.progress_interval_ms = 0;
        assert!(config.progress_interval().is_none());
    }
}
