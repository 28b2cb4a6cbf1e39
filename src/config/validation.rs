use crate::config::types::{Config, DownloadConfig, FilterConfig, OutputConfig, SourceConfig};
use crate::config::types::DEFAULT_OUTPUT_DIR;
use crate::ConfigError;
use std::path::PathBuf;
use url::Url;

/// Upper bound on the worker count
pub const MAX_WORKERS: u32 = 256;

/// Normalises values that have a documented fallback
///
/// - `from-page = 0` becomes 1
/// - a blank output directory becomes `output`
/// - a blank proxy string becomes no proxy
pub fn normalize(config: &mut Config) {
    if config.source.from_page == 0 {
        config.source.from_page = 1;
    }

    if config.output.directory.as_os_str().to_string_lossy().trim().is_empty() {
        config.output.directory = PathBuf::from(DEFAULT_OUTPUT_DIR);
    }

    if let Some(proxy) = &config.source.proxy {
        if proxy.trim().is_empty() {
            config.source.proxy = None;
        }
    }
}

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_source_config(&config.source)?;
    validate_download_config(&config.download)?;
    validate_filter_config(&config.filter)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the listing source configuration
fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.url)
        .map_err(|e| ConfigError::InvalidUrl(format!("{} is not a valid URL: {}", config.url, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "{} must use the http or https scheme",
            config.url
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!("{} has no host", config.url)));
    }

    if let Some(proxy) = &config.proxy {
        validate_proxy(proxy)?;
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates a proxy connection string
fn validate_proxy(proxy: &str) -> Result<(), ConfigError> {
    let url = Url::parse(proxy)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;

    match url.scheme() {
        "http" | "https" | "socks5" | "socks5h" => Ok(()),
        other => Err(ConfigError::Validation(format!(
            "Proxy type not supported: {}",
            other
        ))),
    }
}

/// Validates concurrency and retry configuration
fn validate_download_config(config: &DownloadConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and {}, got {}",
            MAX_WORKERS, config.workers
        )));
    }

    if config.rate_interval_ms < 1 {
        return Err(ConfigError::Validation(
            "rate-interval-ms must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates media filters and volume caps
fn validate_filter_config(config: &FilterConfig) -> Result<(), ConfigError> {
    if config.only_images && config.only_videos {
        return Err(ConfigError::Validation(
            "only-images and only-videos cannot both be set".to_string(),
        ));
    }

    if !config.download_limit_gb.is_finite() || config.download_limit_gb < 0.0 {
        return Err(ConfigError::Validation(format!(
            "download-limit-gb must be a non-negative number, got {}",
            config.download_limit_gb
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.directory.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    Ok(())
}
