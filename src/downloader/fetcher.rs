//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the downloader, including:
//! - Building the shared HTTP client (user agent, timeouts, proxy)
//! - Retrying transient failures with quadratic backoff
//! - Reading whole response bodies for listings and media
//!
//! # Retry Logic
//!
//! | Condition | Action |
//! |-----------|--------|
//! | Status < 500 | Final, returned as-is |
//! | Status >= 500 | Retry |
//! | Transport error (connect, timeout, reset) | Retry |
//! | Malformed request (bad URL) | Final, no retry |
//!
//! Attempt `k` (zero-based) that fails is followed by a sleep of `k² × unit`
//! before attempt `k + 1`, up to `max_retries` retries.

use crate::config::{Config, SourceConfig};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use thiserror::Error;

/// Error from a fetch whose retries are exhausted or that cannot be retried
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, timeout or body read failure on the final attempt
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Final response carried an unexpected status
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Request could not be built
    #[error("invalid request: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    /// Status code of the final response, if one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether another attempt could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::Client(_) => false,
        }
    }
}

/// Fully read response body
#[derive(Debug, Clone)]
pub struct Contents {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

/// Builds the HTTP client shared by listings and media downloads
///
/// # Arguments
///
/// * `config` - The source configuration (user agent, optional proxy)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Invalid proxy or TLS backend failure
pub fn build_http_client(config: &SourceConfig) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = &config.proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy.as_str())?);
    }

    builder.build()
}

/// HTTP GET with bounded retries
#[derive(Debug, Clone)]
pub struct RetryingFetcher {
    client: Client,
    max_retries: u32,
    backoff_unit: Duration,
}

impl RetryingFetcher {
    pub fn new(client: Client, max_retries: u32, backoff_unit: Duration) -> Self {
        Self {
            client,
            max_retries,
            backoff_unit,
        }
    }

    /// Builds the client and retry policy from the run configuration
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let client = build_http_client(&config.source)?;
        Ok(Self::new(
            client,
            config.download.max_retries,
            config.retry_backoff(),
        ))
    }

    /// Delay after failed attempt `attempt` (zero-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt.saturating_mul(attempt))
    }

    /// Performs a GET, retrying 5xx statuses and transport errors
    ///
    /// Any response with a status below 500 is returned to the caller
    /// without further interpretation.
    pub async fn fetch(&self, url: &str) -> Result<Response, FetchError> {
        let mut attempt = 0;

        loop {
            let error = match self.client.get(url).send().await {
                Ok(response) if response.status().as_u16() < 500 => return Ok(response),
                Ok(response) => FetchError::Status {
                    url: url.to_string(),
                    status: response.status().as_u16(),
                },
                Err(e) if e.is_builder() => return Err(FetchError::Client(e)),
                Err(e) => FetchError::Transport {
                    url: url.to_string(),
                    source: e,
                },
            };

            if attempt >= self.max_retries {
                tracing::debug!("Giving up on {} after {} attempts", url, attempt + 1);
                return Err(error);
            }

            let delay = self.backoff_for(attempt);
            tracing::debug!(
                "Attempt {} for {} failed ({}), retrying in {:?}",
                attempt + 1,
                url,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Fetches `url` and reads the whole body
    ///
    /// A final status other than 200 is reported as [`FetchError::Status`].
    pub async fn get_contents(&self, url: &str) -> Result<Contents, FetchError> {
        let response = self.fetch(url).await?;

        if response.status() != StatusCode::OK {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                source: e,
            })?;

        Ok(Contents {
            body: body.to_vec(),
            content_type,
        })
    }
}
