//! Booru-Harvester main entry point
//!
//! This is the command-line interface for the Booru-Harvester bulk downloader.

use anyhow::Context;
use booru_harvester::config::{finalize, load_config_with_hash, Config};
use booru_harvester::output::{format_progress_line, print_banner, print_summary};
use booru_harvester::Coordinator;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Booru-Harvester: a polite bulk downloader for booru image boards
///
/// Pages through a booru's post listings and downloads every post's media
/// with a fixed number of workers and a shared request rate. Ctrl-C stops
/// paging and waits for downloads already under way.
#[derive(Parser, Debug)]
#[command(name = "booru-harvester")]
#[command(version)]
#[command(about = "A polite bulk downloader for booru image boards", long_about = None)]
struct Cli {
    /// Path to an optional TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Booru to download from
    #[arg(long)]
    url: Option<String>,

    /// Proxy for every request (http, https, socks5 or socks5h)
    #[arg(long)]
    proxy: Option<String>,

    /// Number of download workers
    #[arg(short, long)]
    workers: Option<u32>,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Suppress the banner, progress line and all non-error logging
    #[arg(long)]
    silent: bool,

    /// Retries for a failed request
    #[arg(long)]
    max_retries: Option<u32>,

    /// Download images only
    #[arg(long, conflicts_with = "only_videos")]
    only_images: bool,

    /// Download videos only
    #[arg(long)]
    only_videos: bool,

    /// Tags to search for
    #[arg(short, long)]
    tags: Option<String>,

    /// Listing page to start from
    #[arg(long)]
    from_page: Option<u32>,

    /// Skip files larger than this many MB (0 = no limit)
    #[arg(long)]
    max_filesize_mb: Option<u64>,

    /// Stop after downloading this many GB (0 = no limit)
    #[arg(long)]
    download_limit_gb: Option<f64>,

    /// Do not write metadata files
    #[arg(long)]
    no_metadata: bool,

    /// Move past a listing page after this many failures (0 = retry forever)
    #[arg(long)]
    max_page_failures: Option<u32>,

    /// Stop when a listing page comes back empty
    #[arg(long)]
    stop_on_empty_page: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Print the resolved configuration and exit
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    /// Applies command-line values on top of `config`
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(url) = &self.url {
            config.source.url = url.clone();
        }
        if let Some(proxy) = &self.proxy {
            config.source.proxy = Some(proxy.clone());
        }
        if let Some(tags) = &self.tags {
            config.source.tags = tags.clone();
        }
        if let Some(from_page) = self.from_page {
            config.source.from_page = from_page;
        }
        if let Some(workers) = self.workers {
            config.download.workers = workers;
        }
        if let Some(max_retries) = self.max_retries {
            config.download.max_retries = max_retries;
        }
        if let Some(max_page_failures) = self.max_page_failures {
            config.download.max_page_failures = max_page_failures;
        }
        if let Some(max_filesize_mb) = self.max_filesize_mb {
            config.filter.max_filesize_mb = max_filesize_mb;
        }
        if let Some(download_limit_gb) = self.download_limit_gb {
            config.filter.download_limit_gb = download_limit_gb;
        }
        if let Some(output) = &self.output {
            config.output.directory = output.clone();
        }

        // Switches only ever turn a setting on
        config.download.stop_on_empty_page |= self.stop_on_empty_page;
        config.filter.only_images |= self.only_images;
        config.filter.only_videos |= self.only_videos;
        config.output.no_metadata |= self.no_metadata;
        config.output.silent |= self.silent;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut config, config_hash) = match &cli.config {
        Some(path) => {
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            (config, Some(hash))
        }
        None => (Config::default(), None),
    };
    cli.apply_overrides(&mut config);
    finalize(&mut config).context("Invalid configuration")?;

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet || config.output.silent);

    if let Some(hash) = config_hash {
        tracing::info!("Configuration loaded (hash: {})", hash);
    }

    if cli.dry_run {
        return handle_dry_run(&config);
    }

    handle_run(config).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("booru_harvester=info,warn"),
            1 => EnvFilter::new("booru_harvester=debug,info"),
            2 => EnvFilter::new("booru_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the resolved configuration
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Booru-Harvester Dry Run ===\n");

    println!("Source:");
    println!("  URL: {}", config.source.url);
    println!("  Tags: {}", config.source.tags);
    println!("  From page: {}", config.source.from_page);
    println!(
        "  Proxy: {}",
        config.source.proxy.as_deref().unwrap_or("none")
    );

    println!("\nDownload:");
    println!("  Workers: {}", config.download.workers);
    println!("  Max retries: {}", config.download.max_retries);
    println!("  Request interval: {}ms", config.download.rate_interval_ms);
    println!("  Max page failures: {}", config.download.max_page_failures);

    println!("\nFilters:");
    println!("  Only images: {}", config.filter.only_images);
    println!("  Only videos: {}", config.filter.only_videos);
    println!("  Max file size: {} MB", config.filter.max_filesize_mb);
    println!("  Download limit: {} GB", config.filter.download_limit_gb);

    println!("\nOutput:");
    println!("  Directory: {}", config.output.directory.display());
    println!("  Metadata: {}", !config.output.no_metadata);

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the main download run
async fn handle_run(config: Config) -> anyhow::Result<()> {
    let silent = config.output.silent;
    if !silent {
        print_banner(&config);
    }

    tokio::fs::create_dir_all(&config.output.directory)
        .await
        .with_context(|| {
            format!(
                "Failed to create output directory {}",
                config.output.directory.display()
            )
        })?;

    let progress_interval = config.progress_interval();
    let coordinator = Arc::new(Coordinator::from_config(config)?);

    let signals = tokio::spawn(forward_signals(Arc::clone(&coordinator)));
    let ticker = match progress_interval {
        Some(interval) if !silent => Some(tokio::spawn(report_progress(
            Arc::clone(&coordinator),
            interval,
        ))),
        _ => None,
    };

    let outcome = coordinator.run().await;

    signals.abort();
    if let Some(ticker) = ticker {
        ticker.abort();
    }

    match outcome {
        Ok(progress) => {
            if !silent {
                print_summary(&progress);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            Err(e.into())
        }
    }
}

/// Turns Ctrl-C or SIGTERM into a shutdown request
///
/// Every signal is forwarded. The run drains on its own; the process exits
/// once `run` returns.
async fn forward_signals(coordinator: Arc<Coordinator>) {
    let mut received = 0u32;
    loop {
        if let Err(e) = shutdown_signal().await {
            tracing::error!("Failed to listen for shutdown signals: {}", e);
            return;
        }

        received += 1;
        if received == 1 {
            tracing::info!("Received shutdown signal, finishing downloads in progress...");
        } else {
            tracing::warn!("Already shutting down, waiting for downloads in progress");
        }
        coordinator.request_shutdown();
    }
}

async fn shutdown_signal() -> std::io::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let terminate = terminate.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        result = ctrl_c => result,
        _ = terminate => Ok(()),
    }
}

/// Prints a progress line every `interval` while the run is active
async fn report_progress(coordinator: Arc<Coordinator>, interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if coordinator.is_running() {
            println!("{}", format_progress_line(&coordinator.progress()));
        }
    }
}
