use std::env;
use std::fs::OpenOptions;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use report_sync::checkpoint::CheckpointStore;
use report_sync::config::Config;
use report_sync::fetcher::{ChromeExportDriver, ReportFetcher};
use report_sync::pipeline::{Pipeline, PipelineOutcome};
use report_sync::services::{BatchUploader, UploadService};

#[derive(Parser, Debug)]
#[command(name = "report-sync")]
#[command(about = "Export the web report to CSV and append it to a Google spreadsheet", long_about = None)]
struct Cli {
    /// Run the browser export before loading the CSV (overrides RUN_FETCH)
    #[arg(long)]
    fetch: bool,

    /// Skip the browser export even when RUN_FETCH is set
    #[arg(long, conflicts_with = "fetch")]
    no_fetch: bool,

    /// Rows per append request (overrides UPLOAD_BATCH_SIZE)
    #[arg(long)]
    batch_size: Option<NonZeroUsize>,

    /// Show a progress bar while uploading
    #[arg(long, env = "UPLOAD_PROGRESS")]
    progress: bool,

    /// Env file loaded before configuration is read
    #[arg(long, env = "REPORT_SYNC_ENV_FILE", default_value = ".env")]
    env_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load environment variables
    dotenvy::from_path(&cli.env_file).ok();

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(Config::log_file_from_lookup(|key| env::var(key).ok()))?;

    // Console plus the append-only log file, with environment filter support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,report_sync=debug")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .init();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Critical error in main script: invalid configuration: {}", e);
            return Err(e.into());
        }
    };
    if cli.fetch {
        config.run_fetch = true;
    }
    if cli.no_fetch {
        config.run_fetch = false;
    }
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = batch_size;
    }

    info!("Starting report-sync with config: {:?}", config);

    match run(&config, cli.progress).await {
        Ok(PipelineOutcome::Uploaded(summary)) => {
            info!(
                "Done: {} rows appended in {} batches ({} batches resumed from checkpoint)",
                summary.rows_appended, summary.batches_appended, summary.batches_skipped
            );
            Ok(())
        }
        Ok(PipelineOutcome::SourceMissing(path)) => {
            eprintln!("File not found: {}", path.display());
            Ok(())
        }
        Err(e) => {
            error!("Critical error in main script: {}", e);
            Err(e.into())
        }
    }
}

#[instrument(skip(config), fields(run_fetch = config.run_fetch))]
async fn run(
    config: &Config,
    show_progress: bool,
) -> Result<PipelineOutcome, report_sync::pipeline::PipelineError> {
    let mut uploader = BatchUploader::new(config.batch_size).with_progress(show_progress);
    if let Some(path) = &config.checkpoint_path {
        uploader = uploader.with_checkpoint(CheckpointStore::new(path));
    }
    let service = UploadService::new(config.upload_settings(), uploader);

    let pipeline = Pipeline::new(config.csv_path(), service)
        .with_sort_key(&config.sort_key)
        .with_delimiter(config.csv_delimiter);

    if config.run_fetch {
        // The DevTools connection stays quiet while the download runs
        let idle_timeout =
            Duration::from_secs(config.element_timeout_secs + config.download_timeout_secs + 30);
        let driver = ChromeExportDriver::new(config.browser_headless, config.browser_sandbox)
            .with_idle_timeout(idle_timeout);
        let fetcher = ReportFetcher::new(driver, config.fetch_settings());
        pipeline.with_fetcher(fetcher).run().await
    } else {
        pipeline.run().await
    }
}
