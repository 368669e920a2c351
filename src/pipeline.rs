use std::path::PathBuf;

use tracing::{error, info, instrument, Span};

use crate::fetch_error::FetchError;
use crate::fetcher::{ChromeExportDriver, ExportDriver, ReportFetcher};
use crate::importers::{load_report, CsvImporter, LoadError};
use crate::report::DEFAULT_SORT_KEY;
use crate::services::{ReportUploader, UploadError, UploadSummary};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Fetch stage failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Load stage failed: {0}")]
    Load(#[from] LoadError),

    #[error("Upload stage failed: {0}")]
    Upload(#[from] UploadError),

    #[error("Loader task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// How a pipeline run ended without an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Uploaded(UploadSummary),
    /// The CSV was not where expected; nothing was uploaded
    SourceMissing(PathBuf),
}

/// Optional fetch, then load and upload of the exported report
pub struct Pipeline<U, D = ChromeExportDriver> {
    csv_path: PathBuf,
    sort_key: String,
    delimiter: u8,
    fetcher: Option<ReportFetcher<D>>,
    uploader: U,
}

impl<U: ReportUploader> Pipeline<U> {
    pub fn new(csv_path: impl Into<PathBuf>, uploader: U) -> Self {
        Self {
            csv_path: csv_path.into(),
            sort_key: DEFAULT_SORT_KEY.to_string(),
            delimiter: b',',
            fetcher: None,
            uploader,
        }
    }
}

impl<U: ReportUploader, D: ExportDriver> Pipeline<U, D> {
    /// Run the fetch stage before loading
    pub fn with_fetcher<E: ExportDriver>(self, fetcher: ReportFetcher<E>) -> Pipeline<U, E> {
        Pipeline {
            csv_path: self.csv_path,
            sort_key: self.sort_key,
            delimiter: self.delimiter,
            fetcher: Some(fetcher),
            uploader: self.uploader,
        }
    }

    pub fn with_sort_key(mut self, sort_key: impl Into<String>) -> Self {
        self.sort_key = sort_key.into();
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn uploader(&self) -> &U {
        &self.uploader
    }

    #[instrument(skip(self), fields(csv_path = %self.csv_path.display()))]
    pub async fn run(&self) -> Result<PipelineOutcome, PipelineError> {
        info!("Script started.");

        if let Some(fetcher) = &self.fetcher {
            fetcher.fetch().await?;
        }

        if !self.csv_path.exists() {
            error!("CSV file not found at path: {}", self.csv_path.display());
            return Ok(PipelineOutcome::SourceMissing(self.csv_path.clone()));
        }
        info!("CSV file found. Proceeding to append to Google Sheets.");

        let importer = CsvImporter::new(&self.csv_path).with_delimiter(self.delimiter);
        let sort_key = self.sort_key.clone();
        let span = Span::current();
        let table = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            load_report(&importer, &sort_key)
        })
        .await??;

        let summary = self.uploader.upload_report(&table).await?;
        info!(
            rows = summary.rows_appended,
            batches = summary.batches_appended,
            "Pipeline finished"
        );
        Ok(PipelineOutcome::Uploaded(summary))
    }
}
