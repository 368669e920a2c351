use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::checkpoint::{CheckpointError, CheckpointStore, UploadCheckpoint};
use crate::report::{ReportRow, ReportTable, DEFAULT_BATCH_SIZE};
use crate::sheets::{
    ServiceAccountAuth, ServiceAccountKey, SheetsClient, SheetsEndpoints, SheetsError,
    ValueInputOption, Worksheet, DRIVE_SCOPE, SPREADSHEETS_SCOPE,
};

/// Error types for spreadsheet upload operations
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Authentication failed: {0}")]
    Auth(#[source] SheetsError),

    #[error("Failed to open spreadsheet '{name}': {source}")]
    Resolve {
        name: String,
        #[source]
        source: SheetsError,
    },

    #[error("Batch {batch} of {total} failed after {committed} batches ({rows_committed} rows) were appended: {source}")]
    Batch {
        batch: usize,
        total: usize,
        committed: usize,
        rows_committed: usize,
        #[source]
        source: SheetsError,
    },

    #[error("Batch {batch} of {total} was appended but the checkpoint could not be saved ({committed} batches, {rows_committed} rows appended): {source}")]
    CheckpointAfterBatch {
        batch: usize,
        total: usize,
        committed: usize,
        rows_committed: usize,
        #[source]
        source: CheckpointError,
    },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Destination that accepts rows in append order
#[allow(async_fn_in_trait)]
pub trait RowSink {
    async fn append_rows(&self, rows: &[Vec<Value>]) -> Result<(), SheetsError>;
}

/// Appends to one worksheet through the Sheets API
pub struct WorksheetSink<'a> {
    client: &'a SheetsClient,
    worksheet: Worksheet,
    value_input: ValueInputOption,
}

impl<'a> WorksheetSink<'a> {
    pub fn new(client: &'a SheetsClient, worksheet: Worksheet, value_input: ValueInputOption) -> Self {
        Self {
            client,
            worksheet,
            value_input,
        }
    }
}

impl RowSink for WorksheetSink<'_> {
    async fn append_rows(&self, rows: &[Vec<Value>]) -> Result<(), SheetsError> {
        let result = self
            .client
            .append_rows(&self.worksheet, rows, self.value_input)
            .await?;

        if let Some(updates) = result.updates {
            debug!(
                updated_range = ?updates.updated_range,
                updated_rows = ?updates.updated_rows,
                "Append acknowledged"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub rows_appended: usize,
    pub batches_appended: usize,
    /// Batches already committed by an earlier run, per the checkpoint
    pub batches_skipped: usize,
}

/// Splits a table into fixed-size batches and appends them strictly in order
#[derive(Debug, Clone)]
pub struct BatchUploader {
    batch_size: NonZeroUsize,
    checkpoint: Option<CheckpointStore>,
    show_progress: bool,
}

impl Default for BatchUploader {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_BATCH_SIZE).unwrap_or(NonZeroUsize::MIN))
    }
}

impl BatchUploader {
    pub fn new(batch_size: NonZeroUsize) -> Self {
        Self {
            batch_size,
            checkpoint: None,
            show_progress: false,
        }
    }

    pub fn with_checkpoint(mut self, store: CheckpointStore) -> Self {
        self.checkpoint = Some(store);
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn batch_size(&self) -> NonZeroUsize {
        self.batch_size
    }

    /// Append every batch of `table` to `sink`
    ///
    /// The first failing batch aborts the upload. Batches appended before it
    /// stay appended; the error reports how many there were.
    #[instrument(skip(self, table, sink), fields(rows = table.len(), batch_size = self.batch_size.get()))]
    pub async fn upload<S: RowSink>(
        &self,
        table: &ReportTable,
        target: &str,
        sink: &S,
    ) -> Result<UploadSummary, UploadError> {
        let start_time = Instant::now();
        let total = table.batch_count(self.batch_size);
        let fingerprint = table.fingerprint();
        let skip = self.resume_point(target, &fingerprint, total)?;
        // Fail before the first append if the checkpoint cannot be written
        self.record_progress(target, &fingerprint, skip)?;

        let mut summary = UploadSummary {
            batches_skipped: skip,
            ..Default::default()
        };

        let pb = self.progress_bar(table.len());
        pb.set_position((skip * self.batch_size.get()).min(table.len()) as u64);

        for (index, batch) in table.batches(self.batch_size).enumerate().skip(skip) {
            let number = index + 1;
            let values: Vec<Vec<Value>> = batch.iter().map(ReportRow::to_values).collect();

            if let Err(source) = sink.append_rows(&values).await {
                pb.abandon_with_message(format!("batch {number} failed"));
                error!(
                    batch = number,
                    rows = batch.len(),
                    "Failed to append batch {}: {}",
                    number,
                    source
                );
                return Err(UploadError::Batch {
                    batch: number,
                    total,
                    committed: index,
                    rows_committed: index * self.batch_size.get(),
                    source,
                });
            }

            summary.batches_appended += 1;
            summary.rows_appended += batch.len();
            info!(
                batch = number,
                rows = batch.len(),
                "Appended batch {}: {} rows",
                number,
                batch.len()
            );

            if let Err(source) = self.record_progress(target, &fingerprint, number) {
                pb.abandon_with_message(format!("checkpoint after batch {number} failed"));
                let rows_committed = index * self.batch_size.get() + batch.len();
                error!(
                    batch = number,
                    "Batch {} appended but checkpoint not saved: {}", number, source
                );
                return Err(UploadError::CheckpointAfterBatch {
                    batch: number,
                    total,
                    committed: number,
                    rows_committed,
                    source,
                });
            }
            pb.inc(batch.len() as u64);
        }

        pb.finish_and_clear();
        if let Some(store) = &self.checkpoint {
            store.clear()?;
        }

        info!(
            "Successfully appended {} rows in {} batches ({:.1}s)",
            summary.rows_appended,
            summary.batches_appended,
            start_time.elapsed().as_secs_f64()
        );
        Ok(summary)
    }

    /// Number of leading batches a matching checkpoint says are already appended
    fn resume_point(&self, target: &str, fingerprint: &str, total: usize) -> Result<usize, UploadError> {
        let Some(store) = &self.checkpoint else {
            return Ok(0);
        };

        match store.load()? {
            Some(cp) if cp.matches(target, fingerprint, self.batch_size.get()) => {
                let skip = cp.batches_committed.min(total);
                info!(
                    "Resuming upload after batch {} of {} (checkpoint {})",
                    skip,
                    total,
                    store.path().display()
                );
                Ok(skip)
            }
            Some(cp) => {
                warn!(
                    "Ignoring checkpoint for a different upload (spreadsheet '{}', {} batches committed)",
                    cp.spreadsheet, cp.batches_committed
                );
                Ok(0)
            }
            None => Ok(0),
        }
    }

    fn record_progress(&self, target: &str, fingerprint: &str, committed: usize) -> Result<(), CheckpointError> {
        if let Some(store) = &self.checkpoint {
            store.save(&UploadCheckpoint {
                spreadsheet: target.to_string(),
                fingerprint: fingerprint.to_string(),
                batch_size: self.batch_size.get(),
                batches_committed: committed,
                updated_at: Utc::now(),
            })?;
        }
        Ok(())
    }

    fn progress_bar(&self, rows: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(rows as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} rows {msg}")
        {
            pb.set_style(style.progress_chars("##-"));
        }
        pb
    }
}

/// Anything that can take a normalized report to its destination
#[allow(async_fn_in_trait)]
pub trait ReportUploader {
    async fn upload_report(&self, table: &ReportTable) -> Result<UploadSummary, UploadError>;
}

/// Where and how the report is uploaded
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub credentials_path: PathBuf,
    pub spreadsheet_name: String,
    pub value_input: ValueInputOption,
    pub endpoints: SheetsEndpoints,
}

/// Service that authenticates, opens the target spreadsheet and runs the batched upload
#[derive(Clone)]
pub struct UploadService {
    client: Client,
    settings: UploadSettings,
    uploader: BatchUploader,
}

impl UploadService {
    pub fn new(settings: UploadSettings, uploader: BatchUploader) -> Self {
        Self {
            client: Client::new(),
            settings,
            uploader,
        }
    }

    async fn run(&self, table: &ReportTable) -> Result<UploadSummary, UploadError> {
        let name = &self.settings.spreadsheet_name;
        info!(
            "Attempting to append {} rows to spreadsheet '{}'",
            table.len(),
            name
        );

        let key = ServiceAccountKey::from_file(&self.settings.credentials_path)
            .map_err(UploadError::Auth)?;
        let auth = ServiceAccountAuth::new(self.client.clone(), key, &[SPREADSHEETS_SCOPE, DRIVE_SCOPE]);
        let token = auth.authorize().await.map_err(UploadError::Auth)?;

        let sheets = SheetsClient::with_endpoints(
            self.client.clone(),
            token,
            self.settings.endpoints.clone(),
        );

        let resolve_err = |source| UploadError::Resolve {
            name: name.clone(),
            source,
        };
        let spreadsheet = sheets.open_by_name(name).await.map_err(resolve_err)?;
        let worksheet = sheets
            .first_worksheet(&spreadsheet)
            .await
            .map_err(resolve_err)?;
        info!(
            "Opened worksheet '{}' of spreadsheet '{}'",
            worksheet.title, spreadsheet.name
        );

        let sink = WorksheetSink::new(&sheets, worksheet, self.settings.value_input);
        self.uploader.upload(table, &spreadsheet.name, &sink).await
    }
}

impl ReportUploader for UploadService {
    #[instrument(skip(self, table), fields(spreadsheet = %self.settings.spreadsheet_name))]
    async fn upload_report(&self, table: &ReportTable) -> Result<UploadSummary, UploadError> {
        self.run(table).await.map_err(|e| {
            error!("An error occurred while appending to Google Sheets: {}", e);
            e
        })
    }
}
