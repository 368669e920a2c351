use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::report::{ReportError, ReportTable};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("CSV file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Failed to read CSV file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse CSV: {0}")]
    Parse(#[from] csv::Error),

    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Reader for delimited report exports (header row + records)
pub struct CsvImporter {
    path: PathBuf,
    delimiter: u8,
}

impl CsvImporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the file into a table without reordering or filling anything
    ///
    /// This is synchronous, async callers should use spawn_blocking.
    pub fn read_table(&self) -> Result<ReportTable, LoadError> {
        if !self.path.exists() {
            return Err(LoadError::FileNotFound(self.path.clone()));
        }

        let file = File::open(&self.path)?;
        self.read_from(BufReader::new(file))
    }

    /// Parse delimited data from any reader
    pub fn read_from<R: Read>(&self, reader: R) -> Result<ReportTable, LoadError> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let columns: Vec<String> = rdr
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, name)| {
                // Exports from Windows tools often start with a UTF-8 BOM
                if i == 0 {
                    name.trim_start_matches('\u{feff}').to_string()
                } else {
                    name.to_string()
                }
            })
            .collect();
        debug!("CSV header: {:?}", columns);

        let mut records = Vec::new();
        for result in rdr.records() {
            let record = result?;
            records.push(record.iter().map(str::to_string).collect());
        }

        Ok(ReportTable::from_records(columns, records)?)
    }
}

/// Load a report file and normalize it for upload
///
/// Reads the file, stable-sorts rows ascending by `sort_key` and replaces
/// every missing cell with the empty string. Errors are logged here and
/// returned unchanged.
#[instrument(skip(importer), fields(path = %importer.path().display(), sort_key = %sort_key))]
pub fn load_report(importer: &CsvImporter, sort_key: &str) -> Result<ReportTable, LoadError> {
    info!("Loading CSV report from {}", importer.path().display());

    let result = importer.read_table().and_then(|mut table| {
        info!("CSV loaded successfully. Number of rows: {}", table.len());

        table.sort_by_column(sort_key)?;
        debug!("Sorted {} rows ascending by '{}'", table.len(), sort_key);

        let replaced = table.fill_missing("");
        info!(
            "Missing values handled successfully ({} cells replaced with empty strings)",
            replaced
        );
        Ok(table)
    });

    result.map_err(|e| {
        error!("An error occurred while loading the CSV report: {}", e);
        e
    })
}
