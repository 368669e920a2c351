use std::env;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use crate::fetcher::{
    FetchSettings, DEFAULT_EXPORT_ELEMENT_ID, DEFAULT_REPORT_FILE_NAME, DEFAULT_REPORT_URL,
};
use crate::report::{DEFAULT_BATCH_SIZE, DEFAULT_SORT_KEY};
use crate::sheets::{SheetsEndpoints, ValueInputOption};
use crate::services::UploadSettings;
use crate::utils::parse_flag;

/// Append-only log written next to the working directory
pub const DEFAULT_LOG_FILE: &str = "automation_log.log";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),
    #[error("Invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub run_fetch: bool,
    pub report_url: String,
    pub export_element_id: String,
    pub download_dir: PathBuf,
    pub report_file_name: String,
    pub browser_headless: bool,
    pub browser_sandbox: bool,
    pub page_settle_secs: u64,
    pub element_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub sort_key: String,
    pub csv_delimiter: u8,
    pub service_account_file: PathBuf,
    pub spreadsheet_name: String,
    pub batch_size: NonZeroUsize,
    pub value_input_option: ValueInputOption,
    pub checkpoint_path: Option<PathBuf>,
    pub log_file: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Config {
            run_fetch: flag(&lookup, "RUN_FETCH", false)?,
            report_url: get("REPORT_URL", DEFAULT_REPORT_URL),
            export_element_id: get("EXPORT_ELEMENT_ID", DEFAULT_EXPORT_ELEMENT_ID),
            download_dir: PathBuf::from(get("DOWNLOAD_DIR", ".")),
            report_file_name: get("REPORT_FILE_NAME", DEFAULT_REPORT_FILE_NAME),
            browser_headless: flag(&lookup, "BROWSER_HEADLESS", true)?,
            browser_sandbox: flag(&lookup, "BROWSER_SANDBOX", false)?,
            page_settle_secs: number(&lookup, "PAGE_SETTLE_SECS", 0)?,
            element_timeout_secs: number(&lookup, "ELEMENT_TIMEOUT_SECS", 30)?,
            download_timeout_secs: number(&lookup, "DOWNLOAD_TIMEOUT_SECS", 40)?,
            sort_key: get("SORT_KEY", DEFAULT_SORT_KEY),
            csv_delimiter: delimiter(&lookup)?,
            service_account_file: PathBuf::from(get("SERVICE_ACCOUNT_FILE", "service_account.json")),
            spreadsheet_name: lookup("SPREADSHEET_NAME").ok_or(ConfigError::Missing("SPREADSHEET_NAME"))?,
            batch_size: batch_size(&lookup)?,
            value_input_option: match lookup("VALUE_INPUT_OPTION") {
                Some(value) => value.parse().map_err(|reason| ConfigError::Invalid {
                    var: "VALUE_INPUT_OPTION",
                    value,
                    reason,
                })?,
                None => ValueInputOption::default(),
            },
            checkpoint_path: lookup("UPLOAD_CHECKPOINT_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            log_file: Self::log_file_from_lookup(&lookup),
        })
    }

    /// `LOG_FILE` on its own, so logging can start before the rest is validated
    pub fn log_file_from_lookup<F>(lookup: F) -> PathBuf
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup("LOG_FILE")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE))
    }

    /// Where the fetched report lands and where the loader reads it from
    pub fn csv_path(&self) -> PathBuf {
        self.download_dir.join(&self.report_file_name)
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            report_url: self.report_url.clone(),
            export_element_id: self.export_element_id.clone(),
            download_dir: self.download_dir.clone(),
            report_file_name: self.report_file_name.clone(),
            page_settle: Duration::from_secs(self.page_settle_secs),
            element_timeout: Duration::from_secs(self.element_timeout_secs),
            download_timeout: Duration::from_secs(self.download_timeout_secs),
        }
    }

    pub fn upload_settings(&self) -> UploadSettings {
        UploadSettings {
            credentials_path: self.service_account_file.clone(),
            spreadsheet_name: self.spreadsheet_name.clone(),
            value_input: self.value_input_option,
            endpoints: SheetsEndpoints::default(),
        }
    }
}

fn flag<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    var: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match lookup(var) {
        Some(value) => parse_flag(&value).ok_or(ConfigError::Invalid {
            var,
            value,
            reason: "expected true/false".to_string(),
        }),
        None => Ok(default),
    }
}

fn number<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    var: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match lookup(var) {
        Some(value) => value.trim().parse().map_err(|e: std::num::ParseIntError| {
            ConfigError::Invalid {
                var,
                value,
                reason: e.to_string(),
            }
        }),
        None => Ok(default),
    }
}

fn batch_size<F: Fn(&str) -> Option<String>>(lookup: &F) -> Result<NonZeroUsize, ConfigError> {
    let var = "UPLOAD_BATCH_SIZE";
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse::<NonZeroUsize>()
            .map_err(|e| ConfigError::Invalid {
                var,
                value,
                reason: e.to_string(),
            }),
        None => NonZeroUsize::new(DEFAULT_BATCH_SIZE).ok_or(ConfigError::Invalid {
            var,
            value: DEFAULT_BATCH_SIZE.to_string(),
            reason: "must be greater than zero".to_string(),
        }),
    }
}

fn delimiter<F: Fn(&str) -> Option<String>>(lookup: &F) -> Result<u8, ConfigError> {
    let var = "CSV_DELIMITER";
    match lookup(var) {
        None => Ok(b','),
        Some(value) if value == "\\t" || value == "\t" => Ok(b'\t'),
        Some(value) if value.len() == 1 && value.is_ascii() => Ok(value.as_bytes()[0]),
        Some(value) => Err(ConfigError::Invalid {
            var,
            value,
            reason: "expected a single ASCII character".to_string(),
        }),
    }
}
