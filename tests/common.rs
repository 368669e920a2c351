// Shared fixtures for the integration tests
#![allow(dead_code)]

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use report_sync::fetch_error::FetchError;
use report_sync::fetcher::{ExportDriver, ExportSession};
use report_sync::report::ReportTable;
use report_sync::services::{ReportUploader, UploadError, UploadSummary};
use report_sync::sheets::SheetsError;

/// Three rows out of key order, one blank and one null cell
pub const SCENARIO_CSV: &str = "ACCOUNT NUMBER,X\n30,a\n10,\n20,null\n";

pub const SPREADSHEET_NAME: &str = "Full List of Businesses Licensed";

pub const TOKEN_RESPONSE: &str =
    r#"{"access_token":"test-token","expires_in":3599,"token_type":"Bearer"}"#;

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("Failed to write fixture file");
    path
}

/// Service-account key fixture whose token endpoint points at `token_uri`
pub fn service_account_file(dir: &Path, token_uri: &str) -> PathBuf {
    let mut key: serde_json::Value =
        serde_json::from_str(include_str!("fixtures/service_account.json"))
            .expect("Fixture key is valid JSON");
    key["token_uri"] = serde_json::Value::String(token_uri.to_string());
    write_file(dir, "service_account.json", &key.to_string())
}

/// Uploader that keeps every table it is given
#[derive(Default)]
pub struct RecordingUploader {
    pub tables: RefCell<Vec<ReportTable>>,
    pub fail: bool,
}

impl RecordingUploader {
    pub fn failing() -> Self {
        Self {
            tables: RefCell::new(Vec::new()),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.tables.borrow().len()
    }
}

impl ReportUploader for RecordingUploader {
    async fn upload_report(&self, table: &ReportTable) -> Result<UploadSummary, UploadError> {
        self.tables.borrow_mut().push(table.clone());
        if self.fail {
            return Err(UploadError::Auth(SheetsError::Unauthorized(
                "invalid_grant".to_string(),
            )));
        }
        Ok(UploadSummary {
            rows_appended: table.len(),
            batches_appended: 1,
            batches_skipped: 0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBehavior {
    /// Click writes a partial file, then the finished report
    Download,
    MissingElement,
    NavigationFails,
    /// Click succeeds but nothing is ever written
    NoDownload,
}

/// Browser stand-in that counts launches and releases
#[derive(Clone)]
pub struct FakeDriver {
    pub behavior: FakeBehavior,
    pub file_name: String,
    pub contents: String,
    pub launched: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
}

impl FakeDriver {
    pub fn new(behavior: FakeBehavior, contents: &str) -> Self {
        Self {
            behavior,
            file_name: "Report.csv".to_string(),
            contents: contents.to_string(),
            launched: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

pub struct FakeSession {
    driver: FakeDriver,
    download_dir: PathBuf,
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.driver.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl ExportDriver for FakeDriver {
    type Session = FakeSession;

    fn launch(&self, download_dir: &Path) -> Result<FakeSession, FetchError> {
        self.launched.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession {
            driver: self.clone(),
            download_dir: download_dir.to_path_buf(),
        })
    }
}

impl ExportSession for FakeSession {
    fn open(&mut self, url: &str) -> Result<(), FetchError> {
        if self.driver.behavior == FakeBehavior::NavigationFails {
            return Err(FetchError::Navigation {
                url: url.to_string(),
                message: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            });
        }
        Ok(())
    }

    fn click_export(&mut self, element_id: &str, _timeout: Duration) -> Result<(), FetchError> {
        match self.driver.behavior {
            FakeBehavior::MissingElement => Err(FetchError::ElementNotFound {
                element_id: element_id.to_string(),
                message: "The event waited for never came".to_string(),
            }),
            FakeBehavior::Download => {
                let partial = self
                    .download_dir
                    .join(format!("{}.crdownload", self.driver.file_name));
                let target = self.download_dir.join(&self.driver.file_name);
                let contents = self.driver.contents.clone();
                thread::spawn(move || {
                    std::fs::write(&partial, "partial").unwrap();
                    thread::sleep(Duration::from_millis(100));
                    std::fs::write(&target, contents).unwrap();
                    std::fs::remove_file(&partial).unwrap();
                });
                Ok(())
            }
            FakeBehavior::NavigationFails | FakeBehavior::NoDownload => Ok(()),
        }
    }
}
