pub mod chrome_driver;
pub mod download_watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, instrument, Span};

use crate::fetch_error::FetchError;

pub use chrome_driver::{ChromeExportDriver, ChromeSession};
pub use download_watch::{DirSnapshot, DownloadWatcher};

/// Report portal page the export is triggered from
pub const DEFAULT_REPORT_URL: &str = "https://secure.cityofirvine.org/webreport/";
/// Element id of the portal's export control
pub const DEFAULT_EXPORT_ELEMENT_ID: &str = "webReportGrid_ctl00_ctl02_ctl00_LinkButton3";
/// File name the export is saved under
pub const DEFAULT_REPORT_FILE_NAME: &str = "Report.csv";

/// An open browser page that can trigger the export
pub trait ExportSession {
    fn open(&mut self, url: &str) -> Result<(), FetchError>;
    fn click_export(&mut self, element_id: &str, timeout: Duration) -> Result<(), FetchError>;
}

/// Starts browser sessions; the session is released when dropped
pub trait ExportDriver: Send + Sync + 'static {
    type Session: ExportSession;

    fn launch(&self, download_dir: &Path) -> Result<Self::Session, FetchError>;
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub report_url: String,
    pub export_element_id: String,
    pub download_dir: PathBuf,
    pub report_file_name: String,
    /// Fixed pause after navigation, on top of waiting for the export control
    pub page_settle: Duration,
    pub element_timeout: Duration,
    pub download_timeout: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            report_url: DEFAULT_REPORT_URL.to_string(),
            export_element_id: DEFAULT_EXPORT_ELEMENT_ID.to_string(),
            download_dir: PathBuf::from("."),
            report_file_name: DEFAULT_REPORT_FILE_NAME.to_string(),
            page_settle: Duration::ZERO,
            element_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(40),
        }
    }
}

impl FetchSettings {
    pub fn report_path(&self) -> PathBuf {
        self.download_dir.join(&self.report_file_name)
    }
}

/// Drives the portal's export and waits for the report file to land
pub struct ReportFetcher<D> {
    driver: Arc<D>,
    settings: FetchSettings,
}

impl<D> Clone for ReportFetcher<D> {
    fn clone(&self) -> Self {
        Self {
            driver: Arc::clone(&self.driver),
            settings: self.settings.clone(),
        }
    }
}

impl<D: ExportDriver> ReportFetcher<D> {
    pub fn new(driver: D, settings: FetchSettings) -> Self {
        Self {
            driver: Arc::new(driver),
            settings,
        }
    }

    /// Run the export and return the path of the downloaded report
    ///
    /// Browser work is blocking and runs on the blocking pool.
    #[instrument(skip(self), fields(url = %self.settings.report_url))]
    pub async fn fetch(&self) -> Result<PathBuf, FetchError> {
        info!("Starting CSV download process.");

        let driver = Arc::clone(&self.driver);
        let settings = self.settings.clone();
        let span = Span::current();

        let result = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            export_report(driver.as_ref(), &settings)
        })
        .await
        .map_err(FetchError::from)
        .and_then(|r| r);

        match &result {
            Ok(path) => info!("Report downloaded to {}", path.display()),
            Err(e) => error!("An error occurred during CSV download: {}", e),
        }
        result
    }
}

/// Navigate, click export, wait for the file. The session is dropped on every return path.
fn export_report<D: ExportDriver>(driver: &D, settings: &FetchSettings) -> Result<PathBuf, FetchError> {
    std::fs::create_dir_all(&settings.download_dir)?;

    // A leftover report would make the browser save the new one under another name
    let target = settings.report_path();
    if target.exists() {
        let previous = set_aside_path(&target);
        std::fs::rename(&target, &previous)?;
        info!(
            "Moved previous report {} to {}",
            target.display(),
            previous.display()
        );
    }

    let watcher = DownloadWatcher::new(
        &settings.download_dir,
        &settings.report_file_name,
        settings.download_timeout,
    );
    let before = watcher.snapshot()?;

    let mut session = driver.launch(&settings.download_dir)?;
    session.open(&settings.report_url)?;

    if !settings.page_settle.is_zero() {
        debug!("Waiting {:?} for the page to settle", settings.page_settle);
        std::thread::sleep(settings.page_settle);
    }

    info!(
        "Webpage loaded. Searching for export control '{}'.",
        settings.export_element_id
    );
    session.click_export(&settings.export_element_id, settings.element_timeout)?;
    info!("Export control clicked. Waiting for the download.");

    let path = watcher.wait(&before)?;

    drop(session);
    info!("Browser closed after successful CSV download.");
    Ok(path)
}

/// `Report.csv` -> `Report.csv.prev`
fn set_aside_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".prev");
    PathBuf::from(name)
}
