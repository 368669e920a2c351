use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, info};

use super::{ExportDriver, ExportSession};
use crate::fetch_error::FetchError;

/// Headless Chrome launcher for the report export
#[derive(Debug, Clone)]
pub struct ChromeExportDriver {
    headless: bool,
    sandbox: bool,
    args: Vec<String>,
    idle_timeout: Duration,
}

impl Default for ChromeExportDriver {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ChromeExportDriver {
    /// Container-friendly defaults: shared memory lives in /tmp, sandbox off unless asked for
    pub fn new(headless: bool, sandbox: bool) -> Self {
        Self {
            headless,
            sandbox,
            args: vec!["--disable-dev-shm-usage".to_string()],
            idle_timeout: Duration::from_secs(120),
        }
    }

    /// How long the DevTools connection may stay quiet, e.g. while a download runs
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

/// A running browser with one tab; dropping it shuts Chrome down
pub struct ChromeSession {
    tab: Arc<Tab>,
    _browser: Browser,
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        debug!("Closing browser session");
    }
}

impl ExportDriver for ChromeExportDriver {
    type Session = ChromeSession;

    fn launch(&self, download_dir: &Path) -> Result<ChromeSession, FetchError> {
        let args: Vec<&OsStr> = self.args.iter().map(OsStr::new).collect();
        let options = LaunchOptions::default_builder()
            .headless(self.headless)
            .sandbox(self.sandbox)
            .args(args)
            .idle_browser_timeout(self.idle_timeout)
            .build()
            .map_err(|e| FetchError::Launch(e.to_string()))?;

        let browser = Browser::new(options).map_err(|e| FetchError::Launch(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| FetchError::Launch(e.to_string()))?;

        // Chrome needs an absolute download path
        let download_path = download_dir.canonicalize()?;
        tab.call_method(Page::SetDownloadBehavior {
            behavior: Page::SetDownloadBehaviorBehaviorOption::Allow,
            download_path: Some(download_path.to_string_lossy().into_owned()),
        })
        .map_err(|e| FetchError::Launch(format!("could not enable downloads: {e}")))?;

        info!(
            headless = self.headless,
            sandbox = self.sandbox,
            "Browser launched, downloads go to {}",
            download_path.display()
        );
        Ok(ChromeSession {
            tab,
            _browser: browser,
        })
    }
}

impl ExportSession for ChromeSession {
    fn open(&mut self, url: &str) -> Result<(), FetchError> {
        self.tab
            .navigate_to(url)
            .map_err(|e| navigation_error(url, e))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| navigation_error(url, e))?;
        debug!("Navigated to {}", url);
        Ok(())
    }

    fn click_export(&mut self, element_id: &str, timeout: Duration) -> Result<(), FetchError> {
        // Attribute selector accepts any id, including ones that are not valid CSS identifiers
        let selector = format!("[id=\"{}\"]", element_id.replace('"', "\\\""));

        let element = self
            .tab
            .wait_for_element_with_custom_timeout(&selector, timeout)
            .map_err(|e| FetchError::ElementNotFound {
                element_id: element_id.to_string(),
                message: e.to_string(),
            })?;

        element.click().map_err(|e| FetchError::Click {
            element_id: element_id.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

fn navigation_error(url: &str, e: impl std::fmt::Display) -> FetchError {
    FetchError::Navigation {
        url: url.to_string(),
        message: e.to_string(),
    }
}
