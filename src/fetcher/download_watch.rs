use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use backon::{BackoffBuilder, ExponentialBuilder};
use tracing::{debug, info};

use crate::fetch_error::FetchError;

/// Suffixes browsers use for files still being written
const PARTIAL_SUFFIXES: &[&str] = &[".crdownload", ".part", ".tmp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

/// Size and modification time of every file in a directory at one instant
#[derive(Debug, Clone, Default)]
pub struct DirSnapshot {
    files: HashMap<String, FileStamp>,
}

impl DirSnapshot {
    pub fn capture(dir: &Path) -> Result<Self, FetchError> {
        let mut files = HashMap::new();
        if !dir.exists() {
            return Ok(Self { files });
        }

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            files.insert(
                entry.file_name().to_string_lossy().into_owned(),
                FileStamp {
                    len: meta.len(),
                    modified: meta.modified().ok(),
                },
            );
        }
        Ok(Self { files })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    /// Names that are new or changed relative to `before`, sorted
    pub fn changed_since(&self, before: &DirSnapshot) -> Vec<String> {
        let mut names: Vec<String> = self
            .files
            .iter()
            .filter(|(name, stamp)| before.files.get(*name) != Some(*stamp))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn stamp(&self, name: &str) -> Option<FileStamp> {
        self.files.get(name).copied()
    }
}

fn is_partial(name: &str) -> bool {
    PARTIAL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Polls a download directory until an expected file has finished arriving
///
/// A download counts as complete when the expected file differs from the
/// snapshot taken before the export was triggered, no new partial-download
/// files are left in the directory, and the file's size and mtime are the
/// same on two consecutive polls. Poll delays grow exponentially.
#[derive(Debug, Clone)]
pub struct DownloadWatcher {
    dir: PathBuf,
    file_name: String,
    timeout: Duration,
    min_poll: Duration,
    max_poll: Duration,
}

impl DownloadWatcher {
    pub fn new(dir: impl Into<PathBuf>, file_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.into(),
            timeout,
            min_poll: Duration::from_millis(250),
            max_poll: Duration::from_secs(2),
        }
    }

    pub fn with_poll_interval(mut self, min: Duration, max: Duration) -> Self {
        self.min_poll = min;
        self.max_poll = max;
        self
    }

    pub fn target(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    pub fn snapshot(&self) -> Result<DirSnapshot, FetchError> {
        DirSnapshot::capture(&self.dir)
    }

    /// Block until the download completes or the timeout elapses
    pub fn wait(&self, before: &DirSnapshot) -> Result<PathBuf, FetchError> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut delays = ExponentialBuilder::default()
            .with_min_delay(self.min_poll)
            .with_max_delay(self.max_poll)
            .with_factor(2.0)
            .with_max_times(64)
            .build();
        let mut previous: Option<FileStamp> = None;

        loop {
            let current = self.snapshot()?;
            let changed = current.changed_since(before);
            let fresh = current
                .stamp(&self.file_name)
                .filter(|_| changed.iter().any(|n| n == &self.file_name));
            let partials: Vec<&String> = changed.iter().filter(|n| is_partial(n)).collect();

            if let Some(stamp) = fresh {
                if partials.is_empty() && previous == Some(stamp) {
                    info!(
                        "Download of {} complete ({} bytes, {:.1}s)",
                        self.file_name,
                        stamp.len,
                        started.elapsed().as_secs_f64()
                    );
                    return Ok(self.target());
                }
            }
            debug!(
                fresh = fresh.is_some(),
                partials = partials.len(),
                "Download not settled yet"
            );
            previous = fresh;

            let now = Instant::now();
            if now >= deadline {
                return Err(FetchError::DownloadTimeout {
                    path: self.target(),
                    waited_secs: self.timeout.as_secs(),
                    observed: changed,
                });
            }

            let delay = delays.next().unwrap_or(self.max_poll).min(deadline - now);
            std::thread::sleep(delay);
        }
    }
}
