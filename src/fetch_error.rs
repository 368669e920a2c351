use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },
    #[error("Export control '{element_id}' not found: {message}")]
    ElementNotFound { element_id: String, message: String },
    #[error("Failed to click export control '{element_id}': {message}")]
    Click { element_id: String, message: String },
    #[error("Download directory error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Timed out after {waited_secs}s waiting for {path:?} (new files seen: {observed:?})")]
    DownloadTimeout {
        path: PathBuf,
        waited_secs: u64,
        observed: Vec<String>,
    },
    #[error("Browser task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
