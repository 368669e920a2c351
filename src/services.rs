pub mod upload_service;

pub use upload_service::{
    BatchUploader, ReportUploader, RowSink, UploadError, UploadService, UploadSettings,
    UploadSummary, WorksheetSink,
};
