// Integration tests for UploadService: token exchange, spreadsheet resolution
// and batched appends against a local mock of the Google APIs

use std::num::NonZeroUsize;
use std::path::Path;

use mockito::{Matcher, Mock, Server};
use serde_json::json;

use report_sync::checkpoint::CheckpointStore;
use report_sync::importers::{load_report, CsvImporter};
use report_sync::report::ReportTable;
use report_sync::services::{
    BatchUploader, ReportUploader, UploadError, UploadService, UploadSettings,
};
use report_sync::sheets::{SheetsEndpoints, SheetsError, ValueInputOption};

mod common;

mod test_fixtures {
    use super::*;

    pub fn scenario_table(dir: &Path) -> ReportTable {
        let path = common::write_file(dir, "Report.csv", common::SCENARIO_CSV);
        load_report(&CsvImporter::new(path), "ACCOUNT NUMBER").unwrap()
    }

    pub fn settings(server: &Server, dir: &Path) -> UploadSettings {
        UploadSettings {
            credentials_path: common::service_account_file(
                dir,
                &format!("{}/token", server.url()),
            ),
            spreadsheet_name: common::SPREADSHEET_NAME.to_string(),
            value_input: ValueInputOption::Raw,
            endpoints: SheetsEndpoints::with_host(&server.url()),
        }
    }

    pub fn uploader(batch_size: usize) -> BatchUploader {
        BatchUploader::new(NonZeroUsize::new(batch_size).unwrap())
    }

    /// Token, Drive lookup and worksheet metadata mocks
    pub async fn mock_lookup(server: &mut Server) -> Vec<Mock> {
        let token = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(common::TOKEN_RESPONSE)
            .create_async()
            .await;

        let drive = server
            .mock("GET", Matcher::Regex(r"^/drive/v3/files".to_string()))
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"files": [{"id": "sheet-123", "name": common::SPREADSHEET_NAME}]})
                    .to_string(),
            )
            .create_async()
            .await;

        let meta = server
            .mock("GET", Matcher::Regex(r"^/v4/spreadsheets/sheet-123($|\?)".to_string()))
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"sheets": [{"properties": {"sheetId": 0, "title": "Sheet1", "index": 0}}]})
                    .to_string(),
            )
            .create_async()
            .await;

        vec![token, drive, meta]
    }

    pub async fn mock_append(
        server: &mut Server,
        values: serde_json::Value,
        status: usize,
        expected_calls: usize,
    ) -> Mock {
        let body = if status == 200 {
            json!({"spreadsheetId": "sheet-123", "updates": {"updatedRows": 1}}).to_string()
        } else {
            json!({"error": {"code": status, "message": "Quota exceeded for quota metric 'Write requests'"}})
                .to_string()
        };

        server
            .mock(
                "POST",
                Matcher::Regex(r"^/v4/spreadsheets/sheet-123/values/.*:append".to_string()),
            )
            .match_query(Matcher::UrlEncoded("valueInputOption".into(), "RAW".into()))
            .match_body(Matcher::Json(json!({"majorDimension": "ROWS", "values": values})))
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .expect(expected_calls)
            .create_async()
            .await
    }
}

use test_fixtures::*;

#[tokio::test]
async fn test_upload_appends_batches_in_sorted_order() {
    let mut server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let table = scenario_table(dir.path());

    let lookup = mock_lookup(&mut server).await;
    let first = mock_append(&mut server, json!([[10, ""], [20, ""]]), 200, 1).await;
    let second = mock_append(&mut server, json!([[30, "a"]]), 200, 1).await;

    let service = UploadService::new(settings(&server, dir.path()), uploader(2));
    let summary = service.upload_report(&table).await.unwrap();

    for mock in &lookup {
        mock.assert_async().await;
    }
    first.assert_async().await;
    second.assert_async().await;
    assert_eq!(summary.rows_appended, 3);
    assert_eq!(summary.batches_appended, 2);
    assert_eq!(summary.batches_skipped, 0);
}

#[tokio::test]
async fn test_upload_single_batch_when_rows_fit() {
    let mut server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let table = scenario_table(dir.path());

    let _lookup = mock_lookup(&mut server).await;
    let all = mock_append(&mut server, json!([[10, ""], [20, ""], [30, "a"]]), 200, 1).await;

    let service = UploadService::new(settings(&server, dir.path()), BatchUploader::default());
    let summary = service.upload_report(&table).await.unwrap();

    all.assert_async().await;
    assert_eq!(summary.batches_appended, 1);
}

#[tokio::test]
async fn test_upload_stops_at_first_failed_batch() {
    let mut server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let table = scenario_table(dir.path());

    let _lookup = mock_lookup(&mut server).await;
    let first = mock_append(&mut server, json!([[10, ""], [20, ""]]), 200, 1).await;
    let second = mock_append(&mut server, json!([[30, "a"]]), 429, 1).await;

    let service = UploadService::new(settings(&server, dir.path()), uploader(2));
    let err = service.upload_report(&table).await.unwrap_err();

    first.assert_async().await;
    second.assert_async().await;
    match err {
        UploadError::Batch {
            batch,
            total,
            committed,
            rows_committed,
            source,
        } => {
            assert_eq!(batch, 2);
            assert_eq!(total, 2);
            assert_eq!(committed, 1);
            assert_eq!(rows_committed, 2);
            assert!(matches!(source, SheetsError::QuotaExceeded(_)));
        }
        other => panic!("Expected Batch error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_upload_resumes_from_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let table = scenario_table(dir.path());
    let checkpoint_path = dir.path().join("upload.checkpoint.json");

    // First run: batch 2 is throttled
    {
        let mut server = Server::new_async().await;
        let _lookup = mock_lookup(&mut server).await;
        mock_append(&mut server, json!([[10, ""], [20, ""]]), 200, 1).await;
        mock_append(&mut server, json!([[30, "a"]]), 429, 1).await;

        let uploader = uploader(2).with_checkpoint(CheckpointStore::new(&checkpoint_path));
        let service = UploadService::new(settings(&server, dir.path()), uploader);
        assert!(service.upload_report(&table).await.is_err());
    }

    let saved = CheckpointStore::new(&checkpoint_path)
        .load()
        .unwrap()
        .expect("checkpoint written after the first batch");
    assert_eq!(saved.batches_committed, 1);
    assert_eq!(saved.spreadsheet, common::SPREADSHEET_NAME);

    // Second run: only the remaining batch is sent
    let mut server = Server::new_async().await;
    let _lookup = mock_lookup(&mut server).await;
    let first = mock_append(&mut server, json!([[10, ""], [20, ""]]), 200, 0).await;
    let second = mock_append(&mut server, json!([[30, "a"]]), 200, 1).await;

    let uploader = uploader(2).with_checkpoint(CheckpointStore::new(&checkpoint_path));
    let service = UploadService::new(settings(&server, dir.path()), uploader);
    let summary = service.upload_report(&table).await.unwrap();

    first.assert_async().await;
    second.assert_async().await;
    assert_eq!(summary.batches_skipped, 1);
    assert_eq!(summary.batches_appended, 1);
    assert_eq!(summary.rows_appended, 1);
    assert!(!checkpoint_path.exists());
}

#[tokio::test]
async fn test_upload_fails_on_unknown_spreadsheet() {
    let mut server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let table = scenario_table(dir.path());

    let _token = server
        .mock("POST", "/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(common::TOKEN_RESPONSE)
        .create_async()
        .await;
    let _drive = server
        .mock("GET", Matcher::Regex(r"^/drive/v3/files".to_string()))
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"files": []}"#)
        .create_async()
        .await;
    let append = mock_append(&mut server, json!([[10, ""], [20, ""], [30, "a"]]), 200, 0).await;

    let service = UploadService::new(settings(&server, dir.path()), BatchUploader::default());
    let err = service.upload_report(&table).await.unwrap_err();

    append.assert_async().await;
    assert!(matches!(
        err,
        UploadError::Resolve {
            source: SheetsError::SpreadsheetNotFound(_),
            ..
        }
    ));
}

#[tokio::test]
async fn test_upload_fails_on_missing_credentials() {
    let server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let table = scenario_table(dir.path());

    let mut settings = settings(&server, dir.path());
    settings.credentials_path = dir.path().join("absent.json");

    let service = UploadService::new(settings, BatchUploader::default());
    let err = service.upload_report(&table).await.unwrap_err();
    assert!(matches!(err, UploadError::Auth(_)));
}
