use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum SheetsError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to read credentials file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid service account credentials: {0}")]
    InvalidCredentials(String),

    #[error("Failed to sign token request: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("Token request rejected ({status}): {message}")]
    TokenRejected { status: u16, message: String },

    #[error("Spreadsheet not found: {0}")]
    SpreadsheetNotFound(String),

    #[error("Spreadsheet name is not unique: {name} ({count} matches)")]
    SpreadsheetNotUnique { name: String, count: usize },

    #[error("Spreadsheet {0} has no worksheets")]
    WorksheetNotFound(String),

    #[error("Not authorized (401/403): {0}")]
    Unauthorized(String),

    #[error("Not found (404): {0}")]
    NotFound(String),

    #[error("Quota exceeded (429): {0}")]
    QuotaExceeded(String),

    #[error("Server error (5xx): {0}")]
    ServerError(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    message: String,
}

impl SheetsError {
    /// Map a non-success API response to an error, keeping Google's message when present
    pub(crate) fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<GoogleErrorBody>(body)
            .map(|b| b.error.message)
            .unwrap_or_else(|_| body.trim().to_string());
        let code = status.as_u16();

        match code {
            401 | 403 => SheetsError::Unauthorized(message),
            404 => SheetsError::NotFound(message),
            429 => SheetsError::QuotaExceeded(message),
            _ if status.is_server_error() => SheetsError::ServerError(format!("{status}: {message}")),
            _ => SheetsError::Api {
                status: code,
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_extracts_google_message() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded for quota metric 'Write requests'","status":"RESOURCE_EXHAUSTED"}}"#;
        match SheetsError::from_status(StatusCode::TOO_MANY_REQUESTS, body) {
            SheetsError::QuotaExceeded(msg) => assert!(msg.contains("Write requests")),
            e => panic!("Expected QuotaExceeded, got {e:?}"),
        }
    }

    #[test]
    fn test_from_status_plain_body() {
        match SheetsError::from_status(StatusCode::BAD_GATEWAY, "upstream down\n") {
            SheetsError::ServerError(msg) => {
                assert!(msg.contains("502"));
                assert!(msg.contains("upstream down"));
            }
            e => panic!("Expected ServerError, got {e:?}"),
        }
    }

    #[test]
    fn test_from_status_other_client_error() {
        match SheetsError::from_status(StatusCode::BAD_REQUEST, "{}") {
            SheetsError::Api { status, .. } => assert_eq!(status, 400),
            e => panic!("Expected Api error, got {e:?}"),
        }
    }
}
