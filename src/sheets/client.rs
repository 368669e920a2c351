use std::str::FromStr;

use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::auth::AccessToken;
use super::error::SheetsError;

const DEFAULT_SHEETS_BASE: &str = "https://sheets.googleapis.com/v4/";
const DEFAULT_DRIVE_BASE: &str = "https://www.googleapis.com/drive/v3/";
const SPREADSHEET_MIME_TYPE: &str = "application/vnd.google-apps.spreadsheet";

/// Base URLs for the Sheets v4 and Drive v3 REST APIs
#[derive(Debug, Clone)]
pub struct SheetsEndpoints {
    pub sheets_base: String,
    pub drive_base: String,
}

impl Default for SheetsEndpoints {
    fn default() -> Self {
        Self {
            sheets_base: DEFAULT_SHEETS_BASE.to_string(),
            drive_base: DEFAULT_DRIVE_BASE.to_string(),
        }
    }
}

impl SheetsEndpoints {
    /// Both APIs served from one host, e.g. a local mock server
    pub fn with_host(host: &str) -> Self {
        let host = host.trim_end_matches('/');
        Self {
            sheets_base: format!("{host}/v4/"),
            drive_base: format!("{host}/drive/v3/"),
        }
    }
}

/// How the Sheets API interprets appended values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueInputOption {
    /// Stored exactly as sent
    #[default]
    Raw,
    /// Parsed as if typed into the UI (numbers, dates, formulas)
    UserEntered,
}

impl ValueInputOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueInputOption::Raw => "RAW",
            ValueInputOption::UserEntered => "USER_ENTERED",
        }
    }
}

impl FromStr for ValueInputOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RAW" => Ok(ValueInputOption::Raw),
            "USER_ENTERED" => Ok(ValueInputOption::UserEntered),
            other => Err(format!("unknown value input option '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spreadsheet {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worksheet {
    pub spreadsheet_id: String,
    pub sheet_id: i64,
    pub title: String,
    pub index: i64,
}

impl Worksheet {
    /// A1 range naming the whole sheet, quoted so any title is accepted
    pub fn a1_range(&self) -> String {
        format!("'{}'", self.title.replace('\'', "''"))
    }
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
    #[serde(default)]
    index: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRange<'a> {
    major_dimension: &'static str,
    values: &'a [Vec<Value>],
}

/// Response of `spreadsheets.values.append`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendResult {
    #[serde(default)]
    pub updates: Option<AppendUpdates>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendUpdates {
    #[serde(default)]
    pub updated_range: Option<String>,
    #[serde(default)]
    pub updated_rows: Option<u64>,
}

/// Authenticated client for the spreadsheet calls the uploader makes
#[derive(Clone)]
pub struct SheetsClient {
    client: Client,
    token: AccessToken,
    endpoints: SheetsEndpoints,
}

impl SheetsClient {
    pub fn new(client: Client, token: AccessToken) -> Self {
        Self::with_endpoints(client, token, SheetsEndpoints::default())
    }

    pub fn with_endpoints(client: Client, token: AccessToken, endpoints: SheetsEndpoints) -> Self {
        Self {
            client,
            token,
            endpoints,
        }
    }

    /// Resolve a spreadsheet by exact display name
    ///
    /// Fails when no spreadsheet, or more than one, carries the name.
    #[instrument(skip(self))]
    pub async fn open_by_name(&self, name: &str) -> Result<Spreadsheet, SheetsError> {
        let query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            escape_query_literal(name),
            SPREADSHEET_MIME_TYPE
        );
        let url = build_url(&self.endpoints.drive_base, &["files"])?;

        let list: FileList = self
            .send_json(self.client.get(url).query(&[
                ("q", query.as_str()),
                ("fields", "files(id,name)"),
                ("pageSize", "10"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ]))
            .await?;

        // Drive name matching is case-insensitive; keep only exact matches
        let mut matches: Vec<DriveFile> = list.files.into_iter().filter(|f| f.name == name).collect();
        debug!("Found {} spreadsheet(s) named '{}'", matches.len(), name);

        match matches.len() {
            0 => Err(SheetsError::SpreadsheetNotFound(name.to_string())),
            1 => {
                let file = matches.remove(0);
                Ok(Spreadsheet {
                    id: file.id,
                    name: file.name,
                })
            }
            count => Err(SheetsError::SpreadsheetNotUnique {
                name: name.to_string(),
                count,
            }),
        }
    }

    /// The worksheet with the lowest index
    #[instrument(skip(self), fields(spreadsheet_id = %spreadsheet.id))]
    pub async fn first_worksheet(&self, spreadsheet: &Spreadsheet) -> Result<Worksheet, SheetsError> {
        let url = build_url(&self.endpoints.sheets_base, &["spreadsheets", &spreadsheet.id])?;

        let meta: SpreadsheetMeta = self
            .send_json(
                self.client
                    .get(url)
                    .query(&[("fields", "sheets.properties")]),
            )
            .await?;

        meta.sheets
            .into_iter()
            .map(|s| s.properties)
            .min_by_key(|p| p.index)
            .map(|p| Worksheet {
                spreadsheet_id: spreadsheet.id.clone(),
                sheet_id: p.sheet_id,
                title: p.title,
                index: p.index,
            })
            .ok_or_else(|| SheetsError::WorksheetNotFound(spreadsheet.name.clone()))
    }

    /// Append rows after the last row of the worksheet's data
    #[instrument(skip(self, rows), fields(sheet = %worksheet.title, rows = rows.len()))]
    pub async fn append_rows(
        &self,
        worksheet: &Worksheet,
        rows: &[Vec<Value>],
        value_input: ValueInputOption,
    ) -> Result<AppendResult, SheetsError> {
        let range_segment = format!("{}:append", worksheet.a1_range());
        let url = build_url(
            &self.endpoints.sheets_base,
            &["spreadsheets", &worksheet.spreadsheet_id, "values", &range_segment],
        )?;

        let body = ValueRange {
            major_dimension: "ROWS",
            values: rows,
        };

        self.send_json(
            self.client
                .post(url)
                .query(&[
                    ("valueInputOption", value_input.as_str()),
                    ("insertDataOption", "INSERT_ROWS"),
                ])
                .json(&body),
        )
        .await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SheetsError> {
        if self.token.is_expired() {
            warn!("Access token expired at {}", self.token.expires_at());
        }

        let response = request.bearer_auth(self.token.secret()).send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(SheetsError::from_status(status, &body))
        }
    }
}

/// Escape a value for a single-quoted Drive query literal
fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn build_url(base: &str, segments: &[&str]) -> Result<Url, SheetsError> {
    let mut url = Url::parse(base).map_err(|e| SheetsError::InvalidUrl(format!("{base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| SheetsError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_input_option_parse() {
        assert_eq!("raw".parse::<ValueInputOption>(), Ok(ValueInputOption::Raw));
        assert_eq!(
            "USER_ENTERED".parse::<ValueInputOption>(),
            Ok(ValueInputOption::UserEntered)
        );
        assert!("formatted".parse::<ValueInputOption>().is_err());
    }

    #[test]
    fn test_a1_range_quotes_title() {
        let ws = Worksheet {
            spreadsheet_id: "abc".into(),
            sheet_id: 0,
            title: "Owner's List".into(),
            index: 0,
        };
        assert_eq!(ws.a1_range(), "'Owner''s List'");
    }

    #[test]
    fn test_escape_query_literal() {
        assert_eq!(escape_query_literal("City's \\ List"), "City\\'s \\\\ List");
    }

    #[test]
    fn test_build_url_encodes_segments() {
        let url = build_url(DEFAULT_SHEETS_BASE, &["spreadsheets", "id1", "values", "'Sheet 1':append"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/id1/values/'Sheet%201':append"
        );
    }

    #[test]
    fn test_endpoints_with_host() {
        let endpoints = SheetsEndpoints::with_host("http://127.0.0.1:1234/");
        assert_eq!(endpoints.sheets_base, "http://127.0.0.1:1234/v4/");
        assert_eq!(endpoints.drive_base, "http://127.0.0.1:1234/drive/v3/");
    }
}
