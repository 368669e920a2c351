// Google Sheets access
//
// Thin reqwest wrapper over the three remote calls the uploader needs:
// - OAuth2 token exchange for a service-account key (auth)
// - Drive files.list to resolve a spreadsheet by display name (client)
// - Sheets spreadsheets.get / values.append for the first worksheet (client)

pub mod auth;
pub mod client;
pub mod error;

pub use auth::{AccessToken, ServiceAccountAuth, ServiceAccountKey, DRIVE_SCOPE, SPREADSHEETS_SCOPE};
pub use client::{SheetsClient, SheetsEndpoints, Spreadsheet, ValueInputOption, Worksheet};
pub use error::SheetsError;
