/// Shared utility functions for report-sync
///
/// Values that the report loader treats as a missing cell
///
/// Report exports mark absent values in several ways depending on the tool that
/// produced them. An empty field is the common case; the rest are the usual NA
/// spellings that spreadsheet and dataframe tools emit.
const MISSING_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Check whether a raw CSV field denotes a missing value
///
/// # Examples
///
/// ```
/// use report_sync::utils::is_missing_token;
///
/// assert!(is_missing_token(""));
/// assert!(is_missing_token("NaN"));
/// assert!(is_missing_token("null"));
/// assert!(!is_missing_token("0"));
/// assert!(!is_missing_token("Irvine"));
/// ```
pub fn is_missing_token(value: &str) -> bool {
    MISSING_TOKENS.contains(&value)
}

/// Parse a boolean flag from an environment-style string
///
/// Accepts `1/0`, `true/false`, `yes/no` and `on/off` in any case.
///
/// # Examples
///
/// ```
/// use report_sync::utils::parse_flag;
///
/// assert_eq!(parse_flag("TRUE"), Some(true));
/// assert_eq!(parse_flag("0"), Some(false));
/// assert_eq!(parse_flag("maybe"), None);
/// ```
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
