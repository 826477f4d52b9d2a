//! Sheet locator - spreadsheet URL + tab → CSV export URL
//!
//! Pure string transformation, no network access.

use crate::error::{SyncError, SyncResult};
use regex::Regex;
use reqwest::Url;
use std::sync::OnceLock;

const DEFAULT_HOST: &str = "docs.google.com";

fn spreadsheet_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"/spreadsheets/d/([^/?#\s]+)").ok())
        .as_ref()
}

/// Extract the spreadsheet identifier (the path segment after `/spreadsheets/d/`)
pub fn spreadsheet_id(sheet_url: &str) -> SyncResult<String> {
    spreadsheet_pattern()
        .and_then(|pattern| pattern.captures(sheet_url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            SyncError::InvalidReference(format!(
                "'{}' does not contain a spreadsheet id",
                sheet_url.trim()
            ))
        })
}

/// Build the CSV export URL for a spreadsheet and optional tab.
///
/// A tab made only of digits is a gid (`&gid=`); anything else is a tab
/// name (`&sheet=`, URL-encoded). Blank tabs are ignored.
pub fn resolve(sheet_url: &str, tab: Option<&str>) -> SyncResult<String> {
    let id = spreadsheet_id(sheet_url)?;

    // Keep the host the link was shared from; scheme-less links fall back to the default
    let host = Url::parse(sheet_url.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| DEFAULT_HOST.to_string());

    let base = format!("https://{}/spreadsheets/d/{}/export", host, id);
    let mut url = Url::parse(&base)
        .map_err(|e| SyncError::InvalidReference(format!("{}: {}", base, e)))?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("format", "csv");
        if let Some(tab) = tab.map(str::trim).filter(|t| !t.is_empty()) {
            if tab.chars().all(|c| c.is_ascii_digit()) {
                query.append_pair("gid", tab);
            } else {
                query.append_pair("sheet", tab);
            }
        }
    }

    Ok(url.to_string())
}
