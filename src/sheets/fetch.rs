//! Sheet fetching over HTTP
//!
//! One blocking GET per sheet, no caching and no retries. Any failure is
//! reported as [`SyncError::Fetch`] so the pipeline can skip the sheet.

use crate::error::{SyncError, SyncResult};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, PRAGMA};
use std::sync::Arc;

/// Source of raw CSV text for a resolved export URL
pub trait SheetFetcher {
    fn fetch(&self, url: &str) -> SyncResult<String>;
}

impl<T: SheetFetcher + ?Sized> SheetFetcher for Arc<T> {
    fn fetch(&self, url: &str) -> SyncResult<String> {
        (**self).fetch(url)
    }
}

/// Fetches CSV exports with `reqwest`'s blocking client
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> SyncResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl SheetFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> SyncResult<String> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| SyncError::Fetch(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Fetch(format!("HTTP {}", status)));
        }

        let body = response
            .text()
            .map_err(|e| SyncError::Fetch(format!("Failed to read body: {}", e)))?;
        check_body(body)
    }
}

/// Reject bodies that cannot be a CSV export
pub(crate) fn check_body(body: String) -> SyncResult<String> {
    let head = body.trim_start();
    if head.is_empty() {
        return Err(SyncError::Fetch("Empty response body".to_string()));
    }
    // Unpublished sheets redirect to a sign-in page
    let lowered: String = head.chars().take(64).collect::<String>().to_lowercase();
    if lowered.starts_with("<!doctype html") || lowered.starts_with("<html") {
        return Err(SyncError::Fetch(
            "Received HTML instead of CSV (is the sheet shared publicly?)".to_string(),
        ));
    }
    Ok(body)
}
