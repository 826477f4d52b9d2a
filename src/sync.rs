//! Sync orchestration
//!
//! Sheets are processed one at a time in the order given. A sheet that fails
//! to fetch or yields nothing is skipped with a warning; the run only fails
//! when the configuration is unusable or no sheet produced a snapshot.

use crate::error::{SyncError, SyncResult};
use crate::ingest::{ingest_csv, latest, merge_into, ColumnClassifier, MergeState, SkipReason};
use crate::sheets::{resolve, SheetFetcher};
use crate::store::SnapshotStore;
use crate::types::{KpiSnapshot, SheetReference};
use serde::Serialize;
use tracing::{info, warn};

/// Decode a sync request's sheet payload.
///
/// A payload starting with `[` is a JSON array of `{url, tab}` objects.
/// Anything else is a single legacy URL, paired with `tab`.
pub fn parse_sheet_payload(payload: &str, tab: Option<&str>) -> SyncResult<Vec<SheetReference>> {
    let trimmed = payload.trim();
    let refs: Vec<SheetReference> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed)
            .map_err(|e| SyncError::InvalidReference(format!("Malformed sheet list: {}", e)))?
    } else {
        vec![SheetReference::new(
            trimmed,
            tab.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string),
        )]
    };

    let refs: Vec<SheetReference> = refs
        .into_iter()
        .filter(|r| !r.url.trim().is_empty())
        .collect();

    if refs.is_empty() {
        return Err(SyncError::NoSheetsConfigured);
    }
    Ok(refs)
}

/// What happened to one sheet
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SheetStatus {
    Processed {
        snapshots: usize,
        rows_discarded: usize,
    },
    Skipped {
        reason: SkipReason,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetOutcome {
    pub url: String,
    pub tab: Option<String>,
    #[serde(flatten)]
    pub status: SheetStatus,
}

impl SheetOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self.status, SheetStatus::Skipped { .. })
    }
}

/// Result of a successful (possibly partial) sync run
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// One snapshot per period, ordered by `period_date`
    pub snapshots: Vec<KpiSnapshot>,
    pub latest: Option<KpiSnapshot>,
    pub sheets: Vec<SheetOutcome>,
}

impl SyncReport {
    pub fn skipped(&self) -> usize {
        self.sheets.iter().filter(|s| s.is_skipped()).count()
    }

    /// Some sheets were skipped but at least one snapshot was produced
    pub fn is_partial(&self) -> bool {
        self.skipped() > 0
    }
}

pub struct SyncPipeline<F: SheetFetcher> {
    fetcher: F,
    classifier: Option<Box<dyn ColumnClassifier>>,
    sample_rows: usize,
}

impl<F: SheetFetcher> SyncPipeline<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            classifier: None,
            sample_rows: 3,
        }
    }

    /// Consult `classifier` before the built-in header rules
    #[must_use]
    pub fn with_classifier(mut self, classifier: Box<dyn ColumnClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    #[must_use]
    pub fn with_sample_rows(mut self, rows: usize) -> Self {
        self.sample_rows = rows;
        self
    }

    /// Fetch, parse and merge every sheet
    pub fn run(&self, sheets: &[SheetReference]) -> SyncResult<SyncReport> {
        if sheets.is_empty() {
            return Err(SyncError::NoSheetsConfigured);
        }

        // Configuration errors abort before anything is fetched
        let endpoints = sheets
            .iter()
            .map(|s| resolve(&s.url, s.tab.as_deref()))
            .collect::<SyncResult<Vec<_>>>()?;

        info!("Syncing {} sheet(s)", sheets.len());

        let mut state = MergeState::new();
        let mut outcomes = Vec::with_capacity(sheets.len());

        for (sheet, endpoint) in sheets.iter().zip(&endpoints) {
            let status = match self.process_sheet(endpoint) {
                Ok((snapshots, rows_discarded)) => {
                    let count = snapshots.len();
                    merge_into(&mut state, snapshots);
                    info!("Sheet {}: {} snapshot(s)", sheet.url, count);
                    SheetStatus::Processed {
                        snapshots: count,
                        rows_discarded,
                    }
                }
                Err(reason) => {
                    warn!("Skipping sheet {} ({}): {}", sheet.url, endpoint, reason);
                    SheetStatus::Skipped { reason }
                }
            };
            outcomes.push(SheetOutcome {
                url: sheet.url.clone(),
                tab: sheet.tab.clone(),
                status,
            });
        }

        if state.is_empty() {
            return Err(SyncError::NoValidSnapshots);
        }

        let snapshots: Vec<KpiSnapshot> = state.into_values().collect();
        let latest = latest(&snapshots).cloned();
        Ok(SyncReport {
            snapshots,
            latest,
            sheets: outcomes,
        })
    }

    fn process_sheet(&self, endpoint: &str) -> Result<(Vec<KpiSnapshot>, usize), SkipReason> {
        let body = self
            .fetcher
            .fetch(endpoint)
            .map_err(|e| SkipReason::FetchFailed(e.to_string()))?;
        let ingest = ingest_csv(&body, self.classifier.as_deref(), self.sample_rows)?;
        Ok((ingest.snapshots, ingest.rows_discarded))
    }

    /// Run the sync and hand the result to `store`
    pub fn sync_company<S: SnapshotStore + ?Sized>(
        &self,
        company_id: &str,
        sheets: &[SheetReference],
        store: &mut S,
    ) -> SyncResult<SyncReport> {
        if company_id.trim().is_empty() {
            return Err(SyncError::Config("company id is required".to_string()));
        }
        let report = self.run(sheets)?;
        store_report(company_id, &report, store)?;
        Ok(report)
    }
}

/// Upsert a finished report's snapshots and refresh the current record
pub fn store_report<S: SnapshotStore + ?Sized>(
    company_id: &str,
    report: &SyncReport,
    store: &mut S,
) -> SyncResult<usize> {
    let written = store.upsert(company_id, &report.snapshots)?;
    if let Some(latest) = &report.latest {
        store.update_current(company_id, latest)?;
    }
    info!(
        "Stored {} snapshot(s) for {} ({} sheet(s) skipped)",
        written,
        company_id,
        report.skipped()
    );
    Ok(written)
}
