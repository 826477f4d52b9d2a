//! Snapshot builder: one CSV data row → one KPI snapshot

use crate::ingest::headers::{classify_with, ColumnClassifier};
use crate::ingest::values::{parse_amount, parse_period, parse_year};
use crate::sheets::csv::{cell, tokenize};
use crate::types::{HeaderClassification, KpiSnapshot};
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Why a sheet contributed nothing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    FetchFailed(String),
    NoHeaderRow,
    NoKpiColumns,
    NoUsableRows,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::FetchFailed(e) => write!(f, "fetch failed: {}", e),
            SkipReason::NoHeaderRow => f.write_str("no header row"),
            SkipReason::NoKpiColumns => f.write_str("no recognized KPI columns"),
            SkipReason::NoUsableRows => f.write_str("no rows with a period and KPI values"),
        }
    }
}

/// Result of ingesting one sheet's CSV text
#[derive(Debug, Clone)]
pub struct SheetIngest {
    pub headers: Vec<String>,
    pub classification: HeaderClassification,
    /// Snapshots in row order, not yet merged
    pub snapshots: Vec<KpiSnapshot>,
    pub rows_discarded: usize,
}

/// Column holding the period: the Month column, else the first column
/// when it is not a KPI column
fn period_column(classification: &HeaderClassification) -> Option<usize> {
    classification.month_column.or_else(|| {
        let first_is_free =
            !classification.kpi_columns.contains_key(&0) && classification.year_column != Some(0);
        first_is_free.then_some(0)
    })
}

/// Build a snapshot from one data row.
///
/// Returns `None` when the row has no resolvable period or when every
/// classified KPI cell is blank or unparseable.
pub fn build_row(row: &[String], classification: &HeaderClassification) -> Option<KpiSnapshot> {
    let explicit_year = classification
        .year_column
        .and_then(|i| parse_year(cell(row, i)));
    let period = parse_period(cell(row, period_column(classification)?), explicit_year)?;

    let mut snapshot = KpiSnapshot::new(period);
    for (&index, &field) in &classification.kpi_columns {
        snapshot.set(field, parse_amount(cell(row, index), field));
    }

    snapshot.has_values().then_some(snapshot)
}

/// Tokenize, classify and build every row of one sheet.
///
/// The first non-blank row is the header. The first `sample_rows` data
/// rows are logged at debug level.
pub fn ingest_csv(
    text: &str,
    oracle: Option<&dyn ColumnClassifier>,
    sample_rows: usize,
) -> Result<SheetIngest, SkipReason> {
    let mut rows = tokenize(text).into_iter();
    let headers = rows.next().ok_or(SkipReason::NoHeaderRow)?;

    let classification = classify_with(&headers, oracle);
    if !classification.has_kpi_columns() {
        return Err(SkipReason::NoKpiColumns);
    }
    debug!(
        "Header roles: {}",
        headers
            .iter()
            .enumerate()
            .map(|(i, h)| format!("{}={}", h.trim(), classification.role(i)))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut snapshots = Vec::new();
    let mut rows_discarded = 0;
    for (n, row) in rows.enumerate() {
        let built = build_row(&row, &classification);
        if n < sample_rows {
            debug!("Row {}: {:?} -> {:?}", n + 1, row, built);
        }
        match built {
            Some(snapshot) => snapshots.push(snapshot),
            None => rows_discarded += 1,
        }
    }

    if snapshots.is_empty() {
        return Err(SkipReason::NoUsableRows);
    }

    Ok(SheetIngest {
        headers,
        classification,
        snapshots,
        rows_discarded,
    })
}
