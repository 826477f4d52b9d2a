//! kpisync - Google Sheets KPI ingestion
//!
//! Turns spreadsheet links into a monthly KPI time series: resolves CSV
//! export URLs, tokenizes the CSV, maps free-form headers onto a fixed set of
//! startup KPIs, normalizes numbers and dates, and merges rows from several
//! sheets into one snapshot per month.
//!
//! # Example
//!
//! ```no_run
//! use kpisync::sheets::HttpFetcher;
//! use kpisync::sync::{parse_sheet_payload, SyncPipeline};
//!
//! let sheets = parse_sheet_payload(
//!     "https://docs.google.com/spreadsheets/d/abc123/edit",
//!     Some("KPIs"),
//! )?;
//! let pipeline = SyncPipeline::new(HttpFetcher::new("kpisync")?);
//! let report = pipeline.run(&sheets)?;
//!
//! for snapshot in &report.snapshots {
//!     println!("{} mrr={:?}", snapshot.period_date, snapshot.mrr);
//! }
//! # Ok::<(), kpisync::error::SyncError>(())
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod ingest;
pub mod sheets;
pub mod store;
pub mod sync;
pub mod types;

// Re-export commonly used types
pub use error::{SyncError, SyncResult};
pub use types::{HeaderClassification, HeaderRole, KpiField, KpiSnapshot, SheetReference};
