//! KPI ingestion: header classification, value normalization, snapshot
//! building and cross-sheet merging

pub mod headers;
pub mod merge;
pub mod snapshot;
pub mod values;

pub use headers::{
    classify, classify_with, ColumnClassifier, CommandClassifier, HintClassifier, RuleClassifier,
};
pub use merge::{latest, merge, merge_into, MergeState};
pub use snapshot::{build_row, ingest_csv, SheetIngest, SkipReason};
pub use values::{parse_amount, parse_period};
