//! End-to-end sync pipeline tests with an in-process fetcher

use kpisync::error::{SyncError, SyncResult};
use kpisync::ingest::HintClassifier;
use kpisync::sheets::SheetFetcher;
use kpisync::store::{MemoryStore, SnapshotStore};
use kpisync::sync::{parse_sheet_payload, SheetStatus, SyncPipeline};
use kpisync::{KpiField, KpiSnapshot, SheetReference};
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;

/// Serves canned CSV bodies keyed by spreadsheet id
#[derive(Default)]
struct StaticFetcher {
    bodies: HashMap<String, String>,
    requested: RefCell<Vec<String>>,
}

impl StaticFetcher {
    fn with(mut self, id: &str, body: &str) -> Self {
        self.bodies.insert(id.to_string(), body.to_string());
        self
    }
}

impl SheetFetcher for StaticFetcher {
    fn fetch(&self, url: &str) -> SyncResult<String> {
        self.requested.borrow_mut().push(url.to_string());
        self.bodies
            .iter()
            .find(|(id, _)| url.contains(&format!("/d/{}/", id)))
            .map(|(_, body)| body.clone())
            .ok_or_else(|| SyncError::Fetch("HTTP 404 Not Found".to_string()))
    }
}

fn sheet(id: &str) -> SheetReference {
    SheetReference::new(format!("https://docs.google.com/spreadsheets/d/{}/edit", id), None)
}

fn test_data(filename: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("test-data");
    path.push(filename);
    std::fs::read_to_string(path).unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════
// SINGLE SHEET
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_end_to_end_basic_sheet() {
    let fetcher = StaticFetcher::default().with("basic", &test_data("kpis_basic.csv"));
    let report = SyncPipeline::new(fetcher).run(&[sheet("basic")]).unwrap();

    assert_eq!(
        report.snapshots,
        vec![
            KpiSnapshot::new("2024-01-01")
                .with(KpiField::Arr, 120000.0)
                .with(KpiField::Churn, 4.0),
            KpiSnapshot::new("2024-02-01")
                .with(KpiField::Arr, 130000.0)
                .with(KpiField::Churn, 3.5),
        ]
    );
    assert_eq!(report.latest.as_ref().unwrap().period_date, "2024-02-01");
    assert!(!report.is_partial());
}

#[test]
fn test_norwegian_sheet_with_year_column() {
    let fetcher = StaticFetcher::default().with("no", &test_data("kpis_norwegian.csv"));
    let report = SyncPipeline::new(fetcher).run(&[sheet("no")]).unwrap();

    assert_eq!(
        report.snapshots,
        vec![
            KpiSnapshot::new("2024-01-01")
                .with(KpiField::Mrr, 45000.0)
                .with(KpiField::BurnRate, -120000.0)
                .with(KpiField::RunwayMonths, 10.4)
                .with(KpiField::CashBalance, 1250000.0),
            KpiSnapshot::new("2024-02-01")
                .with(KpiField::Mrr, 48500.0)
                .with(KpiField::BurnRate, -118000.0)
                .with(KpiField::RunwayMonths, 9.5)
                .with(KpiField::CashBalance, 1130000.0),
        ]
    );
    assert_eq!(
        report.sheets[0].status,
        SheetStatus::Processed {
            snapshots: 2,
            rows_discarded: 2
        }
    );
}

#[test]
fn test_messy_sheet_merges_rows_for_same_month() {
    let fetcher = StaticFetcher::default().with("messy", &test_data("kpis_messy.csv"));
    let report = SyncPipeline::new(fetcher).run(&[sheet("messy")]).unwrap();

    assert_eq!(report.snapshots.len(), 2);
    let nov = &report.snapshots[0];
    assert_eq!(nov.period_date, "2023-11-01");
    assert_eq!(nov.mrr, Some(10000.0));
    assert_eq!(nov.growth_percent, Some(11.1));
    assert_eq!(nov.customers, Some(1204.0));
    assert_eq!(nov.churn, Some(2.0));
    assert_eq!(nov.lead_velocity, Some(0.15));

    let dec = &report.snapshots[1];
    assert_eq!(dec.period_date, "2023-12-01");
    assert_eq!(dec.mrr, Some(13000.0));
    assert_eq!(dec.customers, Some(1322.0));
    assert_eq!(dec.growth_percent, Some(25.0));
    assert_eq!(dec.churn, Some(1.5));
}

// ═══════════════════════════════════════════════════════════════════════════
// MULTIPLE SHEETS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_cross_sheet_sum_and_latest_wins() {
    let fetcher = StaticFetcher::default()
        .with("a", "Month,MRR,Churn\n2024-01,100,2%\n")
        .with("b", "Month,MRR,Churn\n2024-01,50,3%\n");

    let report = SyncPipeline::new(fetcher).run(&[sheet("a"), sheet("b")]).unwrap();
    assert_eq!(
        report.snapshots,
        vec![KpiSnapshot::new("2024-01-01")
            .with(KpiField::Mrr, 150.0)
            .with(KpiField::Churn, 3.0)]
    );
}

#[test]
fn test_sheet_order_decides_latest_wins() {
    let fetcher = StaticFetcher::default()
        .with("a", "Month,Runway\n2024-01,12\n")
        .with("b", "Month,Runway\n2024-01,9\n");
    let pipeline = SyncPipeline::new(fetcher);

    let ab = pipeline.run(&[sheet("a"), sheet("b")]).unwrap();
    let ba = pipeline.run(&[sheet("b"), sheet("a")]).unwrap();
    assert_eq!(ab.snapshots[0].runway_months, Some(9.0));
    assert_eq!(ba.snapshots[0].runway_months, Some(12.0));
}

#[test]
fn test_partial_success_skips_failing_sheets() {
    let fetcher = StaticFetcher::default()
        .with("good", "Month,ARR\nJan 2024,10\n")
        .with("notes", "Month,Notes\nJan 2024,hello\n");

    let report = SyncPipeline::new(fetcher)
        .run(&[sheet("missing"), sheet("notes"), sheet("good")])
        .unwrap();

    assert!(report.is_partial());
    assert_eq!(report.skipped(), 2);
    assert_eq!(report.snapshots.len(), 1);
    assert!(report.sheets[0].is_skipped());
    assert!(report.sheets[1].is_skipped());
    assert!(!report.sheets[2].is_skipped());
}

// ═══════════════════════════════════════════════════════════════════════════
// FAILURES
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_all_fetches_fail_is_no_valid_snapshots() {
    let pipeline = SyncPipeline::new(StaticFetcher::default());
    let err = pipeline.run(&[sheet("x"), sheet("y")]).unwrap_err();
    assert!(matches!(err, SyncError::NoValidSnapshots));
    assert!(!err.is_configuration());
}

#[test]
fn test_no_usable_rows_is_no_valid_snapshots() {
    let fetcher = StaticFetcher::default().with("blank", "Month,MRR\nJan 2024,\nFeb 2024,  \n");
    let err = SyncPipeline::new(fetcher).run(&[sheet("blank")]).unwrap_err();
    assert!(matches!(err, SyncError::NoValidSnapshots));
}

#[test]
fn test_empty_sheet_list() {
    let pipeline = SyncPipeline::new(StaticFetcher::default());
    assert!(matches!(pipeline.run(&[]), Err(SyncError::NoSheetsConfigured)));
}

#[test]
fn test_invalid_reference_fails_before_fetching() {
    let fetcher = StaticFetcher::default().with("good", "Month,ARR\nJan 2024,10\n");
    let pipeline = SyncPipeline::new(fetcher);
    let refs = vec![
        sheet("good"),
        SheetReference::new("https://example.com/not-a-sheet", None),
    ];

    let err = pipeline.run(&refs).unwrap_err();
    assert!(matches!(err, SyncError::InvalidReference(_)));
    assert!(err.is_configuration());
}

// ═══════════════════════════════════════════════════════════════════════════
// CLASSIFIER ORACLE
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_oracle_extends_coverage() {
    let body = "Month,Revenue,Churn %\nJan 2024,900,1%\n";

    let plain = SyncPipeline::new(StaticFetcher::default().with("s", body))
        .run(&[sheet("s")])
        .unwrap();
    assert_eq!(plain.snapshots[0].mrr, None);

    let oracle = HintClassifier::from_json(r#"{"Revenue": "mrr"}"#);
    let assisted = SyncPipeline::new(StaticFetcher::default().with("s", body))
        .with_classifier(Box::new(oracle))
        .run(&[sheet("s")])
        .unwrap();
    assert_eq!(assisted.snapshots[0].mrr, Some(900.0));
    assert_eq!(assisted.snapshots[0].churn, Some(1.0));
}

// ═══════════════════════════════════════════════════════════════════════════
// STORE + PAYLOADS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_sync_company_upserts_and_refreshes_current() {
    let mut store = MemoryStore::new();

    let first = StaticFetcher::default().with("s", "Month,MRR,Cash\n2024-01,100,500\n2024-02,110,450\n");
    SyncPipeline::new(first)
        .sync_company("acme", &[sheet("s")], &mut store)
        .unwrap();

    let second = StaticFetcher::default().with("s", "Month,MRR\n2024-02,120\n2024-03,130\n");
    SyncPipeline::new(second)
        .sync_company("acme", &[sheet("s")], &mut store)
        .unwrap();

    let rows = store.snapshots("acme");
    assert_eq!(rows.len(), 3);
    // Upsert replaces the whole February row
    assert_eq!(rows[1].mrr, Some(120.0));
    assert_eq!(rows[1].cash_balance, None);

    let current = store.current("acme").unwrap();
    assert_eq!(current.period_date.as_deref(), Some("2024-03-01"));
    assert_eq!(current.get(KpiField::Mrr), Some(130.0));
    // Cash is absent from the latest snapshot and must not be erased
    assert_eq!(current.get(KpiField::CashBalance), Some(450.0));
}

#[test]
fn test_sync_company_failure_leaves_store_untouched() {
    let mut store = MemoryStore::new();
    let err = SyncPipeline::new(StaticFetcher::default())
        .sync_company("acme", &[sheet("x")], &mut store)
        .unwrap_err();
    assert!(matches!(err, SyncError::NoValidSnapshots));
    assert!(store.snapshots("acme").is_empty());
    assert!(store.current("acme").is_none());
}

#[test]
fn test_payload_drives_pipeline() {
    let fetcher = StaticFetcher::default()
        .with("a", "Month,ARR\n2024-01,1\n")
        .with("b", "Month,ARR\n2024-01,2\n");
    let payload = r#"[
        {"url": "https://docs.google.com/spreadsheets/d/a/edit", "tab": 0},
        {"url": "https://docs.google.com/spreadsheets/d/b/edit", "tab": "Q1"}
    ]"#;
    let refs = parse_sheet_payload(payload, None).unwrap();
    let pipeline = SyncPipeline::new(fetcher);
    let report = pipeline.run(&refs).unwrap();
    assert_eq!(report.snapshots[0].arr, Some(3.0));
}
