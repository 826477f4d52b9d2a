//! Header classification: header cells → KPI fields, Month and Year columns
//!
//! Deterministic rules always run. An optional [`ColumnClassifier`] oracle
//! may pre-assign KPI columns first; rules then fill whatever it left open
//! and never overwrite an existing assignment.

use crate::types::{HeaderClassification, HeaderRole, KpiField};
use serde_json::Value;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const MONTH_HEADERS: &[&str] = &["month", "måned", "maned", "mnd", "period", "periode"];
const YEAR_HEADERS: &[&str] = &["year", "år", "aar"];

const GROWTH_CONTAINS: &[&str] = &["growth %", "growth%", "revenue growth", "growth rate"];
const GROWTH_EXACT: &[&str] = &["mrr growth", "mrr growth %", "growth", "mom growth"];

/// Synonyms per field, matched exactly or as a prefix followed by a space or `%`
const KPI_SYNONYMS: &[(KpiField, &[&str])] = &[
    (KpiField::Mrr, &["mrr", "monthly recurring revenue"]),
    (KpiField::Arr, &["arr", "annual recurring revenue"]),
    (
        KpiField::BurnRate,
        &["burn", "burn rate", "monthly burn", "net burn"],
    ),
    (KpiField::RunwayMonths, &["runway", "runway months"]),
    (KpiField::Churn, &["churn", "churn %", "churn rate"]),
    (KpiField::LeadVelocity, &["lead velocity", "lvr"]),
    (
        KpiField::CashBalance,
        &["cash", "cash balance", "cash on hand", "bank balance"],
    ),
    (
        KpiField::Customers,
        &[
            "customers",
            "customer count",
            "active customers",
            "active users",
            "users",
        ],
    ),
];

/// Lower-case, turn separators into spaces, drop other punctuation and
/// collapse whitespace. `%` survives because it distinguishes growth columns.
pub fn normalize_header(header: &str) -> String {
    let mapped: String = header
        .to_lowercase()
        .chars()
        .map(|c| match c {
            ':' | '-' | '(' | ')' | '_' | '/' | '.' | '[' | ']' => ' ',
            c if c.is_alphanumeric() || c == '%' || c.is_whitespace() => c,
            _ => ' ',
        })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Month/Year detection on a normalized header
fn period_role(normalized: &str) -> Option<HeaderRole> {
    if MONTH_HEADERS.contains(&normalized) {
        Some(HeaderRole::Month)
    } else if YEAR_HEADERS.contains(&normalized) {
        Some(HeaderRole::Year)
    } else {
        None
    }
}

/// KPI detection on a normalized header. Growth runs before the plain
/// synonyms so "mrr growth %" never lands on `mrr`.
pub fn kpi_role(normalized: &str) -> Option<KpiField> {
    if GROWTH_CONTAINS.iter().any(|p| normalized.contains(p))
        || GROWTH_EXACT.contains(&normalized)
    {
        return Some(KpiField::GrowthPercent);
    }

    KPI_SYNONYMS
        .iter()
        .find(|(_, synonyms)| synonyms.iter().any(|s| matches_synonym(normalized, s)))
        .map(|(field, _)| *field)
}

fn matches_synonym(normalized: &str, synonym: &str) -> bool {
    match normalized.strip_prefix(synonym) {
        Some(rest) => rest.is_empty() || rest.starts_with(' ') || rest.starts_with('%'),
        None => false,
    }
}

/// Role of a single raw header cell under the deterministic rules
pub fn header_role(header: &str) -> HeaderRole {
    let normalized = normalize_header(header);
    if normalized.is_empty() {
        return HeaderRole::Unrecognized;
    }
    period_role(&normalized)
        .or_else(|| kpi_role(&normalized).map(HeaderRole::Kpi))
        .unwrap_or(HeaderRole::Unrecognized)
}

/// Classify a header row with the deterministic rules only
pub fn classify(header: &[String]) -> HeaderClassification {
    classify_with(header, None)
}

/// Classify a header row, consulting `oracle` before the deterministic rules.
///
/// Month and Year columns are detected first (first occurrence wins) and
/// cannot be claimed by the oracle. Each KPI field is claimed by at most one
/// column.
pub fn classify_with(
    header: &[String],
    oracle: Option<&dyn ColumnClassifier>,
) -> HeaderClassification {
    let normalized: Vec<String> = header.iter().map(|h| normalize_header(h)).collect();
    let mut classification = HeaderClassification::default();

    for (index, name) in normalized.iter().enumerate() {
        match period_role(name) {
            Some(HeaderRole::Month) if classification.month_column.is_none() => {
                classification.month_column = Some(index);
            }
            Some(HeaderRole::Year) if classification.year_column.is_none() => {
                classification.year_column = Some(index);
            }
            _ => {}
        }
    }

    if let Some(oracle) = oracle {
        let mut suggested: Vec<(usize, KpiField)> = oracle.assign(header).into_iter().collect();
        suggested.sort();
        for (index, field) in suggested {
            if index < header.len()
                && !classification.is_assigned(index)
                && !classification.claims(field)
            {
                classification.kpi_columns.insert(index, field);
            }
        }
    }

    for (index, name) in normalized.iter().enumerate() {
        if name.is_empty() || classification.is_assigned(index) {
            continue;
        }
        if let Some(field) = kpi_role(name) {
            if !classification.claims(field) {
                classification.kpi_columns.insert(index, field);
            }
        }
    }

    classification
}

//==============================================================================
// Column classifiers
//==============================================================================

/// A source of column → KPI field assignments.
///
/// Implementations are best-effort: on any failure they return an empty map.
pub trait ColumnClassifier {
    fn assign(&self, headers: &[String]) -> HashMap<usize, KpiField>;
}

/// The deterministic header rules as a [`ColumnClassifier`]
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleClassifier;

impl ColumnClassifier for RuleClassifier {
    fn assign(&self, headers: &[String]) -> HashMap<usize, KpiField> {
        headers
            .iter()
            .enumerate()
            .filter_map(|(i, h)| match header_role(h) {
                HeaderRole::Kpi(field) => Some((i, field)),
                _ => None,
            })
            .collect()
    }
}

/// Fixed assignments, typically decoded from an oracle's JSON answer.
///
/// Keys are column indexes or header texts (compared after normalization).
#[derive(Debug, Default, Clone)]
pub struct HintClassifier {
    by_index: HashMap<usize, KpiField>,
    by_header: HashMap<String, KpiField>,
}

impl HintClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_index(mut self, index: usize, field: KpiField) -> Self {
        self.by_index.insert(index, field);
        self
    }

    #[must_use]
    pub fn with_header(mut self, header: &str, field: KpiField) -> Self {
        self.by_header.insert(normalize_header(header), field);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty() && self.by_header.is_empty()
    }

    /// Decode oracle output. Accepted shapes:
    ///
    /// - `{"ARR (USD)": "arr", "3": "churn"}`
    /// - `{"mappings": { ... }}`
    /// - `[{"column": 3, "field": "churn"}, {"header": "Cash", "field": "cash_balance"}]`
    ///
    /// Anything malformed or unknown is ignored.
    pub fn from_json(text: &str) -> Self {
        let mut hints = Self::new();
        let value: Value = match serde_json::from_str(text.trim()) {
            Ok(v) => v,
            Err(e) => {
                debug!("Ignoring malformed classifier output: {}", e);
                return hints;
            }
        };

        let value = match value {
            Value::Object(mut map) if map.contains_key("mappings") => {
                map.remove("mappings").unwrap_or(Value::Null)
            }
            other => other,
        };

        match value {
            Value::Object(map) => {
                for (key, field) in map {
                    if let Some(field) = field.as_str().and_then(|f| f.parse().ok()) {
                        hints.insert_key(&key, field);
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    let Some(field) = item
                        .get("field")
                        .and_then(Value::as_str)
                        .and_then(|f| f.parse::<KpiField>().ok())
                    else {
                        continue;
                    };
                    if let Some(index) = item
                        .get("column")
                        .or_else(|| item.get("index"))
                        .and_then(Value::as_u64)
                    {
                        hints.by_index.insert(index as usize, field);
                    } else if let Some(header) = item.get("header").and_then(Value::as_str) {
                        hints.by_header.insert(normalize_header(header), field);
                    }
                }
            }
            _ => debug!("Classifier output is neither an object nor an array"),
        }
        hints
    }

    fn insert_key(&mut self, key: &str, field: KpiField) {
        match key.trim().parse::<usize>() {
            Ok(index) => {
                self.by_index.insert(index, field);
            }
            Err(_) => {
                self.by_header.insert(normalize_header(key), field);
            }
        }
    }
}

impl ColumnClassifier for HintClassifier {
    fn assign(&self, headers: &[String]) -> HashMap<usize, KpiField> {
        let mut assigned: HashMap<usize, KpiField> = self
            .by_index
            .iter()
            .filter(|(i, _)| **i < headers.len())
            .map(|(i, f)| (*i, *f))
            .collect();
        for (index, header) in headers.iter().enumerate() {
            if let Some(field) = self.by_header.get(&normalize_header(header)) {
                assigned.entry(index).or_insert(*field);
            }
        }
        assigned
    }
}

/// Asks an external program (e.g. a script fronting an LLM) to map headers.
///
/// The header row is written to stdin as a JSON array; stdout must hold a
/// document [`HintClassifier::from_json`] understands. Missing programs,
/// failures, malformed output and timeouts all yield no assignments.
#[derive(Debug, Clone)]
pub struct CommandClassifier {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandClassifier {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    /// Split a shell-style command line on whitespace
    pub fn from_command_line(line: &str, timeout: Duration) -> Option<Self> {
        let command: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        (!command.is_empty()).then(|| Self::new(command, timeout))
    }

    fn run(&self, headers: &[String]) -> Option<String> {
        let (program, args) = self.command.split_first()?;
        let payload = serde_json::to_string(headers).ok()?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| debug!("Classifier command '{}' failed to start: {}", program, e))
            .ok()?;

        // Pipes are serviced off-thread so a child that ignores stdin or floods
        // stdout cannot stall the deadline loop below
        let stdin = child.stdin.take();
        thread::spawn(move || {
            if let Some(mut stdin) = stdin {
                // A program that ignores stdin may close it early; that is fine
                let _ = stdin.write_all(payload.as_bytes());
            }
        });
        let stdout = child.stdout.take();
        let reader = thread::spawn(move || {
            let mut output = String::new();
            if let Some(mut stdout) = stdout {
                let _ = stdout.read_to_string(&mut output);
            }
            output
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    debug!("Classifier command '{}' timed out", program);
                    let _ = child.kill();
                    let _ = child.wait();
                    return None;
                }
                Ok(None) => thread::sleep(Duration::from_millis(20)),
                Err(e) => {
                    debug!("Classifier command '{}' wait failed: {}", program, e);
                    let _ = child.kill();
                    return None;
                }
            }
        };

        if !status.success() {
            debug!("Classifier command '{}' exited with {}", program, status);
            return None;
        }

        reader
            .join()
            .map_err(|_| debug!("Classifier command '{}' output reader panicked", program))
            .ok()
    }
}

impl ColumnClassifier for CommandClassifier {
    fn assign(&self, headers: &[String]) -> HashMap<usize, KpiField> {
        self.run(headers)
            .map(|out| HintClassifier::from_json(&out).assign(headers))
            .unwrap_or_default()
    }
}
