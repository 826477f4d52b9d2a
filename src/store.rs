//! Snapshot persistence
//!
//! The real deployment upserts into a hosted database keyed by
//! `(company_id, period_date)`. [`MemoryStore`] implements the same contract
//! in memory and can be saved to a JSON file.

use crate::error::{SyncError, SyncResult};
use crate::types::{KpiField, KpiSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Latest-known KPI values for a company
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentKpis {
    /// Period the most recent update came from
    pub period_date: Option<String>,
    /// Keyed by the field's snake_case name
    pub values: BTreeMap<String, f64>,
}

impl CurrentKpis {
    pub fn get(&self, field: KpiField) -> Option<f64> {
        self.values.get(field.as_str()).copied()
    }
}

pub trait SnapshotStore {
    /// Insert or replace rows keyed by `(company_id, period_date)`; returns the row count
    fn upsert(&mut self, company_id: &str, snapshots: &[KpiSnapshot]) -> SyncResult<usize>;

    /// Refresh the denormalized current record. Null fields never erase stored
    /// values, and a snapshot older than the stored period is ignored.
    fn update_current(&mut self, company_id: &str, latest: &KpiSnapshot) -> SyncResult<()>;

    fn snapshots(&self, company_id: &str) -> Vec<KpiSnapshot>;

    fn current(&self, company_id: &str) -> Option<CurrentKpis>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    companies: BTreeMap<String, CompanyRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CompanyRecord {
    snapshots: BTreeMap<String, KpiSnapshot>,
    current: CurrentKpis,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file; a missing file is an empty store
    pub fn load(path: &Path) -> SyncResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| SyncError::Store(format!("{}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> SyncResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn company_ids(&self) -> Vec<String> {
        self.companies.keys().cloned().collect()
    }
}

impl SnapshotStore for MemoryStore {
    fn upsert(&mut self, company_id: &str, snapshots: &[KpiSnapshot]) -> SyncResult<usize> {
        if company_id.trim().is_empty() {
            return Err(SyncError::Store("company id must not be empty".to_string()));
        }
        let record = self.companies.entry(company_id.to_string()).or_default();
        for snapshot in snapshots {
            record
                .snapshots
                .insert(snapshot.period_date.clone(), snapshot.clone());
        }
        Ok(snapshots.len())
    }

    fn update_current(&mut self, company_id: &str, latest: &KpiSnapshot) -> SyncResult<()> {
        if company_id.trim().is_empty() {
            return Err(SyncError::Store("company id must not be empty".to_string()));
        }
        let current = &mut self
            .companies
            .entry(company_id.to_string())
            .or_default()
            .current;
        // A backfill of older periods never moves the current record back in time
        if current
            .period_date
            .as_deref()
            .is_some_and(|stored| stored > latest.period_date.as_str())
        {
            return Ok(());
        }
        for (field, value) in latest.values() {
            current.values.insert(field.as_str().to_string(), value);
        }
        current.period_date = Some(latest.period_date.clone());
        Ok(())
    }

    fn snapshots(&self, company_id: &str) -> Vec<KpiSnapshot> {
        self.companies
            .get(company_id)
            .map(|r| r.snapshots.values().cloned().collect())
            .unwrap_or_default()
    }

    fn current(&self, company_id: &str) -> Option<CurrentKpis> {
        self.companies.get(company_id).map(|r| r.current.clone())
    }
}
