//! Cross-sheet merging of snapshots that share a period
//!
//! Summed fields add up when both sides have a value. Churn, growth and
//! runway take the later non-null value. Input order is therefore part of
//! the contract: later sheets win for those three fields.

use crate::types::{KpiField, KpiSnapshot, MergeRule};
use std::collections::BTreeMap;

/// Running merge state keyed by `period_date`
pub type MergeState = BTreeMap<String, KpiSnapshot>;

/// Combine `incoming` into `existing` (same period)
pub fn combine(existing: &mut KpiSnapshot, incoming: &KpiSnapshot) {
    for field in KpiField::ALL {
        let merged = match (existing.get(field), incoming.get(field), field.merge_rule()) {
            (Some(a), Some(b), MergeRule::Sum) => Some(a + b),
            (_, Some(b), MergeRule::LatestWins) => Some(b),
            (a, None, _) => a,
            (None, b, MergeRule::Sum) => b,
        };
        existing.set(field, merged);
    }
}

/// Fold snapshots into the running state in order
pub fn merge_into(state: &mut MergeState, snapshots: impl IntoIterator<Item = KpiSnapshot>) {
    for snapshot in snapshots {
        match state.get_mut(&snapshot.period_date) {
            Some(existing) => combine(existing, &snapshot),
            None => {
                state.insert(snapshot.period_date.clone(), snapshot);
            }
        }
    }
}

/// Merge snapshots into one per period, sorted by `period_date`
pub fn merge(snapshots: impl IntoIterator<Item = KpiSnapshot>) -> Vec<KpiSnapshot> {
    let mut state = MergeState::new();
    merge_into(&mut state, snapshots);
    state.into_values().collect()
}

/// The snapshot with the greatest `period_date`
pub fn latest(snapshots: &[KpiSnapshot]) -> Option<&KpiSnapshot> {
    snapshots.iter().max_by(|a, b| a.period_date.cmp(&b.period_date))
}
