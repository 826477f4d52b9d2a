use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

//==============================================================================
// KPI Fields
//==============================================================================

/// The fixed set of tracked startup KPIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiField {
    Mrr,
    Arr,
    BurnRate,
    Churn,
    GrowthPercent,
    RunwayMonths,
    LeadVelocity,
    CashBalance,
    Customers,
}

/// How two values for the same period combine during a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRule {
    /// Both values are added together
    Sum,
    /// The later sheet's non-null value replaces the running value
    LatestWins,
}

impl KpiField {
    /// Every field, in storage column order
    pub const ALL: [KpiField; 9] = [
        KpiField::Mrr,
        KpiField::Arr,
        KpiField::BurnRate,
        KpiField::Churn,
        KpiField::GrowthPercent,
        KpiField::RunwayMonths,
        KpiField::LeadVelocity,
        KpiField::CashBalance,
        KpiField::Customers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KpiField::Mrr => "mrr",
            KpiField::Arr => "arr",
            KpiField::BurnRate => "burn_rate",
            KpiField::Churn => "churn",
            KpiField::GrowthPercent => "growth_percent",
            KpiField::RunwayMonths => "runway_months",
            KpiField::LeadVelocity => "lead_velocity",
            KpiField::CashBalance => "cash_balance",
            KpiField::Customers => "customers",
        }
    }

    /// Fields stored as whole percentage points (5% -> 5.0) instead of fractions
    pub fn is_percentage_points(&self) -> bool {
        matches!(self, KpiField::Churn | KpiField::GrowthPercent)
    }

    pub fn merge_rule(&self) -> MergeRule {
        match self {
            KpiField::Churn | KpiField::GrowthPercent | KpiField::RunwayMonths => {
                MergeRule::LatestWins
            }
            _ => MergeRule::Sum,
        }
    }
}

impl fmt::Display for KpiField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KpiField {
    type Err = String;

    /// Accepts the canonical snake_case names, case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace([' ', '-'], "_");
        KpiField::ALL
            .into_iter()
            .find(|field| field.as_str() == wanted)
            .ok_or_else(|| format!("Unknown KPI field '{}'", s))
    }
}

//==============================================================================
// Snapshots
//==============================================================================

/// All KPI values recorded for one calendar month.
///
/// `period_date` is always the first day of the month (`YYYY-MM-01`), so two
/// snapshots describe the same period exactly when the strings are equal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiSnapshot {
    pub period_date: String,
    pub mrr: Option<f64>,
    pub arr: Option<f64>,
    pub burn_rate: Option<f64>,
    pub churn: Option<f64>,
    pub growth_percent: Option<f64>,
    pub runway_months: Option<f64>,
    pub lead_velocity: Option<f64>,
    pub cash_balance: Option<f64>,
    pub customers: Option<f64>,
}

impl KpiSnapshot {
    pub fn new(period_date: impl Into<String>) -> Self {
        Self {
            period_date: period_date.into(),
            ..Self::default()
        }
    }

    pub fn get(&self, field: KpiField) -> Option<f64> {
        match field {
            KpiField::Mrr => self.mrr,
            KpiField::Arr => self.arr,
            KpiField::BurnRate => self.burn_rate,
            KpiField::Churn => self.churn,
            KpiField::GrowthPercent => self.growth_percent,
            KpiField::RunwayMonths => self.runway_months,
            KpiField::LeadVelocity => self.lead_velocity,
            KpiField::CashBalance => self.cash_balance,
            KpiField::Customers => self.customers,
        }
    }

    pub fn set(&mut self, field: KpiField, value: Option<f64>) {
        let slot = match field {
            KpiField::Mrr => &mut self.mrr,
            KpiField::Arr => &mut self.arr,
            KpiField::BurnRate => &mut self.burn_rate,
            KpiField::Churn => &mut self.churn,
            KpiField::GrowthPercent => &mut self.growth_percent,
            KpiField::RunwayMonths => &mut self.runway_months,
            KpiField::LeadVelocity => &mut self.lead_velocity,
            KpiField::CashBalance => &mut self.cash_balance,
            KpiField::Customers => &mut self.customers,
        };
        *slot = value;
    }

    /// Builder-style setter, mostly useful in tests and fixtures
    #[must_use]
    pub fn with(mut self, field: KpiField, value: f64) -> Self {
        self.set(field, Some(value));
        self
    }

    /// True when at least one KPI field carries a value
    pub fn has_values(&self) -> bool {
        KpiField::ALL.iter().any(|f| self.get(*f).is_some())
    }

    /// Non-null fields with their values, in storage order
    pub fn values(&self) -> Vec<(KpiField, f64)> {
        KpiField::ALL
            .iter()
            .filter_map(|f| self.get(*f).map(|v| (*f, v)))
            .collect()
    }
}

//==============================================================================
// Sheet References
//==============================================================================

/// One spreadsheet source: a URL plus an optional tab (numeric gid or tab name)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetReference {
    pub url: String,
    #[serde(default, deserialize_with = "deserialize_tab")]
    pub tab: Option<String>,
}

impl SheetReference {
    pub fn new(url: impl Into<String>, tab: Option<String>) -> Self {
        Self {
            url: url.into(),
            tab,
        }
    }
}

/// Tabs arrive as strings, bare numbers (gids) or null
fn deserialize_tab<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

//==============================================================================
// Header Classification
//==============================================================================

/// Semantic role of one header cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderRole {
    Kpi(KpiField),
    Month,
    Year,
    Unrecognized,
}

impl fmt::Display for HeaderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderRole::Kpi(field) => write!(f, "{}", field),
            HeaderRole::Month => f.write_str("month"),
            HeaderRole::Year => f.write_str("year"),
            HeaderRole::Unrecognized => f.write_str("-"),
        }
    }
}

/// Column roles for one sheet's header row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderClassification {
    pub kpi_columns: BTreeMap<usize, KpiField>,
    pub month_column: Option<usize>,
    pub year_column: Option<usize>,
}

impl HeaderClassification {
    pub fn role(&self, index: usize) -> HeaderRole {
        if self.month_column == Some(index) {
            HeaderRole::Month
        } else if self.year_column == Some(index) {
            HeaderRole::Year
        } else if let Some(field) = self.kpi_columns.get(&index) {
            HeaderRole::Kpi(*field)
        } else {
            HeaderRole::Unrecognized
        }
    }

    pub fn has_kpi_columns(&self) -> bool {
        !self.kpi_columns.is_empty()
    }

    /// True when some column already claims this field
    pub fn claims(&self, field: KpiField) -> bool {
        self.kpi_columns.values().any(|f| *f == field)
    }

    /// True when the column already has any role
    pub fn is_assigned(&self, index: usize) -> bool {
        self.role(index) != HeaderRole::Unrecognized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_round_trip_through_from_str() {
        for field in KpiField::ALL {
            assert_eq!(field.as_str().parse::<KpiField>(), Ok(field));
        }
        assert_eq!("Burn Rate".parse::<KpiField>(), Ok(KpiField::BurnRate));
        assert!("revenue".parse::<KpiField>().is_err());
    }

    #[test]
    fn test_merge_rules() {
        assert_eq!(KpiField::Mrr.merge_rule(), MergeRule::Sum);
        assert_eq!(KpiField::Customers.merge_rule(), MergeRule::Sum);
        assert_eq!(KpiField::Churn.merge_rule(), MergeRule::LatestWins);
        assert_eq!(KpiField::RunwayMonths.merge_rule(), MergeRule::LatestWins);
    }

    #[test]
    fn test_snapshot_has_values() {
        let empty = KpiSnapshot::new("2024-01-01");
        assert!(!empty.has_values());
        let filled = empty.with(KpiField::CashBalance, 10.0);
        assert!(filled.has_values());
        assert_eq!(filled.values(), vec![(KpiField::CashBalance, 10.0)]);
    }

    #[test]
    fn test_sheet_reference_tab_accepts_numbers_and_blanks() {
        let refs: Vec<SheetReference> = serde_json::from_str(
            r#"[{"url":"a","tab":0},{"url":"b","tab":"  "},{"url":"c"},{"url":"d","tab":"Q1"}]"#,
        )
        .unwrap();
        assert_eq!(refs[0].tab.as_deref(), Some("0"));
        assert_eq!(refs[1].tab, None);
        assert_eq!(refs[2].tab, None);
        assert_eq!(refs[3].tab.as_deref(), Some("Q1"));
    }

    #[test]
    fn test_classification_roles() {
        let mut c = HeaderClassification {
            month_column: Some(0),
            year_column: Some(1),
            ..Default::default()
        };
        c.kpi_columns.insert(2, KpiField::Arr);
        assert_eq!(c.role(0), HeaderRole::Month);
        assert_eq!(c.role(1), HeaderRole::Year);
        assert_eq!(c.role(2), HeaderRole::Kpi(KpiField::Arr));
        assert_eq!(c.role(3), HeaderRole::Unrecognized);
        assert!(c.claims(KpiField::Arr));
        assert!(!c.claims(KpiField::Mrr));
    }
}
