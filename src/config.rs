//! Sync configuration
//!
//! Loaded from a YAML file, then overridden by CLI flags and environment
//! variables (see `src/main.rs`).
//!
//! ```yaml
//! company_id: acme
//! sheets:
//!   - url: https://docs.google.com/spreadsheets/d/abc/edit
//!     tab: KPIs
//!   - url: https://docs.google.com/spreadsheets/d/def/edit
//!     tab: 0
//! classifier_command: ["python3", "map_headers.py"]
//! classifier_timeout_secs: 10
//! debug_sample_rows: 3
//! ```

use crate::error::{SyncError, SyncResult};
use crate::ingest::CommandClassifier;
use crate::sheets::resolve;
use crate::types::SheetReference;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn default_timeout_secs() -> u64 {
    10
}

fn default_sample_rows() -> usize {
    3
}

fn default_user_agent() -> String {
    format!("kpisync/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub company_id: Option<String>,

    /// Processed in order; later sheets win for latest-wins fields
    #[serde(default)]
    pub sheets: Vec<SheetReference>,

    /// Optional external header classifier (program + arguments)
    #[serde(default)]
    pub classifier_command: Option<Vec<String>>,

    #[serde(default = "default_timeout_secs")]
    pub classifier_timeout_secs: u64,

    /// Data rows per sheet logged at debug level
    #[serde(default = "default_sample_rows")]
    pub debug_sample_rows: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            company_id: None,
            sheets: Vec::new(),
            classifier_command: None,
            classifier_timeout_secs: default_timeout_secs(),
            debug_sample_rows: default_sample_rows(),
            user_agent: default_user_agent(),
        }
    }
}

impl SyncConfig {
    pub fn load(path: &Path) -> SyncResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> SyncResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Reject configurations that cannot start a sync
    pub fn validate(&self) -> SyncResult<()> {
        if self.sheets.is_empty() {
            return Err(SyncError::NoSheetsConfigured);
        }
        for sheet in &self.sheets {
            resolve(&sheet.url, sheet.tab.as_deref())?;
        }
        if let Some(command) = &self.classifier_command {
            if command.first().map_or(true, |p| p.trim().is_empty()) {
                return Err(SyncError::Config(
                    "classifier_command must name a program".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn classifier(&self) -> Option<CommandClassifier> {
        self.classifier_command.as_ref().map(|command| {
            CommandClassifier::new(
                command.clone(),
                Duration::from_secs(self.classifier_timeout_secs),
            )
        })
    }
}
