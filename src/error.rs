use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid spreadsheet reference: {0}")]
    InvalidReference(String),

    #[error("No sheets configured for sync")]
    NoSheetsConfigured,

    #[error("No valid KPI snapshots found in any sheet")]
    NoValidSnapshots,

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SyncError {
    /// Errors caused by what the caller supplied rather than by sheet contents.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidReference(_) | SyncError::NoSheetsConfigured | SyncError::Config(_)
        )
    }
}
