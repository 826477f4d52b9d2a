//! API request handlers

use std::sync::{Arc, MutexGuard};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;
use uuid::Uuid;

use super::server::AppState;
use crate::error::SyncError;
use crate::ingest::{ingest_csv, merge};
use crate::sheets;
use crate::store::{CurrentKpis, MemoryStore, SnapshotStore};
use crate::sync::{parse_sheet_payload, store_report, SheetOutcome, SyncPipeline};
use crate::types::{KpiSnapshot, SheetReference};

/// Standard API response wrapper
#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            request_id: Uuid::new_v4().to_string(),
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            request_id: Uuid::new_v4().to_string(),
            data: None,
            error: Some(message.into()),
        }
    }
}

pub type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    (StatusCode::OK, Json(ApiResponse::ok(data)))
}

/// Map a sync error onto an HTTP status
pub fn status_for(err: &SyncError) -> StatusCode {
    match err {
        e if e.is_configuration() => StatusCode::BAD_REQUEST,
        SyncError::NoValidSnapshots => StatusCode::UNPROCESSABLE_ENTITY,
        SyncError::Fetch(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn fail<T: Serialize>(err: SyncError) -> ApiResult<T> {
    (status_for(&err), Json(ApiResponse::err(err.to_string())))
}

/// Health check response
#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// GET /health - Health check
pub async fn health() -> impl IntoResponse {
    ok(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Version response
#[derive(Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub features: Vec<String>,
}

/// GET /version - Server version
pub async fn version(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ok(VersionResponse {
        version: state.version.clone(),
        features: vec![
            "resolve".to_string(),
            "parse".to_string(),
            "sync".to_string(),
        ],
    })
}

/// Resolve request
#[derive(Deserialize)]
pub struct ResolveRequest {
    pub url: String,
    #[serde(default)]
    pub tab: Option<String>,
}

/// Resolve response
#[derive(Serialize, Deserialize)]
pub struct ResolveResponse {
    pub csv_url: String,
}

/// POST /api/v1/resolve - CSV export URL for a sheet link
pub async fn resolve(Json(req): Json<ResolveRequest>) -> ApiResult<ResolveResponse> {
    match sheets::resolve(&req.url, req.tab.as_deref()) {
        Ok(csv_url) => ok(ResolveResponse { csv_url }),
        Err(e) => fail(e),
    }
}

/// Parse request
#[derive(Deserialize)]
pub struct ParseRequest {
    pub csv: String,
}

/// Parse response
#[derive(Serialize, Deserialize)]
pub struct ParseResponse {
    pub snapshots: Vec<KpiSnapshot>,
    pub rows_discarded: usize,
}

/// POST /api/v1/parse - Ingest inline CSV text
pub async fn parse(Json(req): Json<ParseRequest>) -> ApiResult<ParseResponse> {
    match ingest_csv(&req.csv, None, 0) {
        Ok(ingest) => ok(ParseResponse {
            rows_discarded: ingest.rows_discarded,
            snapshots: merge(ingest.snapshots),
        }),
        Err(reason) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiResponse::err(reason.to_string())),
        ),
    }
}

/// Sync request.
///
/// `sheets` is either a legacy URL string (paired with `tab`), a
/// JSON-encoded array string, or an array of `{url, tab}` objects.
#[derive(Deserialize)]
pub struct SyncRequest {
    pub company_id: String,
    #[serde(default)]
    pub sheets: Value,
    #[serde(default)]
    pub tab: Option<String>,
}

/// Sync response
#[derive(Serialize, Deserialize)]
pub struct SyncResponse {
    pub company_id: String,
    pub snapshots: Vec<KpiSnapshot>,
    pub latest: Option<KpiSnapshot>,
    pub partial: bool,
    pub sheets: Vec<Value>,
}

/// Normalize the request's sheet payload into references
pub fn sheet_references(
    sheets: &Value,
    tab: Option<&str>,
) -> Result<Vec<SheetReference>, SyncError> {
    match sheets {
        Value::String(payload) => parse_sheet_payload(payload, tab),
        Value::Array(_) => parse_sheet_payload(&sheets.to_string(), None),
        Value::Null => Err(SyncError::NoSheetsConfigured),
        other => Err(SyncError::InvalidReference(format!(
            "sheets must be a string or an array, got {}",
            other
        ))),
    }
}

/// Lock the shared store. Only call from blocking tasks, never an async worker.
fn lock_store(state: &AppState) -> Result<MutexGuard<'_, MemoryStore>, SyncError> {
    state
        .store
        .lock()
        .map_err(|_| SyncError::Store("store lock poisoned".to_string()))
}

fn outcome_json(outcome: &SheetOutcome) -> Value {
    serde_json::to_value(outcome).unwrap_or(Value::Null)
}

/// POST /api/v1/sync - Fetch, merge and store KPI snapshots
pub async fn sync(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SyncRequest>,
) -> ApiResult<SyncResponse> {
    let refs = match sheet_references(&req.sheets, req.tab.as_deref()) {
        Ok(refs) => refs,
        Err(e) => return fail(e),
    };
    if req.company_id.trim().is_empty() {
        return fail(SyncError::Config("company_id is required".to_string()));
    }

    let company_id = req.company_id.clone();
    let task_state = Arc::clone(&state);
    let joined = tokio::task::spawn_blocking(move || {
        // Fetching runs unlocked; the store is only held while writing results
        let pipeline = SyncPipeline::new(Arc::clone(&task_state.fetcher));
        let report = pipeline.run(&refs)?;

        let mut store = lock_store(&task_state)?;
        store_report(&company_id, &report, &mut *store)?;
        if let Some(path) = &task_state.store_path {
            store.save(path)?;
        }
        Ok::<_, SyncError>(report)
    })
    .await;

    match joined {
        Ok(Ok(report)) => ok(SyncResponse {
            company_id: req.company_id,
            partial: report.is_partial(),
            sheets: report.sheets.iter().map(outcome_json).collect(),
            latest: report.latest,
            snapshots: report.snapshots,
        }),
        Ok(Err(e)) => fail(e),
        Err(e) => {
            error!("Sync task failed: {}", e);
            fail(SyncError::Store(format!("sync task failed: {}", e)))
        }
    }
}

/// Stored KPIs for one company
#[derive(Serialize, Deserialize)]
pub struct CompanyKpisResponse {
    pub company_id: String,
    pub snapshots: Vec<KpiSnapshot>,
    pub current: Option<CurrentKpis>,
}

/// GET /api/v1/companies/:company_id/kpis
pub async fn company_kpis(
    State(state): State<Arc<AppState>>,
    Path(company_id): Path<String>,
) -> ApiResult<CompanyKpisResponse> {
    let task_state = Arc::clone(&state);
    let lookup = company_id.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let store = lock_store(&task_state)?;
        Ok::<_, SyncError>((store.snapshots(&lookup), store.current(&lookup)))
    })
    .await;

    let (snapshots, current) = match joined {
        Ok(Ok(found)) => found,
        Ok(Err(e)) => return fail(e),
        Err(e) => {
            error!("Store lookup task failed: {}", e);
            return fail(SyncError::Store(format!("store lookup failed: {}", e)));
        }
    };

    if snapshots.is_empty() && current.is_none() {
        return (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err(format!("No KPIs stored for '{}'", company_id))),
        );
    }
    ok(CompanyKpisResponse {
        company_id,
        snapshots,
        current,
    })
}
