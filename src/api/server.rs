//! kpisync API server implementation
//!
//! Axum router with CORS and request tracing. Sync requests run on the
//! blocking pool since sheet fetching is synchronous.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers;
use crate::sheets::{HttpFetcher, SheetFetcher};
use crate::store::MemoryStore;

/// API Server configuration
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// JSON file backing the snapshot store; in-memory only when unset
    pub store_path: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            store_path: None,
        }
    }
}

/// Shared application state
pub struct AppState {
    pub version: String,
    pub store: Mutex<MemoryStore>,
    pub store_path: Option<PathBuf>,
    /// Source of sheet bodies for `/api/v1/sync`
    pub fetcher: Arc<dyn SheetFetcher + Send + Sync>,
}

impl AppState {
    pub fn new(
        store: MemoryStore,
        store_path: Option<PathBuf>,
        fetcher: Arc<dyn SheetFetcher + Send + Sync>,
    ) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            store: Mutex::new(store),
            store_path,
            fetcher,
        }
    }
}

/// Build the router; separate from [`run_api_server`] so tests can drive it directly
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/version", get(handlers::version))
        .route("/api/v1/resolve", post(handlers::resolve))
        .route("/api/v1/parse", post(handlers::parse))
        .route("/api/v1/sync", post(handlers::sync))
        .route("/api/v1/companies/:company_id/kpis", get(handlers::company_kpis))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Run the API server
pub async fn run_api_server(config: ApiConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("KPISYNC_LOG")
                .unwrap_or_else(|_| "kpisync=info,tower_http=info".into()),
        )
        .init();

    let store = match &config.store_path {
        Some(path) => MemoryStore::load(path)?,
        None => MemoryStore::new(),
    };
    // reqwest's blocking client cannot be built on an async worker thread
    let user_agent = format!("kpisync/{}", env!("CARGO_PKG_VERSION"));
    let fetcher = tokio::task::spawn_blocking(move || HttpFetcher::new(&user_agent)).await??;
    let state = Arc::new(AppState::new(
        store,
        config.store_path.clone(),
        Arc::new(fetcher),
    ));
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("kpisync API server starting on http://{}", addr);
    info!("   Endpoints: /api/v1/sync, /api/v1/parse, /api/v1/resolve, /api/v1/companies/:id/kpis");
    if let Some(path) = &config.store_path {
        info!("   Store: {}", path.display());
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("kpisync API server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server...");
}
