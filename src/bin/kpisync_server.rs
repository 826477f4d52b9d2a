//! kpisync API server binary
//!
//! HTTP front end for KPI sheet syncs.

use clap::Parser;
use kpisync::api::{run_api_server, server::ApiConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kpisync-server")]
#[command(version)]
#[command(about = "kpisync API Server - HTTP API for Google Sheets KPI syncs")]
#[command(long_about = r#"
kpisync API Server

Endpoints:
  - POST /api/v1/sync                     - Fetch, merge and store KPI sheets
  - POST /api/v1/parse                    - Parse inline CSV text
  - POST /api/v1/resolve                  - CSV export URL for a sheet link
  - GET  /api/v1/companies/{id}/kpis      - Stored snapshots and current KPIs
  - GET  /health, GET /version

Example usage:
  kpisync-server                           # Start on localhost:8080
  kpisync-server --host 0.0.0.0 --port 3000 --store kpis.json

  curl -X POST http://localhost:8080/api/v1/sync \
    -H "Content-Type: application/json" \
    -d '{"company_id": "acme", "sheets": [{"url": "https://docs.google.com/spreadsheets/d/abc/edit", "tab": "0"}]}'
"#)]
struct Args {
    /// Host address to bind to (use 0.0.0.0 for all interfaces)
    #[arg(short = 'H', long, default_value = "127.0.0.1", env = "KPISYNC_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080", env = "KPISYNC_PORT")]
    port: u16,

    /// JSON file to persist stored snapshots in
    #[arg(long, env = "KPISYNC_STORE")]
    store: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ApiConfig {
        host: args.host,
        port: args.port,
        store_path: args.store,
    };

    run_api_server(config).await
}
