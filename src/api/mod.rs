//! kpisync API server
//!
//! HTTP front end for sync requests. Run with `kpisync-server`.

pub mod handlers;
pub mod server;

pub use server::{router, run_api_server};
