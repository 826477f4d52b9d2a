//! CLI command handlers

pub mod commands;

pub use commands::{classify, parse, resolve, sync, OutputFormat, SyncArgs};
