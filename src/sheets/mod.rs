//! Spreadsheet access: locating CSV export endpoints, fetching and tokenizing them

pub mod csv;
pub mod fetch;
pub mod locator;

pub use csv::tokenize;
pub use fetch::{HttpFetcher, SheetFetcher};
pub use locator::{resolve, spreadsheet_id};
