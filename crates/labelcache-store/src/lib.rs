//! Storage layer: the `known_beverages` cache table, backed by DuckDB.

mod error;
mod repo;

pub use error::StoreError;
pub use repo::{CacheRepo, UpsertOutcome};

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckStore;
