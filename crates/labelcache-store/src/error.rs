use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[error("invalid value in column {column}: {value}")]
    InvalidValue { column: &'static str, value: String },

    /// Failure raised by a non-DuckDB repository implementation.
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Whether the failure left the enclosing transaction unusable.
    ///
    /// DuckDB invalidates an open transaction on any failed statement; only
    /// `ROLLBACK` is accepted afterwards.
    pub fn aborts_transaction(&self) -> bool {
        match self {
            #[cfg(feature = "duckdb")]
            Self::DuckDb(_) => true,
            _ => false,
        }
    }
}
