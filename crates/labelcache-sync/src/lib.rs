//! Sync layer: registry retrieval, cache reconciliation and staleness refresh.

mod error;
pub mod pipeline;
pub mod reconcile;
pub mod refresh;
pub mod registry;

#[cfg(feature = "http")]
pub mod http;

pub use error::{CancelFlag, SyncError};
pub use pipeline::{search_candidates, seed_category};
pub use reconcile::{BatchReport, Candidate, Decision, Reconciler, SkipReason};
pub use refresh::{RefreshConfig, RefreshReport, Refresher};
pub use registry::{ApprovalQuery, BRAND_SEARCH_MONTHS, RegistryError, RegistrySource};

#[cfg(feature = "http")]
pub use http::{ClientConfig, TtbClient};
