//! Registry retrieval collaborator.
//!
//! The core only needs raw result rows; how they are fetched (HTTP form
//! posts, HTML scraping, politeness delays) belongs to the implementation.

use async_trait::async_trait;
use labelcache_core::{Category, RawRow};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[cfg(feature = "http")]
    #[error("HTTP request to registry failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("registry returned HTTP {status}")]
    Server { status: u16 },

    #[error("failed to parse registry response: {0}")]
    Parse(String),
}

/// A search for recently completed label approvals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalQuery {
    /// Restrict to one category's class/type code range; `None` for all.
    pub category: Option<Category>,
    /// Exact product or fanciful name; `None` searches every label.
    pub brand: Option<String>,
    /// Look-back window, in months of 30 days.
    pub months_back: u32,
    /// Maximum rows returned.
    pub limit: usize,
}

/// Look-back used for brand searches, where recall matters more than recency.
pub const BRAND_SEARCH_MONTHS: u32 = 60;

impl ApprovalQuery {
    /// Search one brand's approvals over [`BRAND_SEARCH_MONTHS`].
    pub fn for_brand(brand: &str, category: Option<Category>, limit: usize) -> Self {
        Self {
            category,
            brand: Some(brand.trim().to_string()),
            months_back: BRAND_SEARCH_MONTHS,
            limit,
        }
    }
}

impl Default for ApprovalQuery {
    fn default() -> Self {
        Self {
            category: None,
            brand: None,
            months_back: 6,
            limit: 100,
        }
    }
}

/// Source of raw registry rows.
///
/// Rows are returned unvalidated; missing or malformed fields are the
/// normaliser's concern.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    async fn fetch_approvals(&self, query: &ApprovalQuery) -> Result<Vec<RawRow>, RegistryError>;
}
