//! Registry row normalisation.
//!
//! Turns a scraped [`RawRow`] into a typed [`CandidateRecord`], rejecting
//! rows that lack the fields needed to identify and classify a label.

use chrono::NaiveDate;
use thiserror::Error;
use tracing::debug;

use crate::beverage::{CandidateRecord, RawRow};

/// Base URL of the TTB COLA public registry.
pub const REGISTRY_BASE_URL: &str = "https://ttbonline.gov/colasonline";

/// Date format of the registry's "completed" column.
pub const COMPLETED_DATE_FORMAT: &str = "%m/%d/%Y";

/// Why a raw row was dropped.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("missing registry id")]
    MissingRegistryId,
    #[error("missing brand name")]
    MissingBrand,
    #[error("missing class/type description")]
    MissingClassType,
}

/// Converts raw registry rows into candidate records.
#[derive(Debug, Clone)]
pub struct Normalizer {
    base_url: String,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(REGISTRY_BASE_URL)
    }
}

impl Normalizer {
    /// `base_url` resolves relative detail links; trailing slashes are dropped.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn normalize(&self, raw: &RawRow) -> Result<CandidateRecord, Rejection> {
        let registry_id = raw.ttb_id.trim();
        let brand_name = raw.brand_name.trim();
        let class_type_desc = raw.class_type_desc.trim();

        if registry_id.is_empty() {
            return Err(Rejection::MissingRegistryId);
        }
        if brand_name.is_empty() {
            return Err(Rejection::MissingBrand);
        }
        if class_type_desc.is_empty() {
            return Err(Rejection::MissingClassType);
        }

        Ok(CandidateRecord {
            registry_id: registry_id.to_string(),
            brand_name: brand_name.to_string(),
            product_name: non_empty(&raw.fanciful_name),
            class_type_desc: class_type_desc.to_string(),
            class_type_code: non_empty(&raw.class_type_code),
            origin: non_empty(&raw.origin_desc),
            completed_date: non_empty(&raw.completed_date),
            permit_no: non_empty(&raw.permit_no),
            source_url: self.source_url(registry_id, raw.detail_href.as_deref()),
        })
    }

    /// Normalise a batch, returning accepted records and the rejected count.
    pub fn normalize_batch(&self, rows: &[RawRow]) -> (Vec<CandidateRecord>, usize) {
        let mut accepted = Vec::with_capacity(rows.len());
        let mut rejected = 0;
        for row in rows {
            match self.normalize(row) {
                Ok(record) => accepted.push(record),
                Err(reason) => {
                    debug!(ttb_id = %row.ttb_id, %reason, "rejected registry row");
                    rejected += 1;
                }
            }
        }
        (accepted, rejected)
    }

    /// Detail link for a record: the row's own link, else the canonical view URL.
    pub fn source_url(&self, registry_id: &str, href: Option<&str>) -> String {
        match href.map(str::trim).filter(|h| !h.is_empty()) {
            Some(h) if h.starts_with("http") => h.to_string(),
            Some(h) => format!("{}/{}", self.base_url, h.trim_start_matches('/')),
            None => format!(
                "{}/viewColaDetails.do?action=publicDisplaySearchBasic&ttbid={}",
                self.base_url, registry_id
            ),
        }
    }
}

impl CandidateRecord {
    /// Completion date parsed from the registry format, if well-formed.
    pub fn completed_on(&self) -> Option<NaiveDate> {
        self.completed_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, COMPLETED_DATE_FORMAT).ok())
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}
