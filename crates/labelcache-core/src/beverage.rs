//! Beverage label types shared between the registry pipeline and the cache.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity-key value used in place of an ABV that could not be inferred.
///
/// Never equal to a rendered ABV, so an unknown-ABV product and a zero-ABV
/// product always have distinct identities.
pub const MISSING_ABV_KEY: &str = "unknown";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown beverage category: {0}")]
pub struct UnknownCategory(pub String);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown cache source: {0}")]
pub struct UnknownSource(pub String);

/// Regulatory beverage category (27 CFR parts 4, 5 and 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Wine,
    DistilledSpirits,
    MaltBeverage,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::Wine,
        Category::DistilledSpirits,
        Category::MaltBeverage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wine => "wine",
            Self::DistilledSpirits => "distilled_spirits",
            Self::MaltBeverage => "malt_beverage",
        }
    }

    /// Inclusive range of registry class/type codes belonging to this category.
    pub fn code_range(&self) -> (u32, u32) {
        match self {
            Self::Wine => (80, 89),
            Self::DistilledSpirits => (100, 699),
            Self::MaltBeverage => (900, 999),
        }
    }

    /// Category owning a numeric class/type code, if any.
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| {
            let (lo, hi) = c.code_range();
            (lo..=hi).contains(&code)
        })
    }

    /// Plausible ABV range (percent, inclusive) for a label in this category.
    pub fn abv_range(&self) -> (f64, f64) {
        match self {
            Self::Wine => (5.0, 24.0),
            Self::DistilledSpirits => (30.0, 95.0),
            Self::MaltBeverage => (0.5, 15.0),
        }
    }

    /// Where most labels in this category fall; narrower than [`abv_range`](Self::abv_range).
    pub fn typical_abv_range(&self) -> (f64, f64) {
        match self {
            Self::Wine => (7.0, 24.0),
            Self::DistilledSpirits => (40.0, 50.0),
            Self::MaltBeverage => (3.0, 12.0),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wine" => Ok(Self::Wine),
            "distilled_spirits" => Ok(Self::DistilledSpirits),
            "malt_beverage" => Ok(Self::MaltBeverage),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

/// System a cache entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// TTB COLA public registry. Authoritative.
    #[serde(rename = "ttb_cola")]
    TtbCola,
    /// Retailer catalogue import.
    #[serde(rename = "total_wine")]
    Retailer,
    #[serde(rename = "manual")]
    Manual,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TtbCola => "ttb_cola",
            Self::Retailer => "total_wine",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ttb_cola" => Ok(Self::TtbCola),
            "total_wine" => Ok(Self::Retailer),
            "manual" => Ok(Self::Manual),
            other => Err(UnknownSource(other.to_string())),
        }
    }
}

/// One row of the registry search results table, as scraped.
///
/// All ten columns are kept as trimmed text; nothing is validated here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub ttb_id: String,
    pub permit_no: String,
    pub serial_number: String,
    /// `MM/DD/YYYY` in the registry's format.
    pub completed_date: String,
    pub fanciful_name: String,
    pub brand_name: String,
    pub origin_code: String,
    pub origin_desc: String,
    pub class_type_code: String,
    pub class_type_desc: String,
    /// `href` of the link in the TTB ID cell, if the row had one.
    pub detail_href: Option<String>,
}

/// A registry row that passed normalisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub registry_id: String,
    pub brand_name: String,
    /// Fanciful name.
    pub product_name: Option<String>,
    pub class_type_desc: String,
    pub class_type_code: Option<String>,
    pub origin: Option<String>,
    pub completed_date: Option<String>,
    pub permit_no: Option<String>,
    pub source_url: String,
}

/// Which rule produced an inferred ABV.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum AbvBasis {
    /// Exact rule-table hit on the whole description.
    Exact,
    /// Keyword from one of the ordered category groups.
    Keyword(&'static str),
    /// Lone category keyword (`WINE`, `SPIRIT`, `MALT`, ...).
    Broad(&'static str),
    /// Nothing matched.
    Unmatched,
}

/// Category and ABV derived from a class/type description.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InferredAttributes {
    pub category: Category,
    /// Percent. `None` means the description carried too little information.
    pub abv: Option<f64>,
    pub basis: AbvBasis,
}

/// Case-insensitive `(brand, product, abv)` identity of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub brand: String,
    pub product: String,
    pub abv: String,
}

impl IdentityKey {
    pub fn new(brand_name: &str, product_name: Option<&str>, abv: Option<f64>) -> Self {
        Self {
            brand: brand_name.trim().to_lowercase(),
            product: product_name.unwrap_or("").trim().to_lowercase(),
            abv: abv_key(abv),
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.brand, self.product, self.abv)
    }
}

/// Render an ABV as the text component of an [`IdentityKey`].
///
/// Rounded to two decimals so `12.0` and `12.000001` collapse together.
pub fn abv_key(abv: Option<f64>) -> String {
    match abv {
        Some(v) => format!("{v:.2}"),
        None => MISSING_ABV_KEY.to_string(),
    }
}

/// A cache entry about to be written; the store supplies timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCacheEntry {
    pub brand_name: String,
    pub product_name: Option<String>,
    pub class_type: String,
    pub beverage_category: Category,
    pub abv: Option<f64>,
    pub country_of_origin: Option<String>,
    pub producer: Option<String>,
    pub standard_size_ml: Option<i32>,
    pub source: Source,
    pub source_url: Option<String>,
    pub notes: Option<String>,
    pub is_verified: bool,
}

impl NewCacheEntry {
    pub fn identity(&self) -> IdentityKey {
        IdentityKey::new(&self.brand_name, self.product_name.as_deref(), self.abv)
    }
}

/// A stored known-beverage row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub brand_name: String,
    pub product_name: Option<String>,
    pub class_type: String,
    pub beverage_category: Category,
    pub abv: Option<f64>,
    pub country_of_origin: Option<String>,
    pub producer: Option<String>,
    pub standard_size_ml: Option<i32>,
    pub source: Source,
    pub source_url: Option<String>,
    pub notes: Option<String>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn identity(&self) -> IdentityKey {
        IdentityKey::new(&self.brand_name, self.product_name.as_deref(), self.abv)
    }

    /// Whole days since the entry was created (or last refreshed).
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.created_at).num_days()
    }

    /// True when the entry is strictly older than `threshold_days`.
    pub fn is_stale(&self, threshold_days: i64, now: DateTime<Utc>) -> bool {
        self.age_days(now) > threshold_days
    }
}
