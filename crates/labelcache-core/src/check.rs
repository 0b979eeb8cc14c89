//! Label validation against cached known beverages.
//!
//! A label's stated ABV is compared with the best cached entry: an exact
//! brand + class/type match is held to a tight tolerance, a brand-only match
//! to a looser one. Independently the ABV must be plausible for the label's
//! category; values outside the category's typical range only warn.

use chrono::{DateTime, Utc};
use serde::Serialize;
use strsim::jaro_winkler;

use crate::beverage::{CacheEntry, Category};
use crate::infer::classify;

/// Facts read off the label being validated.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelFacts {
    pub brand_name: String,
    pub class_type: String,
    pub abv: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckPolicy {
    /// Maximum ABV deviation (percentage points) for an exact match.
    pub exact_tolerance: f64,
    /// Maximum ABV deviation for a brand-only match.
    pub brand_tolerance: f64,
    /// Entries older than this many days produce a staleness warning.
    pub staleness_threshold_days: i64,
}

impl Default for CheckPolicy {
    fn default() -> Self {
        Self {
            exact_tolerance: 1.0,
            brand_tolerance: 2.0,
            staleness_threshold_days: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    BrandOnly,
    Unmatched,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelCheck {
    pub match_kind: MatchKind,
    pub matched: Option<CacheEntry>,
    /// Jaro-Winkler similarity of the label's class/type to the matched
    /// entry's; `1.0` for an exact match.
    pub class_similarity: Option<f64>,
    /// `|label ABV - cached ABV|`, when both are known.
    pub abv_deviation: Option<f64>,
    pub category: Category,
    pub abv_in_category_range: bool,
    pub warnings: Vec<String>,
    pub passed: bool,
}

/// Validate `facts` against cache lookups.
///
/// `exact` holds entries matching brand and class/type, `by_brand` entries
/// matching brand only; both ordered best-first (verified entries first).
pub fn check_label(
    facts: &LabelFacts,
    exact: &[CacheEntry],
    by_brand: &[CacheEntry],
    policy: &CheckPolicy,
    now: DateTime<Utc>,
) -> LabelCheck {
    let (match_kind, matched, class_similarity, tolerance) = if let Some(e) = exact.first() {
        (MatchKind::Exact, Some(e.clone()), Some(1.0), policy.exact_tolerance)
    } else if let Some((e, similarity)) = closest_class(&facts.class_type, by_brand) {
        (
            MatchKind::BrandOnly,
            Some(e.clone()),
            Some(similarity),
            policy.brand_tolerance,
        )
    } else {
        (MatchKind::Unmatched, None, None, 0.0)
    };

    let mut warnings = Vec::new();
    let mut passed = true;
    let mut abv_deviation = None;

    if let Some(entry) = &matched {
        if entry.is_stale(policy.staleness_threshold_days, now) {
            warnings.push(format!(
                "cache entry for '{}' is older than {} days (source: {}); consider refreshing",
                entry.brand_name, policy.staleness_threshold_days, entry.source
            ));
        }
        match entry.abv {
            Some(known) => {
                let deviation = (facts.abv - known).abs();
                abv_deviation = Some(deviation);
                if deviation > tolerance {
                    passed = false;
                    warnings.push(format!(
                        "label ABV {:.1}% differs from known {:.1}% ({}) by more than {:.1} points",
                        facts.abv, known, entry.class_type, tolerance
                    ));
                }
            }
            None => warnings.push(format!(
                "cache entry for '{}' has no ABV to compare",
                entry.brand_name
            )),
        }
    }

    let category = matched
        .as_ref()
        .map(|e| e.beverage_category)
        .unwrap_or_else(|| classify(&facts.class_type, None));
    let (lo, hi) = category.abv_range();
    let abv_in_category_range = (lo..=hi).contains(&facts.abv);
    if !abv_in_category_range {
        passed = false;
        warnings.push(format!(
            "label ABV {:.1}% outside {} range {:.1}-{:.1}%",
            facts.abv, category, lo, hi
        ));
    } else {
        let (typical_lo, typical_hi) = category.typical_abv_range();
        if !(typical_lo..=typical_hi).contains(&facts.abv) {
            warnings.push(format!(
                "label ABV {:.1}% is unusual for {} (typical {:.1}-{:.1}%) but within legal limits",
                facts.abv, category, typical_lo, typical_hi
            ));
        }
    }

    LabelCheck {
        match_kind,
        matched,
        class_similarity,
        abv_deviation,
        category,
        abv_in_category_range,
        warnings,
        passed,
    }
}

/// Brand entry whose class/type reads most like `class_type`; earlier
/// entries win ties.
fn closest_class<'a>(class_type: &str, by_brand: &'a [CacheEntry]) -> Option<(&'a CacheEntry, f64)> {
    let wanted = class_type.trim().to_lowercase();
    let mut best: Option<(&CacheEntry, f64)> = None;
    for entry in by_brand {
        let similarity = jaro_winkler(&wanted, &entry.class_type.trim().to_lowercase());
        if best.is_none_or(|(_, s)| similarity > s) {
            best = Some((entry, similarity));
        }
    }
    best
}
