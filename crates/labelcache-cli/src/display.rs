//! Human-readable reports for batch runs, brand lookups, label checks and
//! cache summaries.

use std::fmt::Write;

use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use labelcache_core::{LabelCheck, LabelFacts, MatchKind};
use labelcache_sync::{BatchReport, Candidate, RefreshReport};

const RULE: &str = "================================================================================";

// ── Batch reports ──

pub fn format_batch_report(label: &str, report: &BatchReport) -> String {
    let mut out = String::new();
    let verb = if report.dry_run { "Would insert" } else { "Inserted" };
    let update_verb = if report.dry_run { "Would update" } else { "Updated" };

    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Summary for {label}:");
    let _ = writeln!(out, "  {:<14} {}", verb, report.inserted);
    let _ = writeln!(out, "  {:<14} {}", update_verb, report.updated);
    let _ = writeln!(out, "  {:<14} {}", "Skipped", report.skipped);
    if report.rejected > 0 {
        let _ = writeln!(out, "  {:<14} {}", "Rejected", report.rejected);
    }
    for (id, reason) in &report.skips {
        let _ = writeln!(out, "    {id}: {reason}");
    }
    let _ = write!(out, "{RULE}");
    out
}

pub fn print_batch_report(label: &str, report: &BatchReport) {
    println!("{}", format_batch_report(label, report));
}

pub fn format_refresh_report(report: &RefreshReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Refresh summary:");
    let _ = writeln!(out, "  {:<14} {}", "Stale", report.candidates);
    let refreshed = if report.dry_run { "Would refresh" } else { "Refreshed" };
    let _ = writeln!(out, "  {:<14} {}", refreshed, report.refreshed);
    let _ = write!(out, "  {:<14} {}", "Skipped", report.skipped);
    for (brand, reason) in &report.skips {
        let _ = write!(out, "\n    {brand}: {reason}");
    }
    out
}

// ── Brand lookup ──

pub fn format_candidates(brand: &str, candidates: &[Candidate], rejected: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== {brand}: {} registry match(es) ===", candidates.len());
    for c in candidates {
        let r = &c.record;
        let name = match &r.product_name {
            Some(product) => format!("{} / {product}", r.brand_name),
            None => r.brand_name.clone(),
        };
        let abv = c
            .attributes
            .abv
            .map(|a| format!("{a:.1}%"))
            .unwrap_or_else(|| "abv unknown".into());
        let completed = r
            .completed_on()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".into());
        let _ = writeln!(
            out,
            "  {:<12} {name} ({}, {}, {abv}) completed {completed}",
            r.registry_id, r.class_type_desc, c.attributes.category
        );
    }
    if rejected > 0 {
        let _ = writeln!(out, "  ({rejected} unusable row(s) rejected)");
    }
    out.trim_end().to_string()
}

// ── Label check ──

pub fn format_label_check(facts: &LabelFacts, check: &LabelCheck) -> String {
    let mut out = String::new();
    let verdict = if check.passed { "PASS" } else { "FAIL" };
    let _ = writeln!(
        out,
        "=== {} / {} @ {:.1}% ABV: {verdict} ===",
        facts.brand_name, facts.class_type, facts.abv
    );

    let matched = match check.match_kind {
        MatchKind::Exact => "exact (brand + class/type)",
        MatchKind::BrandOnly => "brand only",
        MatchKind::Unmatched => "none",
    };
    let _ = writeln!(out, "  {:<18} {matched}", "match");
    if let Some(similarity) = check.class_similarity {
        let _ = writeln!(out, "  {:<18} {similarity:.2}", "class similarity");
    }
    if let Some(entry) = &check.matched {
        let abv = entry
            .abv
            .map(|a| format!("{a:.1}%"))
            .unwrap_or_else(|| "unknown".into());
        let _ = writeln!(
            out,
            "  {:<18} {} ({}, {abv}, {})",
            "cached entry", entry.brand_name, entry.class_type, entry.source
        );
    }
    if let Some(dev) = check.abv_deviation {
        let _ = writeln!(out, "  {:<18} {dev:.1} points", "abv deviation");
    }
    let range = if check.abv_in_category_range { "within" } else { "outside" };
    let _ = writeln!(out, "  {:<18} {} ({range} range)", "category", check.category);
    for w in &check.warnings {
        let _ = writeln!(out, "  warning: {w}");
    }
    out.trim_end().to_string()
}

// ── Cache summary ──

pub fn print_summary(total: usize, batches: &[RecordBatch]) -> anyhow::Result<()> {
    println!("=== known_beverages: {total} entries ===");
    if batches.iter().all(|b| b.num_rows() == 0) {
        println!("(no registry entries)");
        return Ok(());
    }
    println!("{}", pretty_format_batches(batches)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use labelcache_core::{Category, CandidateRecord};
    use labelcache_sync::SkipReason;

    #[test]
    fn batch_report_lists_skip_reasons() {
        let report = BatchReport {
            inserted: 2,
            updated: 1,
            skipped: 1,
            rejected: 0,
            skips: vec![(
                "9".into(),
                SkipReason::InsufficientData {
                    class_type: "MISCELLANEOUS".into(),
                },
            )],
            dry_run: false,
        };
        let text = format_batch_report("wine", &report);
        assert!(text.contains("Summary for wine:"));
        assert!(text.contains("Inserted       2"));
        assert!(text.contains("9: insufficient data"));
        assert!(!text.contains("Rejected"));
    }

    #[test]
    fn dry_run_reports_use_conditional_wording() {
        let report = BatchReport {
            dry_run: true,
            ..BatchReport::default()
        };
        assert!(format_batch_report("malt_beverage", &report).contains("Would insert"));

        let refresh = RefreshReport {
            dry_run: true,
            ..RefreshReport::default()
        };
        assert!(format_refresh_report(&refresh).contains("Would refresh"));
    }

    #[test]
    fn unmatched_check_shows_category_verdict() {
        let facts = LabelFacts {
            brand_name: "Nobody".into(),
            class_type: "VODKA".into(),
            abv: 12.0,
        };
        let check = LabelCheck {
            match_kind: MatchKind::Unmatched,
            matched: None,
            class_similarity: None,
            abv_deviation: None,
            category: Category::DistilledSpirits,
            abv_in_category_range: false,
            warnings: vec!["label ABV 12.0% outside distilled_spirits range".into()],
            passed: false,
        };
        let text = format_label_check(&facts, &check);
        assert!(text.starts_with("=== Nobody / VODKA @ 12.0% ABV: FAIL ==="));
        assert!(text.contains("distilled_spirits (outside range)"));
        assert!(text.contains("warning: label ABV"));
    }

    #[test]
    fn candidates_show_inferred_abv_and_completion_date() {
        let record = CandidateRecord {
            registry_id: "23001001000123".into(),
            brand_name: "FETZER".into(),
            product_name: Some("VALLEY OAKS".into()),
            class_type_desc: "TABLE RED WINE".into(),
            class_type_code: Some("80".into()),
            origin: Some("CALIFORNIA".into()),
            completed_date: Some("03/14/2024".into()),
            permit_no: None,
            source_url: "https://example.test/detail".into(),
        };
        let text = format_candidates("Fetzer", &[Candidate::infer(record)], 2);
        assert!(text.starts_with("=== Fetzer: 1 registry match(es) ==="));
        assert!(text.contains("FETZER / VALLEY OAKS (TABLE RED WINE, wine, 12.0%)"));
        assert!(text.contains("completed 2024-03-14"));
        assert!(text.contains("2 unusable row(s) rejected"));
    }
}
