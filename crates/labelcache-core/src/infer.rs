//! Attribute inference: typical ABV and category from class/type text.
//!
//! Registry results carry no ABV, only a free-text class/type description
//! and a numeric class/type code. ABV and category are derived separately:
//!
//! - ABV: exact rule table, then the ordered keyword groups (wine, spirits,
//!   malt), then a lone category keyword. Otherwise absent.
//! - Category: category keyword sets (wine, spirits, malt), then the numeric
//!   code range, then [`DEFAULT_CATEGORY`].
//!
//! Both are pure functions of their input; absence of an ABV is a normal
//! outcome, not an error.

use crate::beverage::{AbvBasis, Category, InferredAttributes};
use crate::rules::{
    BROAD_RULES, CATEGORY_KEYWORDS, DEFAULT_CATEGORY, KEYWORD_GROUPS, KeywordGroup, lookup_exact,
};

fn normalize(desc: &str) -> String {
    desc.trim().to_uppercase()
}

/// Infer category and ABV from a class/type description alone.
pub fn infer(class_type_desc: &str) -> InferredAttributes {
    infer_with_code(class_type_desc, None)
}

/// Infer category and ABV, using the class/type code as a category fallback.
///
/// An exact rule-table hit decides both fields. Otherwise the ABV comes from
/// the keyword chain and the category from [`classify`].
pub fn infer_with_code(class_type_desc: &str, class_type_code: Option<&str>) -> InferredAttributes {
    let normalized = normalize(class_type_desc);

    if let Some(rule) = lookup_exact(&normalized) {
        return InferredAttributes {
            category: rule.category,
            abv: Some(rule.abv),
            basis: AbvBasis::Exact,
        };
    }

    let (abv, basis) = match first_keyword_match(KEYWORD_GROUPS, &normalized) {
        Some((kw, abv)) => (Some(abv), AbvBasis::Keyword(kw)),
        None => match first_keyword_match(BROAD_RULES, &normalized) {
            Some((kw, abv)) => (Some(abv), AbvBasis::Broad(kw)),
            None => (None, AbvBasis::Unmatched),
        },
    };

    InferredAttributes {
        category: classify_normalized(&normalized, class_type_code),
        abv,
        basis,
    }
}

/// Typical ABV for a class/type description, if any rule applies.
pub fn infer_abv(class_type_desc: &str) -> Option<f64> {
    infer(class_type_desc).abv
}

/// First group containing a matching rule wins; within a group, first rule.
fn first_keyword_match(groups: &[KeywordGroup], normalized: &str) -> Option<(&'static str, f64)> {
    groups.iter().find_map(|group| {
        group
            .rules
            .iter()
            .find_map(|rule| rule.matched_keyword(normalized).map(|kw| (kw, rule.abv)))
    })
}

/// Map a class/type description and code to a beverage category.
pub fn classify(class_type_desc: &str, class_type_code: Option<&str>) -> Category {
    classify_normalized(&normalize(class_type_desc), class_type_code)
}

fn classify_normalized(normalized: &str, class_type_code: Option<&str>) -> Category {
    if let Some((category, _)) = CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| normalized.contains(kw)))
    {
        return *category;
    }

    class_type_code
        .and_then(|code| code.trim().parse::<u32>().ok())
        .and_then(Category::from_code)
        .unwrap_or(DEFAULT_CATEGORY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_rule_table_hits() {
        let attrs = infer("TABLE RED WINE");
        assert_eq!(attrs.category, Category::Wine);
        assert_eq!(attrs.abv, Some(12.0));
        assert_eq!(attrs.basis, AbvBasis::Exact);

        let attrs = infer("KENTUCKY STRAIGHT BOURBON WHISKEY");
        assert_eq!(attrs.category, Category::DistilledSpirits);
        assert_eq!(attrs.abv, Some(45.0));

        assert_eq!(infer_abv("TABLE WINE"), Some(11.0));
        assert_eq!(infer_abv("AMERICAN SINGLE MALT WHISKEY"), Some(43.0));
        assert_eq!(infer_abv("ALE"), Some(5.5));
    }

    #[test]
    fn exact_lookup_ignores_case_and_padding() {
        assert_eq!(infer(" table red wine ").basis, AbvBasis::Exact);
        assert_eq!(infer_abv("Table Wine"), Some(11.0));
    }

    #[test]
    fn exact_rule_category_overrides_keywords() {
        // No category keyword in the text; the table still says spirits.
        let attrs = infer_with_code("OTHER SPECIALTIES & PROPRIETARIES", Some("85"));
        assert_eq!(attrs.category, Category::DistilledSpirits);
        assert_eq!(attrs.abv, Some(40.0));
    }

    #[test]
    fn wine_keywords() {
        assert_eq!(infer_abv("CALIFORNIA RED WINE"), Some(12.0));
        assert_eq!(infer_abv("DESSERT FLAVORED WINE"), Some(18.0));
        assert_eq!(infer_abv("SHERRY"), Some(18.0));
        assert_eq!(infer_abv("SPARKLING WINE"), Some(12.0));
        assert_eq!(infer("SPARKLING WINE").basis, AbvBasis::Keyword("SPARKLING"));
    }

    #[test]
    fn spirits_keywords() {
        assert_eq!(infer_abv("STRAIGHT RYE WHISKY"), Some(45.0));
        assert_eq!(infer_abv("LONDON DRY GIN"), Some(40.0));
        assert_eq!(infer_abv("FLAVORED VODKA"), Some(40.0));
        assert_eq!(infer_abv("SPICED RUM"), Some(40.0));
        assert_eq!(infer_abv("TEQUILA 100% AGAVE"), Some(40.0));
        assert_eq!(infer_abv("APPLE BRANDY"), Some(40.0));
    }

    #[test]
    fn malt_keywords_in_group_order() {
        assert_eq!(infer_abv("MALT BEVERAGES SPECIALITIES - FLAVORED"), Some(5.0));
        assert_eq!(infer_abv("AMERICAN LAGER BEER"), Some(5.0));
        assert_eq!(infer_abv("FLAVORED MALT BEVERAGE"), Some(5.0));
        assert_eq!(infer_abv("HAZY IPA"), Some(6.5));
        assert_eq!(infer_abv("IMPERIAL STOUT"), Some(6.0));
        // "ALE" is tested before "INDIA PALE ALE".
        assert_eq!(infer_abv("INDIA PALE ALE"), Some(5.0));
    }

    #[test]
    fn wine_group_wins_over_later_groups() {
        // "PORT" is a wine keyword and the wine group is evaluated first.
        let attrs = infer("PORTER");
        assert_eq!(attrs.abv, Some(18.0));
        assert_eq!(attrs.basis, AbvBasis::Keyword("PORT"));
    }

    #[test]
    fn broad_fallbacks() {
        assert_eq!(infer("FRUIT WINE").abv, Some(12.0));
        assert_eq!(infer("FRUIT WINE").basis, AbvBasis::Broad("WINE"));
        assert_eq!(infer_abv("CORDIALS & LIQUEURS"), Some(40.0));
        assert_eq!(infer_abv("NEUTRAL SPIRITS"), Some(40.0));
        assert_eq!(infer_abv("MALT SPECIALTY"), Some(5.0));
    }

    #[test]
    fn unknown_description_has_no_abv() {
        let attrs = infer("UNKNOWN EXOTIC BEVERAGE");
        assert_eq!(attrs.abv, None);
        assert_eq!(attrs.basis, AbvBasis::Unmatched);
        assert_eq!(infer_abv("MISCELLANEOUS NOVELTY ITEM"), None);
        assert_eq!(infer_abv(""), None);
    }

    #[test]
    fn classify_by_keyword() {
        assert_eq!(classify("TABLE RED WINE", Some("80")), Category::Wine);
        assert_eq!(
            classify("STRAIGHT BOURBON WHISKEY", Some("170")),
            Category::DistilledSpirits
        );
        assert_eq!(classify("BEER", Some("901")), Category::MaltBeverage);
        // Keywords beat a contradicting code.
        assert_eq!(classify("VODKA", Some("901")), Category::DistilledSpirits);
    }

    #[test]
    fn classify_falls_back_to_code_range() {
        assert_eq!(
            classify("UNKNOWN EXOTIC BEVERAGE", Some("250")),
            Category::DistilledSpirits
        );
        assert_eq!(classify("UNKNOWN", Some("85")), Category::Wine);
        assert_eq!(classify("UNKNOWN", Some("100")), Category::DistilledSpirits);
        assert_eq!(classify("UNKNOWN", Some(" 901 ")), Category::MaltBeverage);
    }

    #[test]
    fn classify_defaults_to_wine() {
        assert_eq!(classify("UNKNOWN", Some("0")), Category::Wine);
        assert_eq!(classify("UNKNOWN", Some("abc")), Category::Wine);
        assert_eq!(classify("UNKNOWN", None), Category::Wine);
    }

    #[test]
    fn category_is_classified_even_without_abv() {
        let attrs = infer_with_code("UNKNOWN EXOTIC BEVERAGE", Some("250"));
        assert_eq!(attrs.abv, None);
        assert_eq!(attrs.category, Category::DistilledSpirits);
    }

    #[test]
    fn inference_is_deterministic() {
        for desc in [
            "TABLE RED WINE",
            "KENTUCKY STRAIGHT BOURBON WHISKEY",
            "UNKNOWN EXOTIC BEVERAGE",
            "HAZY IPA",
            "",
        ] {
            assert_eq!(infer(desc), infer(desc));
            assert_eq!(classify(desc, Some("250")), classify(desc, Some("250")));
        }
    }
}
