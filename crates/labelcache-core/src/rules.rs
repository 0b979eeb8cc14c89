//! Class/type rule table.
//!
//! Typical ABV values per registry class/type, based on 27 CFR parts 4
//! (wine), 5 (distilled spirits) and 7 (malt beverages). Everything here is
//! ordered data: the inference engine walks it top-down and the first match
//! wins, so the order of entries is part of the behaviour.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::beverage::Category;

/// Whole-description rule, matched against the trimmed upper-cased text.
#[derive(Debug, Clone, Copy)]
pub struct ExactRule {
    pub class_type: &'static str,
    pub category: Category,
    pub abv: f64,
}

/// Any of `keywords` appearing as a substring yields `abv`.
#[derive(Debug, Clone, Copy)]
pub struct KeywordRule {
    pub keywords: &'static [&'static str],
    pub abv: f64,
}

/// Ordered ABV rules for one category.
#[derive(Debug, Clone, Copy)]
pub struct KeywordGroup {
    pub category: Category,
    pub rules: &'static [KeywordRule],
}

pub const EXACT_RULES: &[ExactRule] = &[
    // Wine (27 CFR Part 4)
    exact("TABLE RED WINE", Category::Wine, 12.0),
    exact("TABLE WHITE WINE", Category::Wine, 12.0),
    exact("TABLE WINE", Category::Wine, 11.0),
    exact("SPARKLING WINE/CHAMPAGNE", Category::Wine, 12.0),
    exact("DESSERT /PORT/SHERRY/(COOKING) WINE", Category::Wine, 18.0),
    exact("DESSERT WINE", Category::Wine, 18.0),
    // Distilled spirits (27 CFR Part 5)
    exact("STRAIGHT BOURBON WHISKY", Category::DistilledSpirits, 45.0),
    exact("KENTUCKY STRAIGHT BOURBON WHISKEY", Category::DistilledSpirits, 45.0),
    exact("AMERICAN SINGLE MALT WHISKEY", Category::DistilledSpirits, 43.0),
    exact("GIN", Category::DistilledSpirits, 40.0),
    exact("GIN SPECIALTIES", Category::DistilledSpirits, 40.0),
    exact("VODKA", Category::DistilledSpirits, 40.0),
    exact("RUM", Category::DistilledSpirits, 40.0),
    exact("TEQUILA", Category::DistilledSpirits, 40.0),
    exact("BRANDY", Category::DistilledSpirits, 40.0),
    exact("OTHER SPECIALTIES & PROPRIETARIES", Category::DistilledSpirits, 40.0),
    // Malt beverages (27 CFR Part 7)
    exact("BEER", Category::MaltBeverage, 5.0),
    exact("MALT BEVERAGES SPECIALITIES - FLAVORED", Category::MaltBeverage, 5.0),
    exact("ALE", Category::MaltBeverage, 5.5),
    exact("LAGER", Category::MaltBeverage, 5.0),
    exact("STOUT", Category::MaltBeverage, 6.0),
    exact("IPA", Category::MaltBeverage, 6.5),
];

/// Keyword groups in evaluation order: wine, spirits, malt.
pub const KEYWORD_GROUPS: &[KeywordGroup] = &[
    KeywordGroup {
        category: Category::Wine,
        rules: &[
            KeywordRule { keywords: &["TABLE WINE", "WHITE WINE", "RED WINE"], abv: 12.0 },
            KeywordRule { keywords: &["DESSERT", "PORT", "SHERRY", "COOKING"], abv: 18.0 },
            KeywordRule { keywords: &["SPARKLING", "CHAMPAGNE"], abv: 12.0 },
        ],
    },
    KeywordGroup {
        category: Category::DistilledSpirits,
        rules: &[
            KeywordRule { keywords: &["WHISKEY", "WHISKY", "BOURBON"], abv: 45.0 },
            KeywordRule { keywords: &["GIN"], abv: 40.0 },
            KeywordRule { keywords: &["VODKA"], abv: 40.0 },
            KeywordRule { keywords: &["RUM"], abv: 40.0 },
            KeywordRule { keywords: &["TEQUILA"], abv: 40.0 },
            KeywordRule { keywords: &["BRANDY"], abv: 40.0 },
        ],
    },
    KeywordGroup {
        category: Category::MaltBeverage,
        rules: &[
            KeywordRule { keywords: &["BEER", "LAGER", "ALE"], abv: 5.0 },
            KeywordRule { keywords: &["MALT BEVERAGE"], abv: 5.0 },
            KeywordRule { keywords: &["IPA", "INDIA PALE ALE"], abv: 6.5 },
            KeywordRule { keywords: &["STOUT", "PORTER"], abv: 6.0 },
        ],
    },
];

/// Last-resort ABV by lone category keyword, same order.
pub const BROAD_RULES: &[KeywordGroup] = &[
    KeywordGroup {
        category: Category::Wine,
        rules: &[KeywordRule { keywords: &["WINE"], abv: 12.0 }],
    },
    KeywordGroup {
        category: Category::DistilledSpirits,
        rules: &[KeywordRule { keywords: &["SPIRIT", "LIQUOR", "LIQUEUR"], abv: 40.0 }],
    },
    KeywordGroup {
        category: Category::MaltBeverage,
        rules: &[KeywordRule { keywords: &["MALT"], abv: 5.0 }],
    },
];

/// Category-indicative keywords, evaluated wine, then spirits, then malt.
pub const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Wine,
        &["WINE", "CHAMPAGNE", "PORT", "SHERRY", "DESSERT", "TABLE"],
    ),
    (
        Category::DistilledSpirits,
        &[
            "WHISKEY", "WHISKY", "BOURBON", "GIN", "VODKA", "RUM", "TEQUILA", "BRANDY", "LIQUEUR",
            "SPIRIT", "DISTILLED",
        ],
    ),
    (
        Category::MaltBeverage,
        &["BEER", "ALE", "LAGER", "MALT", "IPA", "STOUT", "PORTER"],
    ),
];

/// Category used when neither keywords nor the class/type code decide.
pub const DEFAULT_CATEGORY: Category = Category::Wine;

const fn exact(class_type: &'static str, category: Category, abv: f64) -> ExactRule {
    ExactRule {
        class_type,
        category,
        abv,
    }
}

static EXACT_INDEX: LazyLock<HashMap<&'static str, &'static ExactRule>> =
    LazyLock::new(|| EXACT_RULES.iter().map(|r| (r.class_type, r)).collect());

/// Exact rule for an already-normalised (trimmed, upper-cased) description.
pub fn lookup_exact(normalized: &str) -> Option<&'static ExactRule> {
    EXACT_INDEX.get(normalized).copied()
}

impl KeywordRule {
    /// First keyword of this rule contained in `text`.
    pub fn matched_keyword(&self, text: &str) -> Option<&'static str> {
        self.keywords.iter().copied().find(|kw| text.contains(kw))
    }
}
