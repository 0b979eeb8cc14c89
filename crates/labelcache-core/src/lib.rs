pub mod beverage;
pub mod check;
pub mod infer;
pub mod normalize;
pub mod rules;

pub use beverage::{
    AbvBasis, CacheEntry, CandidateRecord, Category, IdentityKey, InferredAttributes,
    MISSING_ABV_KEY, NewCacheEntry, RawRow, Source, abv_key,
};
pub use check::{CheckPolicy, LabelCheck, LabelFacts, MatchKind, check_label};
pub use infer::{classify, infer, infer_abv, infer_with_code};
pub use normalize::{Normalizer, REGISTRY_BASE_URL, Rejection};
