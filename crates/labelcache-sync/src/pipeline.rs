//! Search and seeding pipeline: fetch, normalise, infer, reconcile.

use labelcache_core::Normalizer;
use labelcache_store::CacheRepo;
use tracing::info;

use crate::reconcile::{BatchReport, Candidate, Reconciler};
use crate::registry::{ApprovalQuery, RegistrySource};
use crate::SyncError;

/// Run one registry search and infer attributes for every accepted row.
///
/// Returns the candidates and the number of rows the normaliser rejected.
pub async fn search_candidates<S>(
    source: &S,
    normalizer: &Normalizer,
    query: &ApprovalQuery,
) -> Result<(Vec<Candidate>, usize), SyncError>
where
    S: RegistrySource + ?Sized,
{
    let rows = source.fetch_approvals(query).await?;
    let (records, rejected) = normalizer.normalize_batch(&rows);
    info!(
        category = ?query.category,
        brand = ?query.brand,
        fetched = rows.len(),
        accepted = records.len(),
        rejected,
        "normalised registry rows"
    );
    let candidates = records.into_iter().map(Candidate::infer).collect();
    Ok((candidates, rejected))
}

/// Seed the cache with one registry search.
///
/// A registry failure is returned before any write; store failures on
/// individual records are counted in the report.
pub async fn seed_category<S, R>(
    source: &S,
    normalizer: &Normalizer,
    reconciler: &mut Reconciler<'_, R>,
    query: &ApprovalQuery,
) -> Result<BatchReport, SyncError>
where
    S: RegistrySource + ?Sized,
    R: CacheRepo + ?Sized,
{
    let (candidates, rejected) = search_candidates(source, normalizer, query).await?;
    let mut report = reconciler.run(&candidates)?;
    report.rejected = rejected;
    Ok(report)
}
