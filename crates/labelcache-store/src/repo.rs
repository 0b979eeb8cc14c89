//! Repository trait for the known-beverage cache.

use chrono::{DateTime, Utc};
use labelcache_core::{CacheEntry, IdentityKey, NewCacheEntry, Source};

use crate::StoreError;

/// Whether an upsert created a row or updated an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Operations the reconciler and refresher issue against the cache.
///
/// Implementations resolve identity conflicts inside the store (one atomic
/// statement per upsert), never by read-then-write in the caller.
pub trait CacheRepo {
    /// Open the transaction that scopes one batch.
    fn begin(&self) -> Result<(), StoreError>;

    fn commit(&self) -> Result<(), StoreError>;

    fn rollback(&self) -> Result<(), StoreError>;

    /// Insert `entry`, or update the mutable fields of the row sharing its
    /// identity key. Identity fields and `created_at` are never changed by
    /// the update path.
    fn upsert_entry(
        &self,
        entry: &NewCacheEntry,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError>;

    fn find_by_identity(&self, key: &IdentityKey) -> Result<Option<CacheEntry>, StoreError>;

    /// Entries from `source` created before `created_before`, oldest first.
    fn stale_entries(
        &self,
        source: Source,
        created_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CacheEntry>, StoreError>;

    /// Replace provenance (`source_url`, `notes`) and reset both timestamps
    /// to `now`. Returns false when no row has the key.
    fn refresh_provenance(
        &self,
        key: &IdentityKey,
        source_url: &str,
        notes: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}
