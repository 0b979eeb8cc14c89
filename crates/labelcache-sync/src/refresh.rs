//! Staleness-driven refresh of registry-sourced cache entries.
//!
//! Old `ttb_cola` rows are re-checked against a small window of recent
//! registry approvals. A match refreshes provenance and resets the entry's
//! age; ABV and category are never touched. Entries without a match in the
//! window are left alone, so a run is best-effort.

use chrono::{DateTime, Datelike, Duration, Utc};
use labelcache_core::{CacheEntry, CandidateRecord, IdentityKey, Normalizer, Source};
use labelcache_store::{CacheRepo, StoreError};
use tracing::{debug, info, warn};

use crate::registry::{ApprovalQuery, RegistrySource};
use crate::{CancelFlag, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshConfig {
    /// Registry rows fetched per stale entry.
    pub window_rows: usize,
    /// Look-back of the per-entry registry search.
    pub window_months: u32,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            window_rows: 10,
            window_months: 12,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Stale entries selected for refresh.
    pub candidates: usize,
    pub refreshed: usize,
    pub skipped: usize,
    /// `(brand, reason)` for every skipped entry.
    pub skips: Vec<(String, String)>,
    pub dry_run: bool,
}

pub struct Refresher<'a, R: CacheRepo + ?Sized, S: RegistrySource + ?Sized> {
    repo: &'a R,
    source: &'a S,
    normalizer: Normalizer,
    config: RefreshConfig,
    dry_run: bool,
    cancel: Option<CancelFlag>,
}

impl<'a, R: CacheRepo + ?Sized, S: RegistrySource + ?Sized> Refresher<'a, R, S> {
    pub fn new(repo: &'a R, source: &'a S) -> Self {
        Self {
            repo,
            source,
            normalizer: Normalizer::default(),
            config: RefreshConfig::default(),
            dry_run: false,
            cancel: None,
        }
    }

    pub fn with_config(mut self, config: RefreshConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Refresh up to `max_candidates` registry entries older than
    /// `age_threshold_days`, inside one transaction.
    ///
    /// Interruption is honoured between entries, after each registry fetch
    /// and before commit; the run is rolled back and
    /// [`SyncError::Interrupted`] returned.
    pub async fn refresh(
        &self,
        age_threshold_days: u32,
        max_candidates: usize,
    ) -> Result<RefreshReport, SyncError> {
        let now = Utc::now();
        let mut report = RefreshReport {
            dry_run: self.dry_run,
            ..RefreshReport::default()
        };
        // Nothing can predate year 1.
        let Some(cutoff) = now
            .checked_sub_signed(Duration::days(i64::from(age_threshold_days)))
            .filter(|c| c.year() >= 1)
        else {
            info!(age_threshold_days, "threshold reaches past any entry");
            return Ok(report);
        };
        let stale = self
            .repo
            .stale_entries(Source::TtbCola, cutoff, max_candidates)?;
        report.candidates = stale.len();
        info!(
            stale = stale.len(),
            age_threshold_days, "selected stale cache entries"
        );
        if stale.is_empty() {
            return Ok(report);
        }

        if !self.dry_run {
            self.repo.begin()?;
        }
        let mut applied: Vec<Refresh> = Vec::new();
        for (i, entry) in stale.iter().enumerate() {
            if self.cancelled() {
                self.abort();
                return Err(SyncError::Interrupted { processed: i });
            }
            let found = self.find_match(entry).await;
            if self.cancelled() {
                self.abort();
                return Err(SyncError::Interrupted { processed: i });
            }
            let outcome = match found {
                Ok(record) => self.apply(entry, &record, now, &mut applied),
                Err(reason) => Err(reason),
            };
            match outcome {
                Ok(()) => report.refreshed += 1,
                Err(reason) => {
                    debug!(brand = %entry.brand_name, class_type = %entry.class_type, %reason, "entry not refreshed");
                    report.skipped += 1;
                    report.skips.push((entry.brand_name.clone(), reason));
                }
            }
        }

        if self.cancelled() {
            self.abort();
            return Err(SyncError::Interrupted {
                processed: stale.len(),
            });
        }
        if !self.dry_run {
            if let Err(e) = self.repo.commit() {
                self.abort();
                return Err(e.into());
            }
        }

        info!(
            refreshed = report.refreshed,
            skipped = report.skipped,
            dry_run = report.dry_run,
            "refresh complete"
        );
        Ok(report)
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }

    /// First approval in the entry's refresh window with the same brand and
    /// class/type; `Err` carries the skip reason.
    async fn find_match(&self, entry: &CacheEntry) -> Result<CandidateRecord, String> {
        let query = ApprovalQuery {
            category: Some(entry.beverage_category),
            brand: None,
            months_back: self.config.window_months,
            limit: self.config.window_rows,
        };
        let rows = self.source.fetch_approvals(&query).await.map_err(|e| {
            warn!(brand = %entry.brand_name, error = %e, "registry fetch failed");
            format!("registry fetch failed: {e}")
        })?;

        let (records, _) = self.normalizer.normalize_batch(&rows);
        records
            .into_iter()
            .find(|r| matches_entry(r, entry))
            .ok_or_else(|| "no matching approval in refresh window".to_string())
    }

    /// Write the refreshed provenance; a write that poisons the transaction
    /// is recovered by replaying `applied`.
    fn apply(
        &self,
        entry: &CacheEntry,
        record: &CandidateRecord,
        now: DateTime<Utc>,
        applied: &mut Vec<Refresh>,
    ) -> Result<(), String> {
        if self.dry_run {
            return Ok(());
        }
        let refresh = Refresh {
            key: entry.identity(),
            source_url: record.source_url.clone(),
            notes: refresh_notes(record, now),
            now,
        };
        match refresh.write(self.repo) {
            Ok(true) => {
                applied.push(refresh);
                Ok(())
            }
            Ok(false) => Err("entry no longer in cache".to_string()),
            Err(e) => {
                warn!(brand = %entry.brand_name, error = %e, "refresh write failed");
                if e.aborts_transaction() {
                    self.replay(applied).map_err(|replay| {
                        format!("store error: {e}; replay failed: {replay}")
                    })?;
                }
                Err(format!("store error: {e}"))
            }
        }
    }

    fn replay(&self, applied: &[Refresh]) -> Result<(), StoreError> {
        warn!(replayed = applied.len(), "transaction aborted, replaying refresh");
        self.repo.rollback()?;
        self.repo.begin()?;
        for refresh in applied {
            refresh.write(self.repo)?;
        }
        Ok(())
    }

    fn abort(&self) {
        if self.dry_run {
            return;
        }
        if let Err(e) = self.repo.rollback() {
            warn!(error = %e, "rollback failed");
        }
    }
}

/// A provenance write applied in the current transaction.
struct Refresh {
    key: IdentityKey,
    source_url: String,
    notes: String,
    now: DateTime<Utc>,
}

impl Refresh {
    fn write<R: CacheRepo + ?Sized>(&self, repo: &R) -> Result<bool, StoreError> {
        repo.refresh_provenance(&self.key, &self.source_url, &self.notes, self.now)
    }
}

fn matches_entry(record: &CandidateRecord, entry: &CacheEntry) -> bool {
    record.brand_name.to_lowercase() == entry.brand_name.trim().to_lowercase()
        && record.class_type_desc.to_lowercase() == entry.class_type.trim().to_lowercase()
}

/// `COLA ID: .., Approved: .., Refreshed: YYYY-MM-DD`
fn refresh_notes(record: &CandidateRecord, now: DateTime<Utc>) -> String {
    format!(
        "COLA ID: {}, Approved: {}, Refreshed: {}",
        record.registry_id,
        record.completed_date.as_deref().unwrap_or("unknown"),
        now.format("%Y-%m-%d")
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::registry::RegistryError;
    use async_trait::async_trait;
    use labelcache_core::{Category, NewCacheEntry, RawRow};
    use labelcache_store::DuckStore;

    /// Serves canned rows and records every query.
    #[derive(Default)]
    struct FakeRegistry {
        rows: Vec<RawRow>,
        fail: bool,
        /// Set while the fetch is in flight, as an operator interrupt would.
        cancel_during_fetch: Option<CancelFlag>,
        queries: Mutex<Vec<ApprovalQuery>>,
    }

    #[async_trait]
    impl RegistrySource for FakeRegistry {
        async fn fetch_approvals(
            &self,
            query: &ApprovalQuery,
        ) -> Result<Vec<RawRow>, RegistryError> {
            self.queries.lock().unwrap().push(query.clone());
            if let Some(flag) = &self.cancel_during_fetch {
                flag.cancel();
            }
            if self.fail {
                return Err(RegistryError::Server { status: 503 });
            }
            Ok(self.rows.iter().take(query.limit).cloned().collect())
        }
    }

    fn raw(id: &str, brand: &str, desc: &str) -> RawRow {
        RawRow {
            ttb_id: id.into(),
            brand_name: brand.into(),
            class_type_desc: desc.into(),
            completed_date: "03/14/2026".into(),
            ..RawRow::default()
        }
    }

    fn entry(brand: &str, class_type: &str, category: Category, abv: f64) -> NewCacheEntry {
        NewCacheEntry {
            brand_name: brand.into(),
            product_name: None,
            class_type: class_type.into(),
            beverage_category: category,
            abv: Some(abv),
            country_of_origin: None,
            producer: None,
            standard_size_ml: None,
            source: Source::TtbCola,
            source_url: Some("https://registry.test/old".into()),
            notes: Some("COLA ID: old".into()),
            is_verified: true,
        }
    }

    fn seeded(age_days: i64) -> DuckStore {
        let store = DuckStore::open().unwrap();
        let then = Utc::now() - Duration::days(age_days);
        store
            .upsert_entry(&entry("Fetzer", "TABLE RED WINE", Category::Wine, 13.5), then)
            .unwrap();
        store
            .upsert_entry(
                &entry("Bulleit", "BOURBON WHISKY", Category::DistilledSpirits, 45.0),
                then,
            )
            .unwrap();
        store
    }

    #[tokio::test]
    async fn match_refreshes_provenance_and_keeps_classification() {
        let store = seeded(60);
        let registry = FakeRegistry {
            rows: vec![
                raw("111", "OTHER", "TABLE RED WINE"),
                raw("222", "FETZER", "table red wine"),
            ],
            ..FakeRegistry::default()
        };

        let report = Refresher::new(&store, &registry)
            .refresh(30, 100)
            .await
            .unwrap();
        assert_eq!(report.candidates, 2);
        assert_eq!(report.refreshed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.skips[0].0, "Bulleit");

        let key = IdentityKey::new("Fetzer", None, Some(13.5));
        let fetzer = store.find_by_identity(&key).unwrap().unwrap();
        assert_eq!(fetzer.abv, Some(13.5));
        assert_eq!(fetzer.beverage_category, Category::Wine);
        assert!(fetzer.age_days(Utc::now()) < 1);
        let notes = fetzer.notes.unwrap();
        assert!(notes.starts_with("COLA ID: 222, Approved: 03/14/2026, Refreshed: "));
        assert_eq!(
            fetzer.source_url.as_deref(),
            Some("https://ttbonline.gov/colasonline/viewColaDetails.do?action=publicDisplaySearchBasic&ttbid=222")
        );

        let queries = registry.queries.lock().unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].limit, 10);
        assert_eq!(queries[0].months_back, 12);
        assert!(queries.iter().any(|q| q.category == Some(Category::Wine)));
    }

    #[tokio::test]
    async fn fresh_entries_are_not_selected() {
        let store = seeded(5);
        let registry = FakeRegistry::default();
        let report = Refresher::new(&store, &registry)
            .refresh(30, 100)
            .await
            .unwrap();
        assert_eq!(report, RefreshReport::default());
        assert!(registry.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn candidate_cap_is_honoured() {
        let store = seeded(60);
        let registry = FakeRegistry::default();
        let report = Refresher::new(&store, &registry)
            .refresh(30, 1)
            .await
            .unwrap();
        assert_eq!(report.candidates, 1);
        assert_eq!(registry.queries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fetch_failure_skips_entry() {
        let store = seeded(60);
        let registry = FakeRegistry {
            fail: true,
            ..FakeRegistry::default()
        };
        let report = Refresher::new(&store, &registry)
            .refresh(30, 100)
            .await
            .unwrap();
        assert_eq!((report.refreshed, report.skipped), (0, 2));
        assert!(report.skips[0].1.contains("registry fetch failed"));
    }

    #[tokio::test]
    async fn dry_run_leaves_entries_stale() {
        let store = seeded(60);
        let registry = FakeRegistry {
            rows: vec![raw("222", "Fetzer", "TABLE RED WINE")],
            ..FakeRegistry::default()
        };
        let report = Refresher::new(&store, &registry)
            .dry_run(true)
            .refresh(30, 100)
            .await
            .unwrap();
        assert_eq!(report.refreshed, 1);

        let key = IdentityKey::new("Fetzer", None, Some(13.5));
        let fetzer = store.find_by_identity(&key).unwrap().unwrap();
        assert_eq!(fetzer.notes.as_deref(), Some("COLA ID: old"));
        assert!(fetzer.age_days(Utc::now()) >= 59);
    }

    #[tokio::test]
    async fn window_is_configurable() {
        let store = seeded(60);
        let registry = FakeRegistry {
            rows: vec![
                raw("111", "OTHER", "TABLE RED WINE"),
                raw("222", "Fetzer", "TABLE RED WINE"),
            ],
            ..FakeRegistry::default()
        };
        let report = Refresher::new(&store, &registry)
            .with_config(RefreshConfig {
                window_rows: 1,
                window_months: 3,
            })
            .refresh(30, 100)
            .await
            .unwrap();
        assert_eq!(report.refreshed, 0);
        assert_eq!(registry.queries.lock().unwrap()[0].months_back, 3);
    }

    #[tokio::test]
    async fn cancellation_interrupts_refresh() {
        let store = seeded(60);
        let registry = FakeRegistry::default();
        let flag = CancelFlag::new();
        flag.cancel();
        let err = Refresher::new(&store, &registry)
            .with_cancel(flag)
            .refresh(30, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Interrupted { processed: 0 }));
    }

    #[tokio::test]
    async fn interrupt_during_fetch_discards_the_match() {
        let store = seeded(60);
        let flag = CancelFlag::new();
        let registry = FakeRegistry {
            rows: vec![
                raw("222", "Fetzer", "TABLE RED WINE"),
                raw("333", "Bulleit", "BOURBON WHISKY"),
            ],
            cancel_during_fetch: Some(flag.clone()),
            ..FakeRegistry::default()
        };
        let err = Refresher::new(&store, &registry)
            .with_cancel(flag)
            .refresh(30, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Interrupted { processed: 0 }));

        for key in [
            IdentityKey::new("Fetzer", None, Some(13.5)),
            IdentityKey::new("Bulleit", None, Some(45.0)),
        ] {
            let entry = store.find_by_identity(&key).unwrap().unwrap();
            assert_eq!(entry.notes.as_deref(), Some("COLA ID: old"));
        }

        // The rolled-back connection accepts the next run.
        let registry = FakeRegistry::default();
        let report = Refresher::new(&store, &registry).refresh(30, 100).await.unwrap();
        assert_eq!(report.candidates, 2);
    }

    #[tokio::test]
    async fn huge_threshold_selects_nothing() {
        let store = seeded(60);
        let registry = FakeRegistry::default();
        let report = Refresher::new(&store, &registry)
            .refresh(u32::MAX, 100)
            .await
            .unwrap();
        assert_eq!(report.candidates, 0);
        assert!(registry.queries.lock().unwrap().is_empty());
    }
}
