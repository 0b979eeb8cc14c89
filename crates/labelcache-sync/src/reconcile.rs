//! Cache reconciliation: turn inferred candidates into idempotent upserts.
//!
//! Each candidate either inserts a new cache row, updates the mutable fields
//! of the row sharing its identity key, or is skipped with a reason. A batch
//! runs inside one store transaction; per-record failures are counted, never
//! fatal.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use labelcache_core::{
    CandidateRecord, IdentityKey, InferredAttributes, NewCacheEntry, Source, infer_with_code,
};
use labelcache_store::{CacheRepo, StoreError, UpsertOutcome};
use tracing::{debug, info, warn};

use crate::{CancelFlag, SyncError};

/// A normalised record paired with its inferred attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub record: CandidateRecord,
    pub attributes: InferredAttributes,
}

impl Candidate {
    pub fn infer(record: CandidateRecord) -> Self {
        let attributes = infer_with_code(&record.class_type_desc, record.class_type_code.as_deref());
        Self { record, attributes }
    }

    /// The cache row this candidate would write; `None` without an ABV.
    pub fn cache_entry(&self) -> Option<NewCacheEntry> {
        let abv = self.attributes.abv?;
        let r = &self.record;
        Some(NewCacheEntry {
            brand_name: r.brand_name.clone(),
            product_name: r.product_name.clone(),
            class_type: r.class_type_desc.clone(),
            beverage_category: self.attributes.category,
            abv: Some(abv),
            country_of_origin: r.origin.clone(),
            producer: None,
            standard_size_ml: None,
            source: Source::TtbCola,
            source_url: Some(r.source_url.clone()),
            notes: Some(provenance_notes(r)),
            is_verified: true,
        })
    }
}

/// `COLA ID: .., Approved: .., Origin: ..[, Permit: ..]`
fn provenance_notes(r: &CandidateRecord) -> String {
    let mut notes = format!(
        "COLA ID: {}, Approved: {}, Origin: {}",
        r.registry_id,
        r.completed_date.as_deref().unwrap_or("unknown"),
        r.origin.as_deref().unwrap_or("unknown"),
    );
    if let Some(permit) = &r.permit_no {
        notes.push_str(", Permit: ");
        notes.push_str(permit);
    }
    notes
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No ABV could be inferred from the class/type description.
    InsufficientData { class_type: String },
    /// The store rejected the write for this record.
    Store(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData { class_type } => {
                write!(f, "insufficient data: no ABV inferred from '{class_type}'")
            }
            Self::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Inserted,
    Updated,
    Skipped(SkipReason),
}

impl From<UpsertOutcome> for Decision {
    fn from(outcome: UpsertOutcome) -> Self {
        match outcome {
            UpsertOutcome::Inserted => Self::Inserted,
            UpsertOutcome::Updated => Self::Updated,
        }
    }
}

/// Result of one candidate before it is tallied.
enum Step {
    Decided(Decision),
    Written(UpsertOutcome, NewCacheEntry),
    Failed(StoreError),
}

/// Outcome counts for one reconciled batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Raw rows dropped by the normaliser before reconciliation.
    pub rejected: usize,
    /// `(registry id, reason)` for every skipped candidate.
    pub skips: Vec<(String, SkipReason)>,
    pub dry_run: bool,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.inserted + self.updated + self.skipped
    }

    fn record(&mut self, registry_id: &str, decision: Decision) {
        match decision {
            Decision::Inserted => self.inserted += 1,
            Decision::Updated => self.updated += 1,
            Decision::Skipped(reason) => {
                self.skipped += 1;
                self.skips.push((registry_id.to_string(), reason));
            }
        }
    }
}

/// Applies candidates to a [`CacheRepo`].
///
/// In dry-run mode the same decisions are made from reads alone; an identity
/// already decided earlier in the batch counts as an update.
pub struct Reconciler<'a, R: CacheRepo + ?Sized> {
    repo: &'a R,
    dry_run: bool,
    cancel: Option<CancelFlag>,
    seen: HashSet<IdentityKey>,
}

impl<'a, R: CacheRepo + ?Sized> Reconciler<'a, R> {
    pub fn new(repo: &'a R) -> Self {
        Self {
            repo,
            dry_run: false,
            cancel: None,
            seen: HashSet::new(),
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Decide and (unless dry-run) apply one candidate.
    pub fn upsert(&mut self, candidate: &Candidate, now: DateTime<Utc>) -> Decision {
        match self.step(candidate, now) {
            Step::Decided(decision) => decision,
            Step::Written(outcome, _) => outcome.into(),
            Step::Failed(e) => Decision::Skipped(SkipReason::Store(e.to_string())),
        }
    }

    fn step(&mut self, candidate: &Candidate, now: DateTime<Utc>) -> Step {
        let Some(entry) = candidate.cache_entry() else {
            return Step::Decided(Decision::Skipped(SkipReason::InsufficientData {
                class_type: candidate.record.class_type_desc.clone(),
            }));
        };

        if self.dry_run {
            return Step::Decided(self.preview(&entry));
        }

        match self.repo.upsert_entry(&entry, now) {
            Ok(outcome) => Step::Written(outcome, entry),
            Err(e) => {
                warn!(
                    registry_id = %candidate.record.registry_id,
                    brand = %entry.brand_name,
                    error = %e,
                    "upsert failed, skipping record"
                );
                Step::Failed(e)
            }
        }
    }

    fn preview(&mut self, entry: &NewCacheEntry) -> Decision {
        let key = entry.identity();
        if !self.seen.insert(key.clone()) {
            return Decision::Updated;
        }
        match self.repo.find_by_identity(&key) {
            Ok(Some(_)) => Decision::Updated,
            Ok(None) => Decision::Inserted,
            Err(e) => Decision::Skipped(SkipReason::Store(e.to_string())),
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }

    /// Reconcile a batch inside one transaction.
    ///
    /// A write failure that poisons the transaction is recovered by rolling
    /// back and replaying the writes already applied, so only the failing
    /// record is lost. Interruption rolls the batch back and returns
    /// [`SyncError::Interrupted`].
    pub fn run(&mut self, candidates: &[Candidate]) -> Result<BatchReport, SyncError> {
        let mut report = BatchReport {
            dry_run: self.dry_run,
            ..BatchReport::default()
        };
        if !self.dry_run {
            self.repo.begin()?;
        }

        let mut applied: Vec<(NewCacheEntry, DateTime<Utc>)> = Vec::new();
        for (i, candidate) in candidates.iter().enumerate() {
            if self.cancelled() {
                self.abort();
                return Err(SyncError::Interrupted { processed: i });
            }
            let now = Utc::now();
            let decision = match self.step(candidate, now) {
                Step::Decided(decision) => decision,
                Step::Written(outcome, entry) => {
                    applied.push((entry, now));
                    outcome.into()
                }
                Step::Failed(e) => {
                    if e.aborts_transaction() {
                        if let Err(replay) = self.replay(&applied) {
                            self.abort();
                            return Err(replay.into());
                        }
                    }
                    Decision::Skipped(SkipReason::Store(e.to_string()))
                }
            };
            debug!(
                registry_id = %candidate.record.registry_id,
                brand = %candidate.record.brand_name,
                class_type = %candidate.record.class_type_desc,
                abv = ?candidate.attributes.abv,
                decision = ?decision,
                "reconciled candidate"
            );
            report.record(&candidate.record.registry_id, decision);
        }

        if self.cancelled() {
            self.abort();
            return Err(SyncError::Interrupted {
                processed: candidates.len(),
            });
        }
        if !self.dry_run {
            if let Err(e) = self.repo.commit() {
                self.abort();
                return Err(e.into());
            }
        }

        info!(
            inserted = report.inserted,
            updated = report.updated,
            skipped = report.skipped,
            dry_run = report.dry_run,
            "batch reconciled"
        );
        Ok(report)
    }

    /// Restart the transaction and re-apply `applied` in order.
    fn replay(&self, applied: &[(NewCacheEntry, DateTime<Utc>)]) -> Result<(), StoreError> {
        warn!(replayed = applied.len(), "transaction aborted, replaying batch");
        self.repo.rollback()?;
        self.repo.begin()?;
        for (entry, now) in applied {
            self.repo.upsert_entry(entry, *now)?;
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
