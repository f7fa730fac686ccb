//! Location deduplication.
//!
//! A provider may return the same location under several identifier shapes.
//! Records are keyed by normalized id and, when two collide, the more
//! complete one wins; on equal completeness the more recently updated one
//! wins; a full tie keeps what is already stored.

use std::collections::BTreeMap;
use std::sync::Arc;

use ldesk_core::{CompletenessWeights, CoreError, LocationRecord, NormalizedId};
use ldesk_db::{DbError, Store};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeDecision {
    /// No stored record shared the normalized id.
    Inserted,
    /// The incoming record replaced the stored one.
    Replaced,
    /// The stored record was kept.
    Kept,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupReport {
    pub inserted: usize,
    pub replaced: usize,
    pub kept: usize,
    /// External ids that carried no entity number.
    pub rejected: Vec<String>,
}

impl DedupReport {
    fn record(&mut self, decision: MergeDecision) {
        match decision {
            MergeDecision::Inserted => self.inserted += 1,
            MergeDecision::Replaced => self.replaced += 1,
            MergeDecision::Kept => self.kept += 1,
        }
    }
}

/// `true` when `incoming` should replace `existing`.
#[must_use]
pub fn prefers_incoming(existing: &LocationRecord, incoming: &LocationRecord) -> bool {
    incoming.completeness_score > existing.completeness_score
        || (incoming.completeness_score == existing.completeness_score
            && incoming.updated_at > existing.updated_at)
}

#[must_use]
pub fn decide(existing: Option<&LocationRecord>, incoming: &LocationRecord) -> MergeDecision {
    match existing {
        None => MergeDecision::Inserted,
        Some(existing) if prefers_incoming(existing, incoming) => MergeDecision::Replaced,
        Some(_) => MergeDecision::Kept,
    }
}

/// Merges `incoming` into `current` in place.
///
/// Derived fields are recomputed from each record's own content first, so
/// a stale score or id carried on an incoming record has no effect. Running
/// this again with the same input leaves `current` unchanged.
pub fn merge_into(
    current: &mut BTreeMap<NormalizedId, LocationRecord>,
    incoming: impl IntoIterator<Item = LocationRecord>,
    weights: &CompletenessWeights,
) -> DedupReport {
    let mut report = DedupReport::default();
    for mut record in incoming {
        if let Err(e) = record.refresh_derived(weights) {
            warn!(external_id = %record.external_id, error = %e, "dropping location");
            report.rejected.push(record.external_id);
            continue;
        }
        let decision = decide(current.get(&record.normalized_id), &record);
        report.record(decision);
        if decision != MergeDecision::Kept {
            current.insert(record.normalized_id.clone(), record);
        }
    }
    report
}

/// Store-backed deduplicator.
///
/// Callers must not reconcile the same normalized id concurrently; the
/// sync orchestrator guarantees this by running one job per entity.
#[derive(Clone)]
pub struct Deduplicator {
    store: Arc<dyn Store>,
    weights: CompletenessWeights,
}

impl std::fmt::Debug for Deduplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deduplicator")
            .field("weights", &self.weights)
            .finish_non_exhaustive()
    }
}

impl Deduplicator {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, weights: CompletenessWeights) -> Self {
        Self { store, weights }
    }

    /// Reconciles one freshly fetched record against the stored set.
    ///
    /// # Errors
    ///
    /// [`ReconcileError::Invalid`] if the record's external id is malformed,
    /// [`ReconcileError::Store`] on storage failure.
    pub async fn reconcile(
        &self,
        mut record: LocationRecord,
    ) -> Result<MergeDecision, ReconcileError> {
        record.refresh_derived(&self.weights)?;
        let existing = self.store.get_location(&record.normalized_id).await?;
        let decision = decide(existing.as_ref(), &record);
        match decision {
            MergeDecision::Inserted | MergeDecision::Replaced => {
                self.store.upsert_location(&record).await?;
                info!(
                    location = %record.normalized_id,
                    external_id = %record.external_id,
                    score = record.completeness_score,
                    ?decision,
                    "location reconciled"
                );
            }
            MergeDecision::Kept => {
                debug!(
                    location = %record.normalized_id,
                    incoming_score = record.completeness_score,
                    "stored location kept"
                );
            }
        }
        Ok(decision)
    }

    /// Reconciles a batch in order. Malformed records are skipped and
    /// listed in the report; a storage failure stops the batch.
    ///
    /// # Errors
    ///
    /// [`ReconcileError::Store`] on storage failure.
    pub async fn reconcile_batch(
        &self,
        batch: impl IntoIterator<Item = LocationRecord>,
    ) -> Result<DedupReport, ReconcileError> {
        let mut report = DedupReport::default();
        for record in batch {
            let external_id = record.external_id.clone();
            match self.reconcile(record).await {
                Ok(decision) => report.record(decision),
                Err(ReconcileError::Invalid(e)) => {
                    warn!(external_id = %external_id, error = %e, "dropping location");
                    report.rejected.push(external_id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Invalid(#[from] CoreError),
    #[error(transparent)]
    Store(#[from] DbError),
}

#[cfg(test)]
#[path = "dedup_test.rs"]
mod tests;
