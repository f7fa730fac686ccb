//! In-process store.
//!
//! Timestamps are truncated to microseconds on write, the precision Postgres
//! keeps and cursors carry, so both backends page identically.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::SubsecRound;
use ldesk_core::{
    review_order, FilterQuery, LocationRecord, NormalizedId, ReviewAggregates, ReviewId,
    ReviewPredicate, ReviewRecord,
};

use crate::store::{LocationStore, NewReview, ReviewStore};
use crate::DbError;

#[derive(Debug, Default)]
struct Tables {
    locations: BTreeMap<NormalizedId, LocationRecord>,
    reviews: BTreeMap<ReviewId, ReviewRecord>,
    next_review_id: i64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    revision: AtomicU64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
    }
}

#[async_trait]
impl LocationStore for MemoryStore {
    async fn get_location(&self, id: &NormalizedId) -> Result<Option<LocationRecord>, DbError> {
        Ok(self.read().locations.get(id).cloned())
    }

    async fn upsert_location(&self, record: &LocationRecord) -> Result<(), DbError> {
        self.write()
            .locations
            .insert(record.normalized_id.clone(), record.clone());
        self.bump();
        Ok(())
    }

    async fn list_locations(&self) -> Result<Vec<LocationRecord>, DbError> {
        Ok(self.read().locations.values().cloned().collect())
    }

    async fn delete_location(&self, id: &NormalizedId) -> Result<u64, DbError> {
        let removed = {
            let mut tables = self.write();
            if tables.locations.remove(id).is_none() {
                return Err(DbError::NotFound);
            }
            let before = tables.reviews.len();
            tables.reviews.retain(|_, r| r.location_id != *id);
            before - tables.reviews.len()
        };
        self.bump();
        tracing::debug!(location = %id, reviews = removed, "location deleted with its reviews");
        Ok(removed as u64)
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn get_review(&self, id: ReviewId) -> Result<Option<ReviewRecord>, DbError> {
        Ok(self.read().reviews.get(&id).cloned())
    }

    async fn find_review_by_external_id(
        &self,
        external_review_id: &str,
    ) -> Result<Option<ReviewRecord>, DbError> {
        Ok(self
            .read()
            .reviews
            .values()
            .find(|r| r.external_review_id == external_review_id)
            .cloned())
    }

    async fn insert_review(&self, review: NewReview) -> Result<ReviewRecord, DbError> {
        let record = {
            let mut tables = self.write();
            if !tables.locations.contains_key(&review.location_id) {
                return Err(DbError::NotFound);
            }
            if tables
                .reviews
                .values()
                .any(|r| r.external_review_id == review.external_review_id)
            {
                return Err(DbError::DuplicateReview(review.external_review_id));
            }
            tables.next_review_id += 1;
            let mut record = review.into_record(ReviewId(tables.next_review_id));
            truncate_timestamps(&mut record);
            tables.reviews.insert(record.id, record.clone());
            record
        };
        self.bump();
        Ok(record)
    }

    async fn save_review(&self, record: &ReviewRecord) -> Result<(), DbError> {
        {
            let mut tables = self.write();
            let slot = tables.reviews.get_mut(&record.id).ok_or(DbError::NotFound)?;
            *slot = record.clone();
            truncate_timestamps(slot);
        }
        self.bump();
        Ok(())
    }

    async fn query_reviews(
        &self,
        query: &FilterQuery,
        limit: usize,
    ) -> Result<Vec<ReviewRecord>, DbError> {
        let predicate = query.predicate();
        let cursor = query.cursor();
        let mut rows: Vec<ReviewRecord> = self
            .read()
            .reviews
            .values()
            .filter(|r| predicate.matches(r))
            .filter(|r| cursor.is_none_or(|c| c.precedes(r)))
            .cloned()
            .collect();
        rows.sort_by(review_order);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn aggregate_reviews(
        &self,
        predicate: &ReviewPredicate,
    ) -> Result<ReviewAggregates, DbError> {
        let tables = self.read();
        Ok(ReviewAggregates::from_records(
            tables.reviews.values().filter(|r| predicate.matches(r)),
        ))
    }

    async fn revision(&self) -> Result<u64, DbError> {
        Ok(self.revision.load(Ordering::Acquire))
    }
}

fn truncate_timestamps(record: &mut ReviewRecord) {
    record.review_timestamp = record.review_timestamp.trunc_subsecs(6);
    record.reply_timestamp = record.reply_timestamp.map(|t| t.trunc_subsecs(6));
    record.updated_at = record.updated_at.trunc_subsecs(6);
}
