use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ldesk_core::{
    FilterQuery, LocationRecord, NormalizedId, ReplyState, ReviewAggregates, ReviewId,
    ReviewPredicate, ReviewRecord, Sentiment,
};

use crate::DbError;

/// Locations keyed by normalized id. At most one record per key.
#[async_trait]
pub trait LocationStore: Send + Sync {
    async fn get_location(&self, id: &NormalizedId) -> Result<Option<LocationRecord>, DbError>;

    /// Inserts or fully replaces the record stored under `record.normalized_id`.
    async fn upsert_location(&self, record: &LocationRecord) -> Result<(), DbError>;

    /// All locations ordered by normalized id.
    async fn list_locations(&self) -> Result<Vec<LocationRecord>, DbError>;

    /// Removes a location together with every review it owns and returns the
    /// number of reviews removed.
    ///
    /// Fails with [`DbError::NotFound`] when no such location exists.
    async fn delete_location(&self, id: &NormalizedId) -> Result<u64, DbError>;
}

/// Reviews keyed by local id.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn get_review(&self, id: ReviewId) -> Result<Option<ReviewRecord>, DbError>;

    async fn find_review_by_external_id(
        &self,
        external_review_id: &str,
    ) -> Result<Option<ReviewRecord>, DbError>;

    /// Stores a new review and assigns its local id.
    ///
    /// Fails with [`DbError::NotFound`] when the owning location is absent
    /// and [`DbError::DuplicateReview`] when the external id is taken.
    async fn insert_review(&self, review: NewReview) -> Result<ReviewRecord, DbError>;

    /// Overwrites the mutable columns of an existing review.
    async fn save_review(&self, record: &ReviewRecord) -> Result<(), DbError>;

    /// Up to `limit` reviews matching the query's predicate, strictly after
    /// its cursor, in display order.
    async fn query_reviews(
        &self,
        query: &FilterQuery,
        limit: usize,
    ) -> Result<Vec<ReviewRecord>, DbError>;

    /// Counters over every review matching `predicate`.
    async fn aggregate_reviews(
        &self,
        predicate: &ReviewPredicate,
    ) -> Result<ReviewAggregates, DbError>;

    /// Monotonic write counter shared by every handle over the same data.
    /// Changes whenever any write could have changed a query result.
    async fn revision(&self) -> Result<u64, DbError>;
}

/// Both stores behind one handle.
pub trait Store: LocationStore + ReviewStore {}

impl<T: LocationStore + ReviewStore> Store for T {}

/// A review ready to be stored for the first time.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReview {
    pub external_review_id: String,
    pub location_id: NormalizedId,
    pub reviewer_name: String,
    pub rating: u8,
    pub text: Option<String>,
    pub sentiment: Sentiment,
    pub reply_state: ReplyState,
    pub reply_text: Option<String>,
    pub reply_timestamp: Option<DateTime<Utc>>,
    pub review_timestamp: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewReview {
    pub(crate) fn into_record(self, id: ReviewId) -> ReviewRecord {
        ReviewRecord {
            id,
            external_review_id: self.external_review_id,
            location_id: self.location_id,
            reviewer_name: self.reviewer_name,
            rating: self.rating,
            text: self.text,
            sentiment: self.sentiment,
            reply_state: self.reply_state,
            reply_text: self.reply_text,
            reply_timestamp: self.reply_timestamp,
            review_timestamp: self.review_timestamp,
            is_read: false,
            labels: std::collections::BTreeSet::new(),
            updated_at: self.updated_at,
        }
    }
}
