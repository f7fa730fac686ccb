use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ldesk_core::{
    normalize_location_id, CompletenessWeights, LocationFields, LocationMetadata, LocationRecord,
    NormalizedId, ReplyState, ReviewId, Sentiment,
};
use ldesk_db::{LocationStore, MemoryStore, NewReview, ReviewStore};

use super::*;

/// Delegates to a [`MemoryStore`], counting reads and optionally stalling
/// them so concurrent callers overlap. Handles built by [`Self::handle`]
/// share the data but not the counters.
#[derive(Default)]
struct CountingStore {
    inner: Arc<MemoryStore>,
    query_calls: AtomicUsize,
    aggregate_calls: AtomicUsize,
    stall: Option<Duration>,
}

impl CountingStore {
    fn handle(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            ..Self::default()
        }
    }
}

#[async_trait]
impl LocationStore for CountingStore {
    async fn get_location(&self, id: &NormalizedId) -> Result<Option<LocationRecord>, DbError> {
        self.inner.get_location(id).await
    }
    async fn upsert_location(&self, record: &LocationRecord) -> Result<(), DbError> {
        self.inner.upsert_location(record).await
    }
    async fn list_locations(&self) -> Result<Vec<LocationRecord>, DbError> {
        self.inner.list_locations().await
    }
    async fn delete_location(&self, id: &NormalizedId) -> Result<u64, DbError> {
        self.inner.delete_location(id).await
    }
}

#[async_trait]
impl ReviewStore for CountingStore {
    async fn get_review(&self, id: ReviewId) -> Result<Option<ReviewRecord>, DbError> {
        self.inner.get_review(id).await
    }
    async fn find_review_by_external_id(
        &self,
        external_review_id: &str,
    ) -> Result<Option<ReviewRecord>, DbError> {
        self.inner.find_review_by_external_id(external_review_id).await
    }
    async fn insert_review(&self, review: NewReview) -> Result<ReviewRecord, DbError> {
        self.inner.insert_review(review).await
    }
    async fn save_review(&self, record: &ReviewRecord) -> Result<(), DbError> {
        self.inner.save_review(record).await
    }
    async fn query_reviews(
        &self,
        query: &FilterQuery,
        limit: usize,
    ) -> Result<Vec<ReviewRecord>, DbError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(stall) = self.stall {
            tokio::time::sleep(stall).await;
        }
        self.inner.query_reviews(query, limit).await
    }
    async fn aggregate_reviews(
        &self,
        predicate: &ReviewPredicate,
    ) -> Result<ReviewAggregates, DbError> {
        self.aggregate_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.aggregate_reviews(predicate).await
    }
    async fn revision(&self) -> Result<u64, DbError> {
        self.inner.revision().await
    }
}

fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() - chrono::Duration::minutes(minutes)
}

fn loc(n: &str) -> NormalizedId {
    normalize_location_id(n).unwrap()
}

async fn seeded(stall: Option<Duration>, count: i64) -> Arc<CountingStore> {
    let store = Arc::new(CountingStore {
        stall,
        ..CountingStore::default()
    });
    for id in ["locations/1", "locations/2"] {
        store
            .upsert_location(
                &LocationRecord::from_fetch(
                    id,
                    LocationFields::default(),
                    LocationMetadata::default(),
                    at(0),
                    &CompletenessWeights::default(),
                )
                .unwrap(),
            )
            .await
            .unwrap();
    }
    for i in 0..count {
        let rating = u8::try_from(i % 5 + 1).unwrap();
        let state = match i % 3 {
            0 => ReplyState::Replied,
            _ => ReplyState::PendingReply,
        };
        store
            .insert_review(NewReview {
                external_review_id: format!("rev-{i}"),
                location_id: loc(if i % 2 == 0 { "1" } else { "2" }),
                reviewer_name: if i % 4 == 0 { "Morgan Lee" } else { "Sam Ortiz" }.to_owned(),
                rating,
                text: Some(format!("visit number {i}")),
                sentiment: if rating >= 4 {
                    Sentiment::Positive
                } else {
                    Sentiment::Negative
                },
                reply_state: state,
                reply_text: (state == ReplyState::Replied).then(|| "Thanks".to_owned()),
                reply_timestamp: None,
                // Groups of three share a timestamp to exercise the tie-break.
                review_timestamp: at(i / 3),
                updated_at: at(0),
            })
            .await
            .unwrap();
    }
    store
}

async fn drain(engine: &PaginationEngine, query: FilterQuery, page: usize) -> Vec<ReviewRecord> {
    let mut out = Vec::new();
    let mut query = query;
    loop {
        let result = engine.query(query.clone(), Some(page)).await.unwrap();
        out.extend(result.items);
        match result.next_cursor {
            Some(cursor) => query = query.with_cursor(Some(cursor)),
            None => break,
        }
    }
    out
}

fn filters() -> Vec<FilterQuery> {
    vec![
        FilterQuery::new(),
        FilterQuery::new().with_location(loc("2")),
        FilterQuery::new().with_rating(5).unwrap(),
        FilterQuery::new().with_status(ReplyState::PendingReply),
        FilterQuery::new().with_status(ReplyState::Replied),
        FilterQuery::new().with_sentiment(Sentiment::Negative),
        FilterQuery::new().with_search("morgan"),
        FilterQuery::new()
            .with_location(loc("1"))
            .with_status(ReplyState::PendingReply)
            .with_search("VISIT"),
    ]
}

#[tokio::test]
async fn following_cursors_yields_every_match_once() {
    let store = seeded(None, 23).await;
    let engine = PaginationEngine::new(store.clone(), 25);

    for page in [1, 4, 5, 23, 100] {
        let all = drain(&engine, FilterQuery::new(), page).await;
        assert_eq!(all.len(), 23, "page size {page}");
        let ids: HashSet<ReviewId> = all.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 23, "duplicates at page size {page}");
        assert!(all
            .windows(2)
            .all(|w| ldesk_core::review_order(&w[0], &w[1]).is_lt()));
    }
}

#[tokio::test]
async fn aggregates_match_exhaustive_pagination() {
    let store = seeded(None, 23).await;
    let engine = PaginationEngine::new(store.clone(), 25);

    for query in filters() {
        let rows = drain(&engine, query.clone(), 4).await;
        let first = engine.query(query.clone(), Some(4)).await.unwrap();
        let expected = ReviewAggregates::from_records(rows.iter());
        assert_eq!(first.aggregates, expected, "filter {query:?}");
        assert!(rows.iter().all(|r| query.predicate().matches(r)));
    }
}

#[tokio::test]
async fn unfiltered_counters_are_global() {
    let store = seeded(None, 23).await;
    let engine = PaginationEngine::new(store.clone(), 25);
    let page = engine.query(FilterQuery::new(), Some(2)).await.unwrap();
    // i % 3 == 0 for 0, 3, ..., 21.
    assert_eq!(page.aggregates.total, 23);
    assert_eq!(page.aggregates.replied, 8);
    assert_eq!(page.aggregates.pending, 15);
    assert_eq!(page.items.len(), 2);
}

#[tokio::test]
async fn reissuing_a_query_returns_the_same_page() {
    let store = seeded(None, 12).await;
    let engine = PaginationEngine::new(store.clone(), 25);
    let first = engine.query(FilterQuery::new(), Some(5)).await.unwrap();
    let next = FilterQuery::new().with_cursor(first.next_cursor);
    let a = engine.query(next.clone(), Some(5)).await.unwrap();
    let b = engine.query(next, Some(5)).await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn last_page_has_no_cursor() {
    let store = seeded(None, 10).await;
    let engine = PaginationEngine::new(store.clone(), 25);
    let page = engine.query(FilterQuery::new(), Some(10)).await.unwrap();
    assert_eq!(page.items.len(), 10);
    assert!(page.next_cursor.is_none());

    let empty = engine
        .query(FilterQuery::new().with_search("nobody"), None)
        .await
        .unwrap();
    assert!(empty.items.is_empty());
    assert_eq!(empty.aggregates.total, 0);
    assert!(empty.aggregates.average_rating.is_none());
}

#[tokio::test]
async fn aggregates_are_cached_until_a_write() {
    let store = seeded(None, 9).await;
    let engine = PaginationEngine::new(store.clone(), 25);

    let first = engine.query(FilterQuery::new(), Some(3)).await.unwrap();
    engine
        .query(FilterQuery::new().with_cursor(first.next_cursor), Some(3))
        .await
        .unwrap();
    assert_eq!(store.aggregate_calls.load(Ordering::SeqCst), 1);

    let mut review = first.items[0].clone();
    review.reply_state = ReplyState::Replied;
    store.save_review(&review).await.unwrap();

    let after = engine.query(FilterQuery::new(), Some(3)).await.unwrap();
    assert_eq!(store.aggregate_calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        after.aggregates,
        ReviewAggregates::from_records(drain(&engine, FilterQuery::new(), 50).await.iter())
    );
}

#[tokio::test]
async fn identical_concurrent_queries_share_one_read() {
    let store = seeded(Some(Duration::from_millis(50)), 6).await;
    let engine = PaginationEngine::new(store.clone(), 25);

    let a = engine.query(FilterQuery::new().with_search("  Morgan "), None);
    let b = engine.query(FilterQuery::new().with_search("morgan"), None);
    let (a, b) = tokio::join!(a, b);
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(store.query_calls.load(Ordering::SeqCst), 1);

    // Once settled, the next identical query reads again.
    engine
        .query(FilterQuery::new().with_search("morgan"), None)
        .await
        .unwrap();
    assert_eq!(store.query_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn aggregates_follow_writes_from_another_handle() {
    let store = seeded(None, 9).await;
    let engine = PaginationEngine::new(store.clone(), 25);
    let other = store.handle();

    let pending = FilterQuery::new().with_status(ReplyState::PendingReply);
    let before = engine.query(pending.clone(), Some(3)).await.unwrap();
    assert_eq!(before.aggregates.pending, 6);

    let mut review = before.items[0].clone();
    review.reply_state = ReplyState::Replied;
    other.save_review(&review).await.unwrap();

    let after = engine.query(pending.clone(), Some(50)).await.unwrap();
    assert_eq!(after.items.len(), 5);
    assert_eq!(after.aggregates.pending, 5);
}

#[tokio::test]
async fn abandoned_reads_do_not_linger() {
    let store = seeded(Some(Duration::from_secs(60)), 6).await;
    let engine = PaginationEngine::new(store.clone(), 25);

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .query(FilterQuery::new().with_search(&format!("visit {i}")), None)
                    .await
            })
        })
        .collect();
    while store.query_calls.load(Ordering::SeqCst) < 20 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(engine.inner.in_flight.lock().unwrap().len(), 20);

    for task in tasks {
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
    }
    assert!(engine.inner.in_flight.lock().unwrap().is_empty());
}

#[tokio::test]
async fn settled_reads_are_retired() {
    let store = seeded(None, 6).await;
    let engine = PaginationEngine::new(store.clone(), 25);
    engine.query(FilterQuery::new(), None).await.unwrap();
    let mut review = store.get_review(ReviewId(1)).await.unwrap().unwrap();
    review.is_read = true;
    store.save_review(&review).await.unwrap();
    engine.query(FilterQuery::new(), None).await.unwrap();
    assert!(engine.inner.in_flight.lock().unwrap().is_empty());
}

#[test]
fn page_size_is_clamped() {
    assert_eq!(clamp_page_size(0), 1);
    assert_eq!(clamp_page_size(25), 25);
    assert_eq!(clamp_page_size(10_000), MAX_PAGE_SIZE);
}

#[test]
fn page_serializes_cursor_in_wire_form() {
    let page = ReviewPage {
        items: Vec::new(),
        next_cursor: Some(ldesk_core::Cursor {
            review_timestamp: Utc.timestamp_opt(1, 0).unwrap(),
            id: ReviewId(9),
        }),
        aggregates: ReviewAggregates::default(),
    };
    let json = serde_json::to_value(&page).unwrap();
    assert_eq!(json["next_cursor"], "v1.1000000.9");
}
