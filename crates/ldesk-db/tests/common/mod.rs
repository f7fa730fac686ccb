//! Fixtures and store-contract checks shared by the memory and live suites.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use ldesk_core::{
    normalize_location_id, CompletenessWeights, Cursor, FilterQuery, LocationFields,
    LocationMetadata, LocationRecord, NormalizedId, ReplyState, ReviewRecord, Sentiment,
};
use ldesk_db::{DbError, NewReview, Store};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap()
}

pub fn location(external_id: &str, name: &str) -> LocationRecord {
    LocationRecord::from_fetch(
        external_id,
        LocationFields {
            name: Some(name.to_owned()),
            phone: Some("+1 555 0100".to_owned()),
            ..LocationFields::default()
        },
        LocationMetadata::default(),
        base_time(),
        &CompletenessWeights::default(),
    )
    .unwrap()
}

pub fn loc_id(raw: &str) -> NormalizedId {
    normalize_location_id(raw).unwrap()
}

pub fn new_review(external: &str, location: &str, rating: u8, minutes_ago: i64) -> NewReview {
    NewReview {
        external_review_id: external.to_owned(),
        location_id: loc_id(location),
        reviewer_name: format!("Reviewer {external}"),
        rating,
        text: Some(format!("Review body for {external}")),
        sentiment: Sentiment::Neutral,
        reply_state: ReplyState::PendingReply,
        reply_text: None,
        reply_timestamp: None,
        review_timestamp: base_time() - Duration::minutes(minutes_ago),
        updated_at: base_time(),
    }
}

/// Follows cursors until exhausted and returns every id seen, in order.
pub async fn drain<S: Store>(store: &S, query: FilterQuery, page: usize) -> Vec<ReviewRecord> {
    let mut out = Vec::new();
    let mut query = query;
    loop {
        let rows = store.query_reviews(&query, page).await.unwrap();
        let Some(last) = rows.last() else { break };
        let cursor = Cursor::for_record(last);
        let short = rows.len() < page;
        out.extend(rows);
        if short {
            break;
        }
        query = query.with_cursor(Some(cursor));
    }
    out
}

pub async fn seed<S: Store>(store: &S) {
    store.upsert_location(&location("locations/42", "Harbor Cafe")).await.unwrap();
    store.upsert_location(&location("accounts/7/locations/77", "Mill Street")).await.unwrap();
    // Two reviews share a timestamp to exercise the id tie-break.
    let specs = [
        ("r1", "42", 5, 10),
        ("r2", "42", 4, 20),
        ("r3", "42", 1, 20),
        ("r4", "77", 3, 30),
        ("r5", "42", 2, 40),
        ("r6", "77", 5, 50),
        ("r7", "42", 4, 60),
    ];
    for (ext, loc, rating, ago) in specs {
        store.insert_review(new_review(ext, loc, rating, ago)).await.unwrap();
    }
}

pub async fn check_location_upsert_replaces<S: Store>(store: &S) {
    let id = loc_id("42");
    store.upsert_location(&location("locations/42", "Old Name")).await.unwrap();
    store
        .upsert_location(&location("accounts/9/locations/42", "New Name"))
        .await
        .unwrap();
    let all = store.list_locations().await.unwrap();
    assert_eq!(all.len(), 1);
    let stored = store.get_location(&id).await.unwrap().unwrap();
    assert_eq!(stored.fields.name.as_deref(), Some("New Name"));
    assert_eq!(stored.external_id, "accounts/9/locations/42");
}

pub async fn check_paging_is_exhaustive<S: Store>(store: &S) {
    seed(store).await;
    for page in [1, 2, 3, 7, 50] {
        let rows = drain(store, FilterQuery::new(), page).await;
        let ids: Vec<&str> = rows.iter().map(|r| r.external_review_id.as_str()).collect();
        assert_eq!(ids.len(), 7, "page size {page}");
        let mut unique = ids.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 7, "duplicates with page size {page}");
    }
    let ordered = drain(store, FilterQuery::new(), 3).await;
    for pair in ordered.windows(2) {
        assert_eq!(
            ldesk_core::review_order(&pair[0], &pair[1]),
            std::cmp::Ordering::Less
        );
    }
}

pub async fn check_filters_and_aggregates<S: Store>(store: &S) {
    seed(store).await;
    let q = FilterQuery::new().with_location(loc_id("77"));
    let rows = drain(store, q.clone(), 10).await;
    assert_eq!(rows.len(), 2);

    let agg = store.aggregate_reviews(&q.predicate()).await.unwrap();
    assert_eq!(agg.total, 2);
    assert_eq!(agg.pending, 2);
    assert_eq!(agg.average_rating, Some(4.0));

    let five_star = FilterQuery::new().with_rating(5).unwrap();
    assert_eq!(drain(store, five_star, 10).await.len(), 2);

    let search = FilterQuery::new().with_search("REVIEWER R3");
    let hits = drain(store, search, 10).await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].external_review_id, "r3");

    let all = store.aggregate_reviews(&FilterQuery::new().predicate()).await.unwrap();
    assert_eq!(all.total, 7);
    assert_eq!(all.replied, 0);
}

pub async fn check_save_changes_state<S: Store>(store: &S) {
    seed(store).await;
    let before = store.revision().await.unwrap();
    let mut r = store.find_review_by_external_id("r2").await.unwrap().unwrap();
    r.reply_state = ReplyState::Replied;
    r.reply_text = Some("Thank you!".to_owned());
    r.reply_timestamp = Some(base_time());
    r.is_read = true;
    r.labels.insert("vip".to_owned());
    store.save_review(&r).await.unwrap();
    assert!(store.revision().await.unwrap() > before);

    let stored = store.get_review(r.id).await.unwrap().unwrap();
    assert_eq!(stored, r);

    let pending = FilterQuery::new().with_status(ReplyState::PendingReply);
    let rows = drain(store, pending, 10).await;
    assert!(rows.iter().all(|row| row.id != r.id));
    let agg = store.aggregate_reviews(&FilterQuery::new().predicate()).await.unwrap();
    assert_eq!((agg.total, agg.pending, agg.replied), (7, 6, 1));
}

pub async fn check_insert_rules<S: Store>(store: &S) {
    seed(store).await;
    let orphan = store.insert_review(new_review("r9", "999", 3, 1)).await;
    assert!(matches!(orphan, Err(DbError::NotFound)));
    let dup = store.insert_review(new_review("r1", "42", 3, 1)).await;
    assert!(matches!(dup, Err(DbError::DuplicateReview(_))));
}

pub async fn check_delete_cascades<S: Store>(store: &S) {
    seed(store).await;
    let removed = store.delete_location(&loc_id("42")).await.unwrap();
    assert_eq!(removed, 5);
    assert!(store.get_location(&loc_id("42")).await.unwrap().is_none());
    let left = drain(store, FilterQuery::new(), 10).await;
    assert_eq!(left.len(), 2);
    assert!(left.iter().all(|r| r.location_id.as_str() == "77"));
    assert!(matches!(
        store.delete_location(&loc_id("42")).await,
        Err(DbError::NotFound)
    ));
}

/// `writer` and `reader` are separate handles over the same data.
pub async fn check_revision_is_shared_across_handles<S: Store>(writer: &S, reader: &S) {
    seed(writer).await;
    let pending = FilterQuery::new().with_status(ReplyState::PendingReply).predicate();
    let before = reader.revision().await.unwrap();
    assert_eq!(reader.aggregate_reviews(&pending).await.unwrap().pending, 7);

    let mut r = writer.find_review_by_external_id("r1").await.unwrap().unwrap();
    r.reply_state = ReplyState::Replied;
    r.reply_text = Some("Thank you!".to_owned());
    writer.save_review(&r).await.unwrap();

    assert!(reader.revision().await.unwrap() > before);
    assert_eq!(reader.aggregate_reviews(&pending).await.unwrap().pending, 6);
}
