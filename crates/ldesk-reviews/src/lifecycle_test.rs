use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone};
use ldesk_core::{
    normalize_location_id, CompletenessWeights, ErrorKind, FilterQuery, LocationFields,
    LocationMetadata, LocationRecord, ProviderReply, Sentiment,
};
use ldesk_db::{LocationStore, MemoryStore, ReviewStore};
use ldesk_provider::ReplyAck;

use super::*;

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_772_000_000 + secs, 0).unwrap()
}

#[derive(Default)]
struct FakeSubmitter {
    calls: AtomicUsize,
    failures: Mutex<HashMap<String, fn() -> ProviderError>>,
    delay: Option<Duration>,
}

impl FakeSubmitter {
    fn fail(&self, external_id: &str, err: fn() -> ProviderError) {
        self.failures
            .lock()
            .unwrap()
            .insert(external_id.to_owned(), err);
    }
}

#[async_trait]
impl ReplySubmitter for FakeSubmitter {
    async fn submit_reply(
        &self,
        review_external_id: &str,
        _text: &str,
    ) -> Result<ReplyAck, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failures.lock().unwrap().get(review_external_id).copied();
        match failure {
            Some(make) => Err(make()),
            None => Ok(ReplyAck { timestamp: ts(500) }),
        }
    }
}

struct FixedSuggester;

#[async_trait]
impl ReplySuggester for FixedSuggester {
    async fn suggest_reply(&self, review: &ReviewRecord) -> Result<String, ProviderError> {
        Ok(format!("Thanks, {}!", review.reviewer_name))
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    submitter: Arc<FakeSubmitter>,
    engine: LifecycleEngine,
}

async fn harness_with(submitter: FakeSubmitter) -> Harness {
    let store = Arc::new(MemoryStore::new());
    store
        .upsert_location(
            &LocationRecord::from_fetch(
                "accounts/7/locations/42",
                LocationFields::default(),
                LocationMetadata::default(),
                ts(0),
                &CompletenessWeights::default(),
            )
            .unwrap(),
        )
        .await
        .unwrap();
    let submitter = Arc::new(submitter);
    let engine = LifecycleEngine::new(
        store.clone(),
        submitter.clone(),
        Arc::new(FixedSuggester),
        20,
        Duration::from_millis(200),
    );
    Harness {
        store,
        submitter,
        engine,
    }
}

async fn harness() -> Harness {
    harness_with(FakeSubmitter::default()).await
}

fn incoming(external: &str, reply: Option<(&str, i64)>) -> IncomingReview {
    IncomingReview {
        external_review_id: external.to_owned(),
        location_id: normalize_location_id("42").unwrap(),
        reviewer_name: "Dana".to_owned(),
        rating: 4,
        text: Some("Good coffee".to_owned()),
        sentiment: Sentiment::Positive,
        review_timestamp: ts(10),
        provider_reply: reply.map(|(text, at)| ProviderReply {
            text: text.to_owned(),
            timestamp: ts(at),
        }),
    }
}

async fn ingest_pending(h: &Harness, external: &str) -> ReviewId {
    match h.engine.ingest(incoming(external, None)).await.unwrap() {
        IngestOutcome::Inserted(id) => id,
        other => panic!("expected insert, got {other:?}"),
    }
}

#[test]
fn new_cannot_jump_to_replied() {
    assert_eq!(next_state(ReplyState::New, ReplyEvent::ReplySubmitted), None);
    assert_eq!(next_state(ReplyState::New, ReplyEvent::ReplyUpdated), None);
    assert_eq!(
        next_state(ReplyState::PendingReply, ReplyEvent::ReplySubmitted),
        Some(ReplyState::Replied)
    );
    assert_eq!(next_state(ReplyState::Replied, ReplyEvent::ReplySubmitted), None);
    assert_eq!(
        next_state(ReplyState::Replied, ReplyEvent::Reopened),
        Some(ReplyState::PendingReply)
    );
    assert_eq!(next_state(ReplyState::PendingReply, ReplyEvent::Reopened), None);
}

#[tokio::test]
async fn ingest_surfaces_new_reviews_as_pending() {
    let h = harness().await;
    let id = ingest_pending(&h, "rev-1").await;
    let stored = h.engine.get(id).await.unwrap();
    assert_eq!(stored.reply_state, ReplyState::PendingReply);
    assert!(stored.reply_text.is_none());
}

#[tokio::test]
async fn ingest_with_provider_reply_enters_replied() {
    let h = harness().await;
    let IngestOutcome::Inserted(id) = h
        .engine
        .ingest(incoming("rev-1", Some(("Thanks!", 20))))
        .await
        .unwrap()
    else {
        panic!("expected insert");
    };
    let stored = h.engine.get(id).await.unwrap();
    assert_eq!(stored.reply_state, ReplyState::Replied);
    assert_eq!(stored.reply_text.as_deref(), Some("Thanks!"));
    assert_eq!(stored.reply_timestamp, Some(ts(20)));
}

#[tokio::test]
async fn reingesting_identical_review_is_a_no_op() {
    let h = harness().await;
    let id = ingest_pending(&h, "rev-1").await;
    let revision = h.store.revision().await.unwrap();
    let outcome = h.engine.ingest(incoming("rev-1", None)).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Unchanged(id));
    assert_eq!(h.store.revision().await.unwrap(), revision);
}

#[tokio::test]
async fn reingest_never_regresses_a_replied_review() {
    let h = harness().await;
    let id = ingest_pending(&h, "rev-1").await;
    h.engine.reply_to_review(id, "Thank you!").await.unwrap();

    h.engine.ingest(incoming("rev-1", None)).await.unwrap();
    let stored = h.engine.get(id).await.unwrap();
    assert_eq!(stored.reply_state, ReplyState::Replied);
    assert_eq!(stored.reply_text.as_deref(), Some("Thank you!"));
}

#[tokio::test]
async fn reingest_adopts_newer_provider_reply_only() {
    let h = harness().await;
    let id = ingest_pending(&h, "rev-1").await;
    h.engine.reply_to_review(id, "Thank you!").await.unwrap();

    // The provider echoes our own reply: nothing to adopt.
    h.engine
        .ingest(incoming("rev-1", Some(("Thank you!", 500))))
        .await
        .unwrap();
    assert_eq!(
        h.engine.get(id).await.unwrap().reply_text.as_deref(),
        Some("Thank you!")
    );

    // Someone edited the reply at the provider afterwards.
    h.engine
        .ingest(incoming("rev-1", Some(("Edited elsewhere", 900))))
        .await
        .unwrap();
    let stored = h.engine.get(id).await.unwrap();
    assert_eq!(stored.reply_text.as_deref(), Some("Edited elsewhere"));
    assert_eq!(stored.reply_timestamp, Some(ts(900)));
}

#[tokio::test]
async fn reopened_review_stays_pending_across_syncs() {
    let h = harness().await;
    let id = ingest_pending(&h, "rev-1").await;
    h.engine.reply_to_review(id, "Thank you!").await.unwrap();
    let reopened = h.engine.reopen_reply(id).await.unwrap();
    assert_eq!(reopened.reply_state, ReplyState::PendingReply);
    assert_eq!(reopened.reply_text.as_deref(), Some("Thank you!"));

    h.engine
        .ingest(incoming("rev-1", Some(("Thank you!", 500))))
        .await
        .unwrap();
    assert_eq!(
        h.engine.get(id).await.unwrap().reply_state,
        ReplyState::PendingReply
    );
}

#[tokio::test]
async fn a_stored_new_review_is_surfaced_on_the_next_ingest() {
    let h = harness().await;
    let record = h
        .store
        .insert_review(ldesk_db::NewReview {
            external_review_id: "rev-new".to_owned(),
            location_id: normalize_location_id("42").unwrap(),
            reviewer_name: "Dana".to_owned(),
            rating: 4,
            text: Some("Good coffee".to_owned()),
            sentiment: Sentiment::Positive,
            reply_state: ReplyState::New,
            reply_text: None,
            reply_timestamp: None,
            review_timestamp: ts(10),
            updated_at: ts(10),
        })
        .await
        .unwrap();
    let outcome = h.engine.ingest(incoming("rev-new", None)).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Updated(record.id));
    assert_eq!(
        h.engine.get(record.id).await.unwrap().reply_state,
        ReplyState::PendingReply
    );
}

#[tokio::test]
async fn successful_reply_records_text_and_leaves_pending_filter() {
    let h = harness().await;
    let id = ingest_pending(&h, "rev-1").await;

    let replied = h.engine.reply_to_review(id, "Thank you!").await.unwrap();
    assert_eq!(replied.reply_state, ReplyState::Replied);
    assert_eq!(replied.reply_text.as_deref(), Some("Thank you!"));
    assert_eq!(replied.reply_timestamp, Some(ts(500)));

    let pending = FilterQuery::new().with_status(ReplyState::PendingReply);
    let rows = h.store.query_reviews(&pending, 10).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn replying_twice_is_illegal_but_update_is_allowed() {
    let h = harness().await;
    let id = ingest_pending(&h, "rev-1").await;

    let early_update = h.engine.update_reply(id, "Edited").await.unwrap_err();
    assert!(matches!(early_update, ReviewError::IllegalTransition { .. }));

    h.engine.reply_to_review(id, "Thank you!").await.unwrap();
    let again = h.engine.reply_to_review(id, "Thanks again").await.unwrap_err();
    assert!(matches!(
        again,
        ReviewError::IllegalTransition {
            from: ReplyState::Replied,
            ..
        }
    ));

    let updated = h.engine.update_reply(id, "Edited").await.unwrap();
    assert_eq!(updated.reply_state, ReplyState::Replied);
    assert_eq!(updated.reply_text.as_deref(), Some("Edited"));
    assert_eq!(h.submitter.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_submission_leaves_review_untouched() {
    let h = harness().await;
    let id = ingest_pending(&h, "rev-1").await;
    h.submitter
        .fail("rev-1", || ProviderError::Server { status: 503 });
    let before = h.engine.get(id).await.unwrap();

    let err = h.engine.reply_to_review(id, "Thank you!").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert_eq!(h.engine.get(id).await.unwrap(), before);
    assert_eq!(h.submitter.calls.load(Ordering::SeqCst), 1, "never retried");
}

#[tokio::test]
async fn scope_failure_signals_reauthorization() {
    let h = harness().await;
    let id = ingest_pending(&h, "rev-1").await;
    h.submitter.fail("rev-1", || {
        ProviderError::InsufficientScope("business.manage".to_owned())
    });

    let err = h.engine.reply_to_review(id, "Thank you!").await.unwrap_err();
    assert!(err.reauthorize());
}

#[tokio::test]
async fn invalid_text_is_rejected_before_submission() {
    let h = harness().await;
    let id = ingest_pending(&h, "rev-1").await;

    let empty = h.engine.reply_to_review(id, "   ").await.unwrap_err();
    assert!(matches!(empty, ReviewError::Invalid(CoreError::EmptyReply)));

    let long = "x".repeat(21);
    let too_long = h.engine.reply_to_review(id, &long).await.unwrap_err();
    assert!(matches!(
        too_long,
        ReviewError::Invalid(CoreError::ReplyTooLong { len: 21, max: 20 })
    ));
    assert_eq!(too_long.kind(), ErrorKind::Validation);
    assert_eq!(h.submitter.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn slow_submission_times_out_as_transient() {
    let h = harness_with(FakeSubmitter {
        delay: Some(Duration::from_secs(5)),
        ..FakeSubmitter::default()
    })
    .await;
    let id = ingest_pending(&h, "rev-1").await;

    let err = h.engine.reply_to_review(id, "Thank you!").await.unwrap_err();
    assert!(matches!(err, ReviewError::Provider(ProviderError::Timeout)));
    assert_eq!(
        h.engine.get(id).await.unwrap().reply_state,
        ReplyState::PendingReply
    );
}

#[tokio::test]
async fn approve_without_text_uses_suggestion() {
    let h = harness().await;
    let id = ingest_pending(&h, "rev-1").await;
    let replied = h.engine.approve_and_post(id, None).await.unwrap();
    assert_eq!(replied.reply_text.as_deref(), Some("Thanks, Dana!"));
}

#[tokio::test]
async fn read_flag_and_labels() {
    let h = harness().await;
    let id = ingest_pending(&h, "rev-1").await;

    assert!(h.engine.set_read(id, true).await.unwrap().is_read);
    let revision = h.store.revision().await.unwrap();
    h.engine.set_read(id, true).await.unwrap();
    assert_eq!(
        h.store.revision().await.unwrap(),
        revision,
        "unchanged flag is not rewritten"
    );

    let labelled = h.engine.add_label(id, " follow-up ").await.unwrap();
    assert!(labelled.labels.contains("follow-up"));
    assert!(matches!(
        h.engine.add_label(id, "  ").await,
        Err(ReviewError::InvalidLabel(_))
    ));
}

#[tokio::test]
async fn unknown_review_is_not_found() {
    let h = harness().await;
    let err = h.engine.reply_to_review(ReviewId(999), "Hi").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
