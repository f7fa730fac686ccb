//! Review reply lifecycle.
//!
//! ```text
//! new ──surfaced──▶ pending_reply ──reply submitted──▶ replied ─┐
//!                        ▲                               │  ▲    │ reply updated
//!                        └───────────reopened────────────┘  └────┘
//! ```
//!
//! A reply is only recorded after the provider acknowledges it. A failed
//! submission leaves the stored review untouched and is reported to the
//! caller; the engine never retries on its own.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SubsecRound, Utc};
use ldesk_core::{CoreError, IncomingReview, ReplyState, ReviewId, ReviewRecord};
use ldesk_db::{NewReview, Store};
use ldesk_provider::{ProviderError, ReplySubmitter, ReplySuggester};
use tracing::{info, warn};

use crate::error::ReviewError;
use crate::locks::KeyedLocks;

const MAX_LABEL_CHARS: usize = 64;

/// What moves a review between reply states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyEvent {
    /// The review became visible to the operator without a reply.
    Surfaced,
    /// The provider reports a reply made elsewhere.
    ProviderReplied,
    /// Our reply submission was acknowledged.
    ReplySubmitted,
    /// Our reply update was acknowledged.
    ReplyUpdated,
    /// The operator chose to edit an existing reply.
    Reopened,
}

/// The transition table. `None` means the event is illegal in `from`.
#[must_use]
pub fn next_state(from: ReplyState, event: ReplyEvent) -> Option<ReplyState> {
    use ReplyEvent as E;
    use ReplyState as S;
    match (from, event) {
        (S::New, E::Surfaced) => Some(S::PendingReply),
        (S::New | S::PendingReply | S::Replied, E::ProviderReplied)
        | (S::PendingReply, E::ReplySubmitted)
        | (S::Replied, E::ReplyUpdated) => Some(S::Replied),
        (S::Replied, E::Reopened) => Some(S::PendingReply),
        _ => None,
    }
}

/// Result of ingesting one provider review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted(ReviewId),
    Updated(ReviewId),
    Unchanged(ReviewId),
}

pub struct LifecycleEngine {
    store: Arc<dyn Store>,
    submitter: Arc<dyn ReplySubmitter>,
    suggester: Arc<dyn ReplySuggester>,
    max_reply_chars: usize,
    call_timeout: Duration,
    review_locks: KeyedLocks<ReviewId>,
    ingest_locks: KeyedLocks<String>,
}

impl std::fmt::Debug for LifecycleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleEngine")
            .field("max_reply_chars", &self.max_reply_chars)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl LifecycleEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        submitter: Arc<dyn ReplySubmitter>,
        suggester: Arc<dyn ReplySuggester>,
        max_reply_chars: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            submitter,
            suggester,
            max_reply_chars,
            call_timeout,
            review_locks: KeyedLocks::default(),
            ingest_locks: KeyedLocks::default(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// # Errors
    ///
    /// [`ReviewError::NotFound`] if no review has this id.
    pub async fn get(&self, id: ReviewId) -> Result<ReviewRecord, ReviewError> {
        self.store
            .get_review(id)
            .await?
            .ok_or(ReviewError::NotFound(id))
    }

    /// Stores or refreshes a review fetched from the provider.
    ///
    /// New reviews enter `pending_reply`, or `replied` when the provider
    /// already carries a reply. Re-ingestion refreshes content and adopts a
    /// newer provider reply but never moves a `replied` review back.
    ///
    /// # Errors
    ///
    /// [`ReviewError::Store`] on storage failure, including an unknown
    /// owning location.
    pub async fn ingest(&self, incoming: IncomingReview) -> Result<IngestOutcome, ReviewError> {
        if let Some(existing) = self
            .store
            .find_review_by_external_id(&incoming.external_review_id)
            .await?
        {
            return self.refresh(existing.id, incoming).await;
        }

        let guard = self.ingest_locks.lock(&incoming.external_review_id).await;
        // Another ingest may have inserted it while we waited.
        if let Some(existing) = self
            .store
            .find_review_by_external_id(&incoming.external_review_id)
            .await?
        {
            drop(guard);
            return self.refresh(existing.id, incoming).await;
        }

        let (reply_state, reply_text, reply_timestamp) = match &incoming.provider_reply {
            Some(reply) => (
                transition(ReviewId(0), ReplyState::New, ReplyEvent::ProviderReplied, "ingest")?,
                Some(reply.text.clone()),
                Some(reply.timestamp),
            ),
            None => (
                transition(ReviewId(0), ReplyState::New, ReplyEvent::Surfaced, "ingest")?,
                None,
                None,
            ),
        };

        let record = self
            .store
            .insert_review(NewReview {
                external_review_id: incoming.external_review_id,
                location_id: incoming.location_id,
                reviewer_name: incoming.reviewer_name,
                rating: incoming.rating,
                text: incoming.text,
                sentiment: incoming.sentiment,
                reply_state,
                reply_text,
                reply_timestamp,
                review_timestamp: incoming.review_timestamp,
                updated_at: Utc::now(),
            })
            .await?;
        Ok(IngestOutcome::Inserted(record.id))
    }

    async fn refresh(
        &self,
        id: ReviewId,
        incoming: IncomingReview,
    ) -> Result<IngestOutcome, ReviewError> {
        let _guard = self.review_locks.lock(&id).await;
        let current = self.get(id).await?;
        let mut next = current.clone();

        next.reviewer_name = incoming.reviewer_name;
        next.rating = incoming.rating;
        next.text = incoming.text;
        next.review_timestamp = incoming.review_timestamp.trunc_subsecs(6);
        if incoming.sentiment != ldesk_core::Sentiment::Unset {
            next.sentiment = incoming.sentiment;
        }

        // A provider reply we have already seen (ours, or one the operator
        // reopened for editing) is not adopted again.
        match incoming.provider_reply {
            Some(reply)
                if current
                    .reply_timestamp
                    .is_none_or(|local| reply.timestamp.trunc_subsecs(6) > local) =>
            {
                next.reply_state =
                    transition(id, current.reply_state, ReplyEvent::ProviderReplied, "ingest")?;
                next.reply_text = Some(reply.text);
                next.reply_timestamp = Some(reply.timestamp);
            }
            _ if current.reply_state == ReplyState::New => {
                next.reply_state = transition(id, current.reply_state, ReplyEvent::Surfaced, "ingest")?;
            }
            _ => {}
        }

        if next == current {
            return Ok(IngestOutcome::Unchanged(id));
        }
        next.updated_at = Utc::now();
        self.store.save_review(&next).await?;
        Ok(IngestOutcome::Updated(id))
    }

    /// Publishes the first reply to a `pending_reply` review.
    ///
    /// # Errors
    ///
    /// - [`ReviewError::Invalid`] for empty or over-long text.
    /// - [`ReviewError::IllegalTransition`] unless the review is
    ///   `pending_reply`.
    /// - [`ReviewError::Provider`] when the submission fails; nothing is
    ///   persisted.
    pub async fn reply_to_review(
        &self,
        id: ReviewId,
        text: &str,
    ) -> Result<ReviewRecord, ReviewError> {
        self.submit(id, text, ReplyEvent::ReplySubmitted, "reply to")
            .await
    }

    /// Overwrites the published reply of a `replied` review.
    ///
    /// # Errors
    ///
    /// As [`LifecycleEngine::reply_to_review`], with `replied` as the only
    /// legal starting state.
    pub async fn update_reply(
        &self,
        id: ReviewId,
        text: &str,
    ) -> Result<ReviewRecord, ReviewError> {
        self.submit(id, text, ReplyEvent::ReplyUpdated, "update the reply of")
            .await
    }

    /// Moves a `replied` review back to `pending_reply` for editing. The
    /// stored reply text is kept until a new reply replaces it.
    ///
    /// # Errors
    ///
    /// [`ReviewError::IllegalTransition`] unless the review is `replied`.
    pub async fn reopen_reply(&self, id: ReviewId) -> Result<ReviewRecord, ReviewError> {
        let _guard = self.review_locks.lock(&id).await;
        let mut review = self.get(id).await?;
        review.reply_state = transition(id, review.reply_state, ReplyEvent::Reopened, "reopen")?;
        review.updated_at = Utc::now();
        self.store.save_review(&review).await?;
        info!(review = %id, "reply reopened for editing");
        Ok(review)
    }

    /// Replies with `text`, or with a suggested reply when `text` is `None`.
    ///
    /// # Errors
    ///
    /// As [`LifecycleEngine::reply_to_review`]; a failing suggestion service
    /// is reported as [`ReviewError::Provider`].
    pub async fn approve_and_post(
        &self,
        id: ReviewId,
        text: Option<&str>,
    ) -> Result<ReviewRecord, ReviewError> {
        if let Some(text) = text {
            return self.reply_to_review(id, text).await;
        }
        let review = self.get(id).await?;
        if next_state(review.reply_state, ReplyEvent::ReplySubmitted).is_none() {
            return Err(ReviewError::IllegalTransition {
                id,
                from: review.reply_state,
                action: "reply to",
            });
        }
        let suggestion = tokio::time::timeout(self.call_timeout, self.suggester.suggest_reply(&review))
            .await
            .map_err(|_| ProviderError::Timeout)??;
        self.reply_to_review(id, &suggestion).await
    }

    /// # Errors
    ///
    /// [`ReviewError::NotFound`] if no review has this id.
    pub async fn set_read(&self, id: ReviewId, read: bool) -> Result<ReviewRecord, ReviewError> {
        self.mutate(id, |r| {
            let changed = r.is_read != read;
            r.is_read = read;
            Ok(changed)
        })
        .await
    }

    /// # Errors
    ///
    /// [`ReviewError::InvalidLabel`] for blank or over-long labels.
    pub async fn add_label(&self, id: ReviewId, label: &str) -> Result<ReviewRecord, ReviewError> {
        let label = label.trim();
        if label.is_empty() || label.chars().count() > MAX_LABEL_CHARS {
            return Err(ReviewError::InvalidLabel(label.to_owned()));
        }
        self.mutate(id, |r| Ok(r.labels.insert(label.to_owned())))
            .await
    }

    /// Applies a non-lifecycle edit under the review's lock and saves only
    /// when `edit` reports a change.
    async fn mutate<F>(&self, id: ReviewId, edit: F) -> Result<ReviewRecord, ReviewError>
    where
        F: FnOnce(&mut ReviewRecord) -> Result<bool, ReviewError>,
    {
        let _guard = self.review_locks.lock(&id).await;
        let mut review = self.get(id).await?;
        if edit(&mut review)? {
            review.updated_at = Utc::now();
            self.store.save_review(&review).await?;
        }
        Ok(review)
    }

    async fn submit(
        &self,
        id: ReviewId,
        text: &str,
        event: ReplyEvent,
        action: &'static str,
    ) -> Result<ReviewRecord, ReviewError> {
        let text = self.validate_reply(text)?;

        let _guard = self.review_locks.lock(&id).await;
        let mut review = self.get(id).await?;
        let target = transition(id, review.reply_state, event, action)?;

        let submitted = tokio::time::timeout(
            self.call_timeout,
            self.submitter.submit_reply(&review.external_review_id, text),
        )
        .await
        .map_err(|_| ProviderError::Timeout)
        .and_then(|r| r);

        let ack = match submitted {
            Ok(ack) => ack,
            Err(e) => {
                warn!(
                    review = %id,
                    kind = %e.kind(),
                    error = %e,
                    "reply submission failed; review left unchanged"
                );
                return Err(e.into());
            }
        };

        review.reply_state = target;
        review.reply_text = Some(text.to_owned());
        review.reply_timestamp = Some(ack.timestamp);
        review.updated_at = Utc::now();
        self.store.save_review(&review).await?;
        info!(review = %id, state = %review.reply_state, "reply published");
        Ok(review)
    }

    fn validate_reply<'a>(&self, text: &'a str) -> Result<&'a str, CoreError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CoreError::EmptyReply);
        }
        let len = text.chars().count();
        if len > self.max_reply_chars {
            return Err(CoreError::ReplyTooLong {
                len,
                max: self.max_reply_chars,
            });
        }
        Ok(text)
    }
}

fn transition(
    id: ReviewId,
    from: ReplyState,
    event: ReplyEvent,
    action: &'static str,
) -> Result<ReplyState, ReviewError> {
    next_state(from, event).ok_or(ReviewError::IllegalTransition { id, from, action })
}

#[cfg(test)]
#[path = "lifecycle_test.rs"]
mod tests;
