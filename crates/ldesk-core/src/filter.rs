//! Filter and cursor value objects for the review read path.
//!
//! Reviews are served in a stable total order: `review_timestamp`
//! descending, ties broken by `id` ascending. A [`Cursor`] is the last
//! `(review_timestamp, id)` pair a caller has seen; the next page holds
//! strictly the records after it under that order.

use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::identity::NormalizedId;
use crate::review::{ReplyState, ReviewId, ReviewRecord, Sentiment};

const CURSOR_VERSION: &str = "v1";

/// Opaque page boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cursor {
    pub review_timestamp: DateTime<Utc>,
    pub id: ReviewId,
}

impl Cursor {
    #[must_use]
    pub fn for_record(record: &ReviewRecord) -> Self {
        Self {
            review_timestamp: record.review_timestamp,
            id: record.id,
        }
    }

    /// `true` if `record` sorts strictly after this boundary.
    #[must_use]
    pub fn precedes(&self, record: &ReviewRecord) -> bool {
        record.review_timestamp < self.review_timestamp
            || (record.review_timestamp == self.review_timestamp && record.id > self.id)
    }

    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{CURSOR_VERSION}.{}.{}",
            self.review_timestamp.timestamp_micros(),
            self.id.0
        )
    }
}

impl FromStr for Cursor {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidCursor(s.to_owned());
        let mut parts = s.trim().splitn(3, '.');
        if parts.next() != Some(CURSOR_VERSION) {
            return Err(invalid());
        }
        let micros: i64 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let id: i64 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let review_timestamp = DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(invalid)?;
        Ok(Self {
            review_timestamp,
            id: ReviewId(id),
        })
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

/// The display order of reviews: newest first, then by id.
#[must_use]
pub fn review_order(a: &ReviewRecord, b: &ReviewRecord) -> Ordering {
    b.review_timestamp
        .cmp(&a.review_timestamp)
        .then_with(|| a.id.cmp(&b.id))
}

/// The predicate part of a [`FilterQuery`]; all set fields must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ReviewPredicate {
    pub location_id: Option<NormalizedId>,
    pub rating: Option<u8>,
    pub status: Option<ReplyState>,
    pub sentiment: Option<Sentiment>,
    /// Lowercased, trimmed, never empty.
    pub search_term: Option<String>,
}

impl ReviewPredicate {
    #[must_use]
    pub fn matches(&self, record: &ReviewRecord) -> bool {
        self.location_id
            .as_ref()
            .is_none_or(|id| *id == record.location_id)
            && self.rating.is_none_or(|r| r == record.rating)
            && self.status.is_none_or(|s| status_matches(s, record.reply_state))
            && self.sentiment.is_none_or(|s| s == record.sentiment)
            && self
                .search_term
                .as_deref()
                .is_none_or(|needle| record.matches_search(needle))
    }
}

/// `pending_reply` also selects `new` reviews, mirroring the pending counter.
fn status_matches(wanted: ReplyState, actual: ReplyState) -> bool {
    match wanted {
        ReplyState::PendingReply => actual.is_pending(),
        other => other == actual,
    }
}

/// Immutable description of one page request.
///
/// Equal queries against an unchanged review set always yield the same page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FilterQuery {
    location_id: Option<NormalizedId>,
    rating: Option<u8>,
    status: Option<ReplyState>,
    sentiment: Option<Sentiment>,
    search_term: Option<String>,
    cursor: Option<Cursor>,
}

impl FilterQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_location(mut self, id: NormalizedId) -> Self {
        self.location_id = Some(id);
        self
    }

    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRating`] outside `1..=5`.
    pub fn with_rating(mut self, rating: i64) -> Result<Self, CoreError> {
        self.rating = Some(crate::review::validate_rating(rating)?);
        Ok(self)
    }

    #[must_use]
    pub fn with_status(mut self, status: ReplyState) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_sentiment(mut self, sentiment: Sentiment) -> Self {
        self.sentiment = Some(sentiment);
        self
    }

    /// Stores the search term in canonical form (trimmed, lowercased).
    /// Blank terms clear the filter, so `"  Coffee "` and `"coffee"` are the
    /// same query.
    #[must_use]
    pub fn with_search(mut self, term: &str) -> Self {
        let term = term.trim().to_lowercase();
        self.search_term = (!term.is_empty()).then_some(term);
        self
    }

    #[must_use]
    pub fn with_cursor(mut self, cursor: Option<Cursor>) -> Self {
        self.cursor = cursor;
        self
    }

    #[must_use]
    pub fn location_id(&self) -> Option<&NormalizedId> {
        self.location_id.as_ref()
    }

    #[must_use]
    pub fn rating(&self) -> Option<u8> {
        self.rating
    }

    #[must_use]
    pub fn status(&self) -> Option<ReplyState> {
        self.status
    }

    #[must_use]
    pub fn sentiment(&self) -> Option<Sentiment> {
        self.sentiment
    }

    #[must_use]
    pub fn search_term(&self) -> Option<&str> {
        self.search_term.as_deref()
    }

    #[must_use]
    pub fn cursor(&self) -> Option<Cursor> {
        self.cursor
    }

    /// The same filter without a page boundary.
    #[must_use]
    pub fn predicate(&self) -> ReviewPredicate {
        ReviewPredicate {
            location_id: self.location_id.clone(),
            rating: self.rating,
            status: self.status,
            sentiment: self.sentiment,
            search_term: self.search_term.clone(),
        }
    }
}
