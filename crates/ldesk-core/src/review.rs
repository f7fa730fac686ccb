use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::identity::NormalizedId;

/// Local review key, assigned by the store on first ingestion.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ReviewId(pub i64);

impl std::fmt::Display for ReviewId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a review stands in the reply lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyState {
    New,
    #[serde(alias = "pending")]
    PendingReply,
    Replied,
}

impl ReplyState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::PendingReply => "pending_reply",
            Self::Replied => "replied",
        }
    }

    /// `new` reviews are awaiting a reply just like `pending_reply` ones;
    /// they only exist between ingestion and the automatic transition.
    #[must_use]
    pub fn is_pending(self) -> bool {
        matches!(self, Self::New | Self::PendingReply)
    }
}

impl FromStr for ReplyState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(Self::New),
            "pending" | "pending_reply" => Ok(Self::PendingReply),
            "replied" => Ok(Self::Replied),
            other => Err(CoreError::UnknownVariant {
                field: "status",
                value: other.to_owned(),
            }),
        }
    }
}

impl std::fmt::Display for ReplyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
    #[default]
    Unset,
}

impl Sentiment {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
            Self::Unset => "unset",
        }
    }
}

impl FromStr for Sentiment {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(Self::Positive),
            "neutral" => Ok(Self::Neutral),
            "negative" => Ok(Self::Negative),
            "unset" | "" => Ok(Self::Unset),
            other => Err(CoreError::UnknownVariant {
                field: "sentiment",
                value: other.to_owned(),
            }),
        }
    }
}

/// Checks a provider or caller supplied star rating.
///
/// # Errors
///
/// Returns [`CoreError::InvalidRating`] outside `1..=5`.
pub fn validate_rating(rating: i64) -> Result<u8, CoreError> {
    match u8::try_from(rating) {
        Ok(r @ 1..=5) => Ok(r),
        _ => Err(CoreError::InvalidRating(rating)),
    }
}

/// A customer review owned by exactly one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: ReviewId,
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
    pub is_read: bool,
    pub labels: BTreeSet<String>,
    pub updated_at: DateTime<Utc>,
}

impl ReviewRecord {
    /// Case-insensitive substring match over reviewer name and review text.
    /// `needle` must already be lowercased.
    #[must_use]
    pub fn matches_search(&self, needle: &str) -> bool {
        self.reviewer_name.to_lowercase().contains(needle)
            || self
                .text
                .as_deref()
                .is_some_and(|t| t.to_lowercase().contains(needle))
    }
}

/// A review as fetched from the provider, before it has a local id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingReview {
    pub external_review_id: String,
    pub location_id: NormalizedId,
    pub reviewer_name: String,
    pub rating: u8,
    pub text: Option<String>,
    pub sentiment: Sentiment,
    pub review_timestamp: DateTime<Utc>,
    /// Reply already published at the provider, if any.
    pub provider_reply: Option<ProviderReply>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderReply {
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Counters reported alongside every review page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewAggregates {
    pub total: u64,
    pub pending: u64,
    pub replied: u64,
    /// `None` when `total` is zero.
    pub average_rating: Option<f64>,
}

impl ReviewAggregates {
    /// Folds a set of reviews into counters.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ReviewRecord>) -> Self {
        let mut total = 0u64;
        let mut pending = 0u64;
        let mut replied = 0u64;
        let mut rating_sum = 0u64;
        for r in records {
            total += 1;
            rating_sum += u64::from(r.rating);
            match r.reply_state {
                ReplyState::Replied => replied += 1,
                ReplyState::New | ReplyState::PendingReply => pending += 1,
            }
        }
        Self::from_counts(total, pending, replied, rating_sum)
    }

    #[must_use]
    pub fn from_counts(total: u64, pending: u64, replied: u64, rating_sum: u64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let average_rating = (total > 0).then(|| rating_sum as f64 / total as f64);
        Self {
            total,
            pending,
            replied,
            average_rating,
        }
    }
}
