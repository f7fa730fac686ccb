//! The collaborator contracts the core consumes.
//!
//! Every call is expected to be bounded in time by the caller; implementors
//! only need to report failures with the right [`ProviderError`] class.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ldesk_core::{IncomingReview, LocationRecord, ReviewRecord};

use crate::error::ProviderError;

#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Fetches one location by any identifier shape the provider accepts.
    async fn fetch_location(&self, external_id: &str) -> Result<LocationRecord, ProviderError>;
}

/// One page of a location's reviews.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewBatch {
    pub reviews: Vec<IncomingReview>,
    pub next_page_token: Option<String>,
}

#[async_trait]
pub trait ReviewSource: Send + Sync {
    async fn list_reviews(
        &self,
        location_external_id: &str,
        page_token: Option<&str>,
    ) -> Result<ReviewBatch, ProviderError>;
}

/// Provider acknowledgment of a published reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyAck {
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait ReplySubmitter: Send + Sync {
    /// Publishes (or overwrites) the reply to a review.
    async fn submit_reply(
        &self,
        review_external_id: &str,
        text: &str,
    ) -> Result<ReplyAck, ProviderError>;
}

/// Opaque reply-text suggestion service.
#[async_trait]
pub trait ReplySuggester: Send + Sync {
    async fn suggest_reply(&self, review: &ReviewRecord) -> Result<String, ProviderError>;
}
