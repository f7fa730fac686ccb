use async_trait::async_trait;
use ldesk_core::ReviewRecord;

use crate::contract::ReplySuggester;
use crate::error::ProviderError;

/// Suggests a canned reply chosen by star rating.
///
/// Stands in for a text-generation service when none is configured.
#[derive(Debug, Clone, Default)]
pub struct TemplateSuggester;

#[async_trait]
impl ReplySuggester for TemplateSuggester {
    async fn suggest_reply(&self, review: &ReviewRecord) -> Result<String, ProviderError> {
        let name = review.reviewer_name.trim();
        let greeting = if name.is_empty() {
            "Hi,".to_owned()
        } else {
            format!("Hi {name},")
        };
        let body = match review.rating {
            5 | 4 => "thank you for the kind words! We're glad you enjoyed your visit and hope to see you again soon.",
            3 => "thanks for your feedback. We're always working to improve and hope your next visit is even better.",
            _ => "we're sorry your experience fell short. Please reach out to us directly so we can make it right.",
        };
        Ok(format!("{greeting} {body}"))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Utc;
    use ldesk_core::{normalize_location_id, ReplyState, ReviewId, Sentiment};

    use super::*;

    fn review(rating: u8, reviewer: &str) -> ReviewRecord {
        ReviewRecord {
            id: ReviewId(1),
            external_review_id: "accounts/1/locations/2/reviews/a".to_owned(),
            location_id: normalize_location_id("2").unwrap(),
            reviewer_name: reviewer.to_owned(),
            rating,
            text: None,
            sentiment: Sentiment::Unset,
            reply_state: ReplyState::PendingReply,
            reply_text: None,
            reply_timestamp: None,
            review_timestamp: Utc::now(),
            is_read: false,
            labels: BTreeSet::new(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn tone_follows_rating() {
        let s = TemplateSuggester;
        let happy = s.suggest_reply(&review(5, "Sam")).await.unwrap();
        let unhappy = s.suggest_reply(&review(1, "Sam")).await.unwrap();
        assert!(happy.starts_with("Hi Sam,"));
        assert!(happy.contains("thank you"));
        assert!(unhappy.contains("sorry"));
    }

    #[tokio::test]
    async fn anonymous_reviewer_gets_plain_greeting() {
        let text = TemplateSuggester.suggest_reply(&review(3, "  ")).await.unwrap();
        assert!(text.starts_with("Hi, thanks"));
    }
}
