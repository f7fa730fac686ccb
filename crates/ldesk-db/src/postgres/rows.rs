//! Row types for the `locations` and `reviews` tables and their conversion
//! into domain records.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use ldesk_core::{
    LocationFields, LocationMetadata, LocationRecord, NormalizedId, ReviewId, ReviewRecord,
};

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct LocationRow {
    pub normalized_id: String,
    pub external_id: String,
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub category: Option<String>,
    pub metadata: serde_json::Value,
    pub completeness_score: i32,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<LocationRow> for LocationRecord {
    type Error = DbError;

    fn try_from(row: LocationRow) -> Result<Self, Self::Error> {
        let normalized_id = NormalizedId::from_stored(&row.normalized_id)
            .map_err(|e| DbError::Corrupt(e.to_string()))?;
        let metadata: LocationMetadata = serde_json::from_value(row.metadata).map_err(|e| {
            DbError::Corrupt(format!("location {} metadata: {e}", row.normalized_id))
        })?;
        let completeness_score = u32::try_from(row.completeness_score).map_err(|_| {
            DbError::Corrupt(format!(
                "location {} has negative completeness score",
                row.normalized_id
            ))
        })?;
        Ok(Self {
            external_id: row.external_id,
            normalized_id,
            fields: LocationFields {
                name: row.name,
                address: row.address,
                phone: row.phone,
                website: row.website,
                category: row.category,
            },
            metadata,
            completeness_score,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct ReviewRow {
    pub id: i64,
    pub external_review_id: String,
    pub location_id: String,
    pub reviewer_name: String,
    pub rating: i16,
    pub text: Option<String>,
    pub sentiment: String,
    pub reply_state: String,
    pub reply_text: Option<String>,
    pub reply_timestamp: Option<DateTime<Utc>>,
    pub review_timestamp: DateTime<Utc>,
    pub is_read: bool,
    pub labels: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) const REVIEW_COLUMNS: &str = "id, external_review_id, location_id, reviewer_name, \
     rating, text, sentiment, reply_state, reply_text, reply_timestamp, \
     review_timestamp, is_read, labels, updated_at";

impl TryFrom<ReviewRow> for ReviewRecord {
    type Error = DbError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        let corrupt = |e: ldesk_core::CoreError| DbError::Corrupt(format!("review {}: {e}", row.id));
        Ok(Self {
            id: ReviewId(row.id),
            location_id: NormalizedId::from_stored(&row.location_id).map_err(corrupt)?,
            rating: ldesk_core::validate_rating(i64::from(row.rating)).map_err(corrupt)?,
            sentiment: row.sentiment.parse().map_err(corrupt)?,
            reply_state: row.reply_state.parse().map_err(corrupt)?,
            external_review_id: row.external_review_id,
            reviewer_name: row.reviewer_name,
            text: row.text,
            reply_text: row.reply_text,
            reply_timestamp: row.reply_timestamp,
            review_timestamp: row.review_timestamp,
            is_read: row.is_read,
            labels: row.labels.into_iter().collect::<BTreeSet<_>>(),
            updated_at: row.updated_at,
        })
    }
}
