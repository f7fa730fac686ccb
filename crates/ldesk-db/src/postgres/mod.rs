//! Postgres-backed store.

mod rows;

use async_trait::async_trait;
use ldesk_core::{
    FilterQuery, LocationRecord, NormalizedId, ReplyState, ReviewAggregates, ReviewId,
    ReviewPredicate, ReviewRecord,
};
use sqlx::{PgPool, Postgres, QueryBuilder};

use self::rows::{LocationRow, ReviewRow, REVIEW_COLUMNS};
use crate::store::{LocationStore, NewReview, ReviewStore};
use crate::DbError;

const LOCATION_COLUMNS: &str = "normalized_id, external_id, name, address, phone, website, \
     category, metadata, completeness_score, updated_at";

/// Store over a Postgres pool.
///
/// The revision lives in the `store_revision` row, moved by statement
/// triggers on `locations` and `reviews`, so writes from any process count.
#[derive(Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn location_exists(&self, id: &NormalizedId) -> Result<bool, DbError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM locations WHERE normalized_id = $1)",
        )
        .bind(id.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

#[async_trait]
impl LocationStore for PgStore {
    async fn get_location(&self, id: &NormalizedId) -> Result<Option<LocationRecord>, DbError> {
        let row = sqlx::query_as::<_, LocationRow>(&format!(
            "SELECT {LOCATION_COLUMNS} FROM locations WHERE normalized_id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(LocationRecord::try_from).transpose()
    }

    async fn upsert_location(&self, record: &LocationRecord) -> Result<(), DbError> {
        let metadata = serde_json::to_value(&record.metadata)
            .map_err(|e| DbError::Corrupt(format!("location metadata: {e}")))?;
        let score = i32::try_from(record.completeness_score)
            .map_err(|_| DbError::Corrupt("completeness score overflows i32".to_owned()))?;
        sqlx::query(
            "INSERT INTO locations \
                 (normalized_id, external_id, name, address, phone, website, category, \
                  metadata, completeness_score, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (normalized_id) DO UPDATE SET \
                 external_id = EXCLUDED.external_id, \
                 name = EXCLUDED.name, \
                 address = EXCLUDED.address, \
                 phone = EXCLUDED.phone, \
                 website = EXCLUDED.website, \
                 category = EXCLUDED.category, \
                 metadata = EXCLUDED.metadata, \
                 completeness_score = EXCLUDED.completeness_score, \
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(record.normalized_id.as_str())
        .bind(&record.external_id)
        .bind(record.fields.name.as_deref())
        .bind(record.fields.address.as_deref())
        .bind(record.fields.phone.as_deref())
        .bind(record.fields.website.as_deref())
        .bind(record.fields.category.as_deref())
        .bind(metadata)
        .bind(score)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_locations(&self) -> Result<Vec<LocationRecord>, DbError> {
        let rows = sqlx::query_as::<_, LocationRow>(&format!(
            "SELECT {LOCATION_COLUMNS} FROM locations ORDER BY normalized_id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LocationRecord::try_from).collect()
    }

    async fn delete_location(&self, id: &NormalizedId) -> Result<u64, DbError> {
        let mut tx = self.pool.begin().await?;
        let reviews = sqlx::query("DELETE FROM reviews WHERE location_id = $1")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let locations = sqlx::query("DELETE FROM locations WHERE normalized_id = $1")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if locations == 0 {
            tx.rollback().await?;
            return Err(DbError::NotFound);
        }
        tx.commit().await?;
        tracing::debug!(location = %id, reviews, "location deleted with its reviews");
        Ok(reviews)
    }
}

#[async_trait]
impl ReviewStore for PgStore {
    async fn get_review(&self, id: ReviewId) -> Result<Option<ReviewRecord>, DbError> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ReviewRecord::try_from).transpose()
    }

    async fn find_review_by_external_id(
        &self,
        external_review_id: &str,
    ) -> Result<Option<ReviewRecord>, DbError> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE external_review_id = $1"
        ))
        .bind(external_review_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ReviewRecord::try_from).transpose()
    }

    async fn insert_review(&self, review: NewReview) -> Result<ReviewRecord, DbError> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "INSERT INTO reviews \
                 (external_review_id, location_id, reviewer_name, rating, text, sentiment, \
                  reply_state, reply_text, reply_timestamp, review_timestamp, updated_at) \
             SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11 \
             WHERE EXISTS (SELECT 1 FROM locations WHERE normalized_id = $2) \
             ON CONFLICT (external_review_id) DO NOTHING \
             RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(&review.external_review_id)
        .bind(review.location_id.as_str())
        .bind(&review.reviewer_name)
        .bind(i16::from(review.rating))
        .bind(review.text.as_deref())
        .bind(review.sentiment.as_str())
        .bind(review.reply_state.as_str())
        .bind(review.reply_text.as_deref())
        .bind(review.reply_timestamp)
        .bind(review.review_timestamp)
        .bind(review.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                        ReviewRecord::try_from(row)
            }
            None if self.location_exists(&review.location_id).await? => {
                Err(DbError::DuplicateReview(review.external_review_id))
            }
            None => Err(DbError::NotFound),
        }
    }

    async fn save_review(&self, record: &ReviewRecord) -> Result<(), DbError> {
        let labels: Vec<&str> = record.labels.iter().map(String::as_str).collect();
        let affected = sqlx::query(
            "UPDATE reviews SET \
                 reviewer_name = $2, rating = $3, text = $4, sentiment = $5, \
                 reply_state = $6, reply_text = $7, reply_timestamp = $8, \
                 is_read = $9, labels = $10, updated_at = $11 \
             WHERE id = $1",
        )
        .bind(record.id.0)
        .bind(&record.reviewer_name)
        .bind(i16::from(record.rating))
        .bind(record.text.as_deref())
        .bind(record.sentiment.as_str())
        .bind(record.reply_state.as_str())
        .bind(record.reply_text.as_deref())
        .bind(record.reply_timestamp)
        .bind(record.is_read)
        .bind(&labels)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn query_reviews(
        &self,
        query: &FilterQuery,
        limit: usize,
    ) -> Result<Vec<ReviewRecord>, DbError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE TRUE"
        ));
        push_predicate(&mut qb, &query.predicate());
        if let Some(cursor) = query.cursor() {
            qb.push(" AND (review_timestamp < ")
                .push_bind(cursor.review_timestamp)
                .push(" OR (review_timestamp = ")
                .push_bind(cursor.review_timestamp)
                .push(" AND id > ")
                .push_bind(cursor.id.0)
                .push("))");
        }
        qb.push(" ORDER BY review_timestamp DESC, id ASC LIMIT ")
            .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));

        let rows: Vec<ReviewRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        tracing::debug!(
            rows = rows.len(),
            limit,
            after_cursor = query.cursor().is_some(),
            "keyset review query"
        );
        rows.into_iter().map(ReviewRecord::try_from).collect()
    }

    async fn aggregate_reviews(
        &self,
        predicate: &ReviewPredicate,
    ) -> Result<ReviewAggregates, DbError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT \
                 COUNT(*)::BIGINT, \
                 COUNT(*) FILTER (WHERE reply_state IN ('new', 'pending_reply'))::BIGINT, \
                 COUNT(*) FILTER (WHERE reply_state = 'replied')::BIGINT, \
                 COALESCE(SUM(rating), 0)::BIGINT \
             FROM reviews WHERE TRUE",
        );
        push_predicate(&mut qb, predicate);
        let (total, pending, replied, rating_sum): (i64, i64, i64, i64) =
            qb.build_query_as().fetch_one(&self.pool).await?;
        let non_negative = |v: i64| u64::try_from(v).unwrap_or_default();
        Ok(ReviewAggregates::from_counts(
            non_negative(total),
            non_negative(pending),
            non_negative(replied),
            non_negative(rating_sum),
        ))
    }

    async fn revision(&self) -> Result<u64, DbError> {
        let revision =
            sqlx::query_scalar::<_, i64>("SELECT revision FROM store_revision WHERE id")
                .fetch_one(&self.pool)
                .await?;
        Ok(u64::try_from(revision).unwrap_or_default())
    }
}

/// Appends ` AND ...` clauses for every set field of `predicate`.
fn push_predicate(qb: &mut QueryBuilder<'_, Postgres>, predicate: &ReviewPredicate) {
    if let Some(location_id) = &predicate.location_id {
        qb.push(" AND location_id = ")
            .push_bind(location_id.as_str().to_owned());
    }
    if let Some(rating) = predicate.rating {
        qb.push(" AND rating = ").push_bind(i16::from(rating));
    }
    match predicate.status {
        Some(ReplyState::PendingReply) => {
            qb.push(" AND reply_state IN ('new', 'pending_reply')");
        }
        Some(state) => {
            qb.push(" AND reply_state = ").push_bind(state.as_str());
        }
        None => {}
    }
    if let Some(sentiment) = predicate.sentiment {
        qb.push(" AND sentiment = ").push_bind(sentiment.as_str());
    }
    if let Some(term) = &predicate.search_term {
        let pattern = format!("%{}%", escape_like(term));
        qb.push(" AND (LOWER(reviewer_name) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(COALESCE(text, '')) LIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("100%_done\\"), "100\\%\\_done\\\\");
        assert_eq!(escape_like("coffee"), "coffee");
    }

    #[test]
    fn pending_filter_includes_new_reviews() {
        let predicate = ReviewPredicate {
            status: Some(ReplyState::PendingReply),
            ..ReviewPredicate::default()
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM reviews WHERE TRUE");
        push_predicate(&mut qb, &predicate);
        assert!(qb
            .sql()
            .ends_with("AND reply_state IN ('new', 'pending_reply')"));
    }
}
