//! Store contract against Postgres using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated database spun up by the sqlx test
//! harness. The `migrations` path is relative to the crate root
//! (`crates/ldesk-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

mod common;

use ldesk_db::PgStore;

#[sqlx::test(migrations = "../../migrations")]
async fn upsert_keeps_one_record_per_normalized_id(pool: sqlx::PgPool) {
    common::check_location_upsert_replaces(&PgStore::new(pool)).await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn following_cursors_visits_every_review_once(pool: sqlx::PgPool) {
    common::check_paging_is_exhaustive(&PgStore::new(pool)).await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn filters_and_aggregates_agree(pool: sqlx::PgPool) {
    common::check_filters_and_aggregates(&PgStore::new(pool)).await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn save_review_updates_state_and_revision(pool: sqlx::PgPool) {
    common::check_save_changes_state(&PgStore::new(pool)).await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn insert_requires_location_and_unique_external_id(pool: sqlx::PgPool) {
    common::check_insert_rules(&PgStore::new(pool)).await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn deleting_a_location_removes_its_reviews(pool: sqlx::PgPool) {
    common::check_delete_cascades(&PgStore::new(pool)).await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn revision_is_shared_across_handles(pool: sqlx::PgPool) {
    let writer = PgStore::new(pool.clone());
    let reader = PgStore::new(pool);
    common::check_revision_is_shared_across_handles(&writer, &reader).await;
}
