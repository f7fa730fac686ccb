use chrono::{DateTime, TimeZone, Utc};
use ldesk_core::{LocationFields, LocationMetadata};
use ldesk_db::{LocationStore, MemoryStore};

use super::*;

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_772_000_000 + secs, 0).unwrap()
}

fn record(external_id: &str, fields: LocationFields, description: bool, at: i64) -> LocationRecord {
    let metadata = LocationMetadata {
        description: description.then(|| "Neighbourhood bakery".to_owned()),
        ..LocationMetadata::default()
    };
    LocationRecord::from_fetch(
        external_id,
        fields,
        metadata,
        ts(at),
        &CompletenessWeights::default(),
    )
    .unwrap()
}

/// name + description + website = 30.
fn sparse(external_id: &str, at: i64) -> LocationRecord {
    record(
        external_id,
        LocationFields {
            name: Some("Crumb & Co".to_owned()),
            website: Some("https://crumb.example".to_owned()),
            ..LocationFields::default()
        },
        true,
        at,
    )
}

/// name + description + phone + address + category = 55.
fn rich(external_id: &str, at: i64) -> LocationRecord {
    record(
        external_id,
        LocationFields {
            name: Some("Crumb and Company".to_owned()),
            phone: Some("+1 555 0142".to_owned()),
            address: Some("42 Mill St".to_owned()),
            category: Some("bakery".to_owned()),
            ..LocationFields::default()
        },
        true,
        at,
    )
}

#[test]
fn fixtures_have_expected_scores() {
    assert_eq!(sparse("locations/42", 0).completeness_score, 30);
    assert_eq!(rich("accounts/7/locations/42", 0).completeness_score, 55);
}

#[tokio::test]
async fn compound_and_bare_forms_collapse_to_the_richer_record() {
    let store = Arc::new(MemoryStore::new());
    let dedup = Deduplicator::new(store.clone(), CompletenessWeights::default());

    let first = dedup.reconcile(sparse("locations/42", 0)).await.unwrap();
    let second = dedup
        .reconcile(rich("accounts/7/locations/42", 60))
        .await
        .unwrap();
    assert_eq!(first, MergeDecision::Inserted);
    assert_eq!(second, MergeDecision::Replaced);

    let all = store.list_locations().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].normalized_id.as_str(), "42");
    assert_eq!(all[0].completeness_score, 55);
    assert_eq!(all[0].fields, rich("accounts/7/locations/42", 60).fields);
}

#[tokio::test]
async fn lower_score_never_replaces_even_when_newer() {
    let store = Arc::new(MemoryStore::new());
    let dedup = Deduplicator::new(store.clone(), CompletenessWeights::default());

    dedup.reconcile(rich("locations/42", 0)).await.unwrap();
    let decision = dedup
        .reconcile(sparse("accounts/1/locations/42", 3_600))
        .await
        .unwrap();
    assert_eq!(decision, MergeDecision::Kept);

    let stored = store
        .get_location(&ldesk_core::normalize_location_id("42").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.completeness_score, 55);
    assert_eq!(stored.external_id, "locations/42");
}

#[test]
fn equal_scores_prefer_the_newer_record() {
    let older = rich("locations/42", 0);
    let newer = rich("accounts/7/locations/42", 10);
    assert!(prefers_incoming(&older, &newer));
    assert!(!prefers_incoming(&newer, &older));
    assert_eq!(decide(Some(&newer), &older), MergeDecision::Kept);
}

#[test]
fn full_tie_keeps_the_existing_record() {
    let existing = rich("locations/42", 0);
    let incoming = rich("accounts/7/locations/42", 0);
    assert_eq!(decide(Some(&existing), &incoming), MergeDecision::Kept);
}

#[test]
fn merge_is_idempotent_and_monotonic() {
    let weights = CompletenessWeights::default();
    let batch = vec![
        sparse("locations/42", 0),
        rich("accounts/7/locations/42", 60),
        sparse("accounts/9/locations/42", 120),
        rich("locations/8", 0),
        sparse("8", 5),
    ];

    let mut once = BTreeMap::new();
    let report = merge_into(&mut once, batch.clone(), &weights);
    assert_eq!(report.inserted, 2);
    assert_eq!(report.replaced, 1);
    assert_eq!(report.kept, 2);

    let mut twice = once.clone();
    merge_into(&mut twice, batch.clone(), &weights);
    assert_eq!(once, twice);

    let mut own_output = once.clone();
    let rerun = merge_into(&mut own_output, once.values().cloned(), &weights);
    assert_eq!(own_output, once);
    assert_eq!(rerun.kept, once.len());

    let best_for_42 = batch
        .iter()
        .filter(|r| r.normalized_id.as_str() == "42")
        .map(|r| r.completeness_score)
        .max()
        .unwrap();
    let key = ldesk_core::normalize_location_id("42").unwrap();
    assert!(once[&key].completeness_score >= best_for_42);
}

#[test]
fn stale_derived_fields_are_recomputed() {
    let mut tampered = sparse("accounts/7/locations/42", 0);
    tampered.completeness_score = 99;
    let mut current = BTreeMap::new();
    current.insert(tampered.normalized_id.clone(), rich("locations/42", 0));

    let report = merge_into(&mut current, [tampered], &CompletenessWeights::default());
    assert_eq!(report.kept, 1);
    assert_eq!(current.values().next().unwrap().completeness_score, 55);
}

#[tokio::test]
async fn malformed_ids_are_reported_not_fatal() {
    let store = Arc::new(MemoryStore::new());
    let dedup = Deduplicator::new(store.clone(), CompletenessWeights::default());

    let mut broken = sparse("locations/5", 0);
    broken.external_id = "accounts/7/locations/".to_owned();
    let report = dedup
        .reconcile_batch([broken, rich("locations/6", 0)])
        .await
        .unwrap();

    assert_eq!(report.inserted, 1);
    assert_eq!(report.rejected, vec!["accounts/7/locations/".to_owned()]);
    assert_eq!(store.list_locations().await.unwrap().len(), 1);
}
