//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::NaiveDate;
use dimvault_core::{
  attr::AttributeSet,
  chain,
  store::{DimensionStore, VersionCursor, WriteOutcome},
  version::{DimensionId, DimensionVersion, NaturalKey, SurrogateKey},
};
use serde_json::json;

use crate::SqliteStore;

fn customer() -> DimensionId { DimensionId::new("customer").unwrap() }

fn nk(s: &str) -> NaturalKey { NaturalKey::new(s).unwrap() }

fn date(s: &str) -> NaiveDate { s.parse().unwrap() }

fn attrs(value: serde_json::Value) -> AttributeSet {
  serde_json::from_value(value).unwrap()
}

fn open_version(
  sk: u64,
  key: &str,
  from: &str,
  attributes: serde_json::Value,
) -> DimensionVersion {
  DimensionVersion::open(SurrogateKey(sk), nk(key), attrs(attributes), date(from))
}

async fn store() -> SqliteStore {
  let s = SqliteStore::open_in_memory().await.expect("in-memory store");
  s.ensure_dimension(&customer()).await.unwrap();
  s
}

/// Seed a two-version chain for C001: v1 closed at 2024-06-01, v2 current.
async fn seed_chain(s: &SqliteStore) -> (SurrogateKey, SurrogateKey) {
  let d = customer();
  let k1 = s.next_key(&d).await.unwrap();
  let v1 = open_version(k1.0, "C001", "2024-01-01", json!({"risk_rating": "LOW"}));
  assert_eq!(
    s.insert_first(&d, v1).await.unwrap(),
    WriteOutcome::Applied
  );

  let k2 = s.next_key(&d).await.unwrap();
  let v2 =
    open_version(k2.0, "C001", "2024-06-01", json!({"risk_rating": "HIGH"}));
  assert_eq!(
    s.close_and_insert(&d, k1, v2).await.unwrap(),
    WriteOutcome::Applied
  );

  (k1, k2)
}

// ─── Provisioning ────────────────────────────────────────────────────────────

#[tokio::test]
async fn ensure_dimension_is_idempotent() {
  let s = store().await;
  s.ensure_dimension(&customer()).await.unwrap();
  s.ensure_dimension(&customer()).await.unwrap();
}

#[tokio::test]
async fn dimensions_are_isolated() {
  let s = store().await;
  let branch = DimensionId::new("branch").unwrap();
  s.ensure_dimension(&branch).await.unwrap();

  let k = s.next_key(&branch).await.unwrap();
  let v = open_version(k.0, "BR-7", "2024-01-01", json!({"city": "Zagreb"}));
  s.insert_first(&branch, v).await.unwrap();

  assert!(
    s.current_version(&customer(), &nk("BR-7"))
      .await
      .unwrap()
      .is_none()
  );
  assert!(
    s.current_version(&branch, &nk("BR-7"))
      .await
      .unwrap()
      .is_some()
  );
}

// ─── Inserts and reads ───────────────────────────────────────────────────────

#[tokio::test]
async fn insert_first_and_read_back() {
  let s = store().await;
  let d = customer();

  let k = s.next_key(&d).await.unwrap();
  let v = open_version(
    k.0,
    "C001",
    "2024-01-01",
    json!({"risk_rating": "LOW", "credit_limit": 5000}),
  );
  assert_eq!(s.insert_first(&d, v).await.unwrap(), WriteOutcome::Applied);

  let cur = s.current_version(&d, &nk("C001")).await.unwrap().unwrap();
  assert_eq!(cur.surrogate_key, k);
  assert_eq!(cur.natural_key, nk("C001"));
  assert_eq!(cur.effective_from, date("2024-01-01"));
  assert_eq!(cur.effective_to, None);
  assert!(cur.is_current);
  assert_eq!(cur.attributes.get("credit_limit"), Some(&json!(5000)));
}

#[tokio::test]
async fn current_version_missing_returns_none() {
  let s = store().await;
  let found = s.current_version(&customer(), &nk("NOPE")).await.unwrap();
  assert!(found.is_none());
}

#[tokio::test]
async fn insert_first_conflicts_when_current_exists() {
  let s = store().await;
  let d = customer();
  seed_chain(&s).await;

  let k = s.next_key(&d).await.unwrap();
  let v = open_version(k.0, "C001", "2024-07-01", json!({"risk_rating": "MED"}));
  assert_eq!(s.insert_first(&d, v).await.unwrap(), WriteOutcome::Conflict);

  // Store unchanged: still two versions, HIGH still current.
  let all = s.all_versions(&d, &nk("C001")).await.unwrap();
  assert_eq!(all.len(), 2);
}

// ─── Close-and-insert ────────────────────────────────────────────────────────

#[tokio::test]
async fn close_and_insert_keeps_chain_contiguous() {
  let s = store().await;
  let d = customer();
  let (k1, k2) = seed_chain(&s).await;

  let all = s.all_versions(&d, &nk("C001")).await.unwrap();
  assert_eq!(all.len(), 2);
  chain::validate(&all).unwrap();

  assert_eq!(all[0].surrogate_key, k1);
  assert_eq!(all[0].effective_to, Some(date("2024-06-01")));
  assert!(!all[0].is_current);

  assert_eq!(all[1].surrogate_key, k2);
  assert_eq!(all[1].effective_from, date("2024-06-01"));
  assert!(all[1].is_current);
}

#[tokio::test]
async fn close_and_insert_conflicts_on_stale_expectation() {
  let s = store().await;
  let d = customer();
  let (k1, _k2) = seed_chain(&s).await;

  // k1 was already superseded; conditioning on it must fail and leave the
  // store untouched.
  let k3 = s.next_key(&d).await.unwrap();
  let v = open_version(k3.0, "C001", "2024-09-01", json!({"risk_rating": "MED"}));
  assert_eq!(
    s.close_and_insert(&d, k1, v).await.unwrap(),
    WriteOutcome::Conflict
  );

  let all = s.all_versions(&d, &nk("C001")).await.unwrap();
  assert_eq!(all.len(), 2);
  let cur = s.current_version(&d, &nk("C001")).await.unwrap().unwrap();
  assert_eq!(cur.attributes.get("risk_rating"), Some(&json!("HIGH")));
}

// ─── Type-1 overwrite ────────────────────────────────────────────────────────

#[tokio::test]
async fn overwrite_attributes_in_place() {
  let s = store().await;
  let d = customer();
  let (_k1, k2) = seed_chain(&s).await;

  let outcome = s
    .overwrite_attributes(
      &d,
      k2,
      attrs(json!({"risk_rating": "HIGH", "email": "c1@bank.example"})),
    )
    .await
    .unwrap();
  assert_eq!(outcome, WriteOutcome::Applied);

  let cur = s.current_version(&d, &nk("C001")).await.unwrap().unwrap();
  assert_eq!(cur.surrogate_key, k2);
  assert_eq!(cur.effective_from, date("2024-06-01"));
  assert_eq!(cur.attributes.get("email"), Some(&json!("c1@bank.example")));
}

#[tokio::test]
async fn overwrite_conflicts_on_closed_version() {
  let s = store().await;
  let d = customer();
  let (k1, _k2) = seed_chain(&s).await;

  let outcome = s
    .overwrite_attributes(&d, k1, attrs(json!({"risk_rating": "LOW"})))
    .await
    .unwrap();
  assert_eq!(outcome, WriteOutcome::Conflict);
}

// ─── As-of queries ───────────────────────────────────────────────────────────

#[tokio::test]
async fn version_as_of_boundaries_are_half_open() {
  let s = store().await;
  let d = customer();
  let (k1, k2) = seed_chain(&s).await;
  let key = nk("C001");

  // Before the first version.
  assert!(s.version_as_of(&d, &key, date("2023-12-31")).await.unwrap().is_none());

  // First day of v1, mid-range, and the supersession boundary.
  let v = s.version_as_of(&d, &key, date("2024-01-01")).await.unwrap().unwrap();
  assert_eq!(v.surrogate_key, k1);
  let v = s.version_as_of(&d, &key, date("2024-03-01")).await.unwrap().unwrap();
  assert_eq!(v.surrogate_key, k1);
  let v = s.version_as_of(&d, &key, date("2024-06-01")).await.unwrap().unwrap();
  assert_eq!(v.surrogate_key, k2);

  // Far future still hits the open version.
  let v = s.version_as_of(&d, &key, date("2030-01-01")).await.unwrap().unwrap();
  assert_eq!(v.surrogate_key, k2);
}

// ─── History and paging ──────────────────────────────────────────────────────

#[tokio::test]
async fn versions_after_pages_in_chain_order() {
  let s = store().await;
  let d = customer();
  let (k1, k2) = seed_chain(&s).await;

  let page = s.versions_after(&d, &nk("C001"), None, 1).await.unwrap();
  assert_eq!(page.len(), 1);
  assert_eq!(page[0].surrogate_key, k1);

  let page = s.versions_after(&d, &nk("C001"), Some(k1), 10).await.unwrap();
  assert_eq!(page.len(), 1);
  assert_eq!(page[0].surrogate_key, k2);

  let page = s.versions_after(&d, &nk("C001"), Some(k2), 10).await.unwrap();
  assert!(page.is_empty());
}

#[tokio::test]
async fn cursor_traverses_and_rewinds() {
  let s = store().await;
  let (k1, k2) = seed_chain(&s).await;

  let mut cursor =
    VersionCursor::with_page_size(&s, customer(), nk("C001"), 1);

  let mut seen = Vec::new();
  while let Some(v) = cursor.next().await.unwrap() {
    seen.push(v.surrogate_key);
  }
  assert_eq!(seen, vec![k1, k2]);

  cursor.rewind();
  let first = cursor.next().await.unwrap().unwrap();
  assert_eq!(first.surrogate_key, k1);
}

// ─── Surrogate keys ──────────────────────────────────────────────────────────

#[tokio::test]
async fn next_key_is_monotonic_per_dimension() {
  let s = store().await;
  let d = customer();
  let branch = DimensionId::new("branch").unwrap();
  s.ensure_dimension(&branch).await.unwrap();

  assert_eq!(s.next_key(&d).await.unwrap(), SurrogateKey(1));
  assert_eq!(s.next_key(&d).await.unwrap(), SurrogateKey(2));
  // Independent counter per dimension.
  assert_eq!(s.next_key(&branch).await.unwrap(), SurrogateKey(1));
  assert_eq!(s.next_key(&d).await.unwrap(), SurrogateKey(3));
}

#[tokio::test]
async fn advance_key_floor_skips_bulk_loaded_range() {
  let s = store().await;
  let d = customer();

  s.advance_key_floor(&d, SurrogateKey(500)).await.unwrap();
  assert_eq!(s.next_key(&d).await.unwrap(), SurrogateKey(501));

  // A lower floor never regresses the counter.
  s.advance_key_floor(&d, SurrogateKey(10)).await.unwrap();
  assert_eq!(s.next_key(&d).await.unwrap(), SurrogateKey(502));
}

// ─── Integrity ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn two_current_rows_are_reported_as_ambiguous() {
  let s = store().await;
  let d = customer();
  seed_chain(&s).await;

  // Corrupt the store the way a hand-edited bulk load could: drop the
  // guarding index and smuggle in a second current row.
  s.execute_raw("DROP INDEX dim_customer_current_idx;".into())
    .await
    .unwrap();
  s.execute_raw(
    "INSERT INTO dim_customer (
       customer_sk, customer_nk, attributes, effective_from_date,
       effective_to_date, is_current_record, loaded_at
     ) VALUES (99, 'C001', '{}', '2024-07-01', NULL, 1,
               '2024-07-01T00:00:00+00:00');"
      .into(),
  )
  .await
  .unwrap();

  let err = s.current_version(&d, &nk("C001")).await.unwrap_err();
  assert!(matches!(
    err,
    crate::Error::Core(dimvault_core::Error::AmbiguousCurrentVersion {
      count: 2,
      ..
    })
  ));
}
