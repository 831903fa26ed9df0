//! `PgRecordStore` against a real database.
//!
//! Run with `DATABASE_URL` pointing at a PostgreSQL server and
//! `cargo test -- --ignored`.

use std::collections::BTreeMap;

use assert_matches::assert_matches;
use sqlx::PgPool;

use recordport_core::duplicate_detection::{CommitPlan, RecordWrite};
use recordport_core::record::{RecordFields, RecordKind};
use recordport_core::store::{RecordStore, StoreError};
use recordport_core::tabular::{parse, ParseOptions};
use recordport_core::types::ActorContext;
use recordport_core::validation::{validate_rows, ImportKind};
use recordport_db::repositories::ImportedRecordRepo;
use recordport_db::PgRecordStore;

fn actor(organization_id: i64) -> ActorContext {
    ActorContext::new(organization_id, 9)
}

fn fields(pairs: &[(&str, &str)]) -> RecordFields {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<BTreeMap<_, _>>()
}

fn contact_plan(csv: &str) -> CommitPlan {
    let table = parse(csv.as_bytes(), &ParseOptions::default()).unwrap();
    let outcome = validate_rows(ImportKind::Contact.validator(), &table.rows);
    CommitPlan::insert_all(outcome.records)
}

// ---------------------------------------------------------------------------
// Test: migrations apply and the health check passes
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn health_check_passes(pool: PgPool) {
    recordport_db::health_check(&pool).await.unwrap();
}

// ---------------------------------------------------------------------------
// Test: embedded migrations create the schema and can be re-run
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = false)]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn embedded_migrations_create_schema(pool: PgPool) {
    recordport_db::run_migrations(&pool).await.unwrap();
    recordport_db::run_migrations(&pool).await.unwrap();

    let rows = ImportedRecordRepo::list_by_kind(&pool, 1, RecordKind::Contact)
        .await
        .unwrap();
    assert!(rows.is_empty());
}

// ---------------------------------------------------------------------------
// Test: inserted records are found by normalized identity
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn insert_then_query_by_identity(pool: PgPool) {
    let store = PgRecordStore::new(pool);
    let ids = store
        .insert(
            RecordKind::Contact,
            &[fields(&[("name", "Ana"), ("email", "Ana@Example.com")])],
            &actor(1),
        )
        .await
        .unwrap();
    assert_eq!(ids.len(), 1);

    let found = store
        .query_by_identity(RecordKind::Contact, &[" ANA@example.com".into()], &actor(1))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, ids[0]);
    assert_eq!(found[0].fields.get("name").map(String::as_str), Some("Ana"));

    let other_org = store
        .query_by_identity(RecordKind::Contact, &["ana@example.com".into()], &actor(2))
        .await
        .unwrap();
    assert!(other_org.is_empty());
}

// ---------------------------------------------------------------------------
// Test: update merges fields into the stored JSON
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn update_merges_fields(pool: PgPool) {
    let store = PgRecordStore::new(pool.clone());
    let ids = store
        .insert(
            RecordKind::Contact,
            &[fields(&[("name", "Ana"), ("phone", "600")])],
            &actor(1),
        )
        .await
        .unwrap();

    store
        .update(RecordKind::Contact, ids[0], &fields(&[("name", "Ana Ruiz")]), &actor(1))
        .await
        .unwrap();

    let rows = ImportedRecordRepo::list_by_kind(&pool, 1, RecordKind::Contact)
        .await
        .unwrap();
    let stored = rows[0].fields();
    assert_eq!(stored.get("name").map(String::as_str), Some("Ana Ruiz"));
    assert_eq!(stored.get("phone").map(String::as_str), Some("600"));
    assert_eq!(rows[0].updated_by, Some(9));
}

// ---------------------------------------------------------------------------
// Test: a failing write rolls back the whole batch
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn batch_with_missing_update_target_rolls_back(pool: PgPool) {
    let store = PgRecordStore::new(pool.clone());
    let mut plan = contact_plan("name,email\nAna,ana@example.com\nLuis,luis@example.com\n");
    let second = plan.writes.pop().unwrap();
    plan.writes.push(RecordWrite::Update {
        existing_id: 999_999,
        record: second.record().clone(),
        fields: second.payload(),
    });

    let err = store
        .commit_batch(RecordKind::Contact, &plan.writes, &actor(1))
        .await
        .unwrap_err();
    assert_matches!(err, StoreError::NotFound { id: 999_999, .. });

    let rows = ImportedRecordRepo::list_by_kind(&pool, 1, RecordKind::Contact)
        .await
        .unwrap();
    assert!(rows.is_empty());
}

// ---------------------------------------------------------------------------
// Test: a clean batch commits every write
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn clean_batch_commits(pool: PgPool) {
    let store = PgRecordStore::new(pool.clone());
    let plan = contact_plan("name,email\nAna,ana@example.com\nLuis,luis@example.com\n");

    store
        .commit_batch(RecordKind::Contact, &plan.writes, &actor(1))
        .await
        .unwrap();

    let rows = ImportedRecordRepo::list_by_kind(&pool, 1, RecordKind::Contact)
        .await
        .unwrap();
    let identities: Vec<&str> = rows.iter().map(|r| r.identity.as_str()).collect();
    assert_eq!(identities, vec!["ana@example.com", "luis@example.com"]);
}
