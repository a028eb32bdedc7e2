// crates/schemaless-core/tests/memory_backend.rs
// ============================================================================
// Module: In-Memory Backend Tests
// Description: Backend contract behavior of the in-memory backend.
// Purpose: Pin index, ordering, and lifecycle rules shared by all backends.
// ============================================================================

//! Contract tests for the in-memory backend.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

use schemaless_core::CellWrite;
use schemaless_core::Comparison;
use schemaless_core::FieldQuery;
use schemaless_core::InMemoryBackend;
use schemaless_core::IndexValue;
use schemaless_core::OpContext;
use schemaless_core::PartitionLocation;
use schemaless_core::PartitionRead;
use schemaless_core::RowKey;
use schemaless_core::StorageBackend;
use schemaless_core::StoreError;
use serde_json::json;

fn put(backend: &InMemoryBackend, row: &RowKey, ref_key: i64, body: &serde_json::Value) {
    let write = CellWrite::json(row.clone(), "users", ref_key, body).unwrap();
    backend.put_cell(&OpContext::background(), &write).unwrap();
}

#[test]
fn duplicate_version_is_an_integrity_violation() {
    let backend = InMemoryBackend::new();
    let row = RowKey::random();
    put(&backend, &row, 1, &json!({"age": 30}));
    let write = CellWrite::json(row, "users", 1, &json!({"age": 31})).unwrap();
    let err = backend.put_cell(&OpContext::background(), &write).unwrap_err();
    assert!(matches!(err, StoreError::IntegrityViolation(_)));
    assert_eq!(backend.cell_count().unwrap(), 1);
}

#[test]
fn non_object_body_writes_nothing() {
    let backend = InMemoryBackend::new();
    let write = CellWrite::new(RowKey::random(), "users", 1, b"[1, 2, 3]".to_vec());
    let err = backend.put_cell(&OpContext::background(), &write).unwrap_err();
    assert!(matches!(err, StoreError::Serialization(_)));
    assert_eq!(backend.cell_count().unwrap(), 0);
}

#[test]
fn range_queries_follow_allow_listed_operators() {
    let ctx = OpContext::background();
    let backend = InMemoryBackend::new();
    for age in [18_i64, 25, 40] {
        put(&backend, &RowKey::random(), 1, &json!({"age": age}));
    }
    let count = |comparison: Comparison| {
        let query = FieldQuery::new("users", "age", 25_i64, comparison).unwrap();
        backend.get_cells_by_field_latest(&ctx, &query).unwrap().len()
    };
    assert_eq!(count(Comparison::Equal), 1);
    assert_eq!(count(Comparison::NotEqual), 2);
    assert_eq!(count(Comparison::Greater), 1);
    assert_eq!(count(Comparison::GreaterOrEqual), 2);
    assert_eq!(count(Comparison::Less), 1);
    assert_eq!(count(Comparison::LessOrEqual), 2);
    assert!(FieldQuery::with_operator("users", "age", 25_i64, "; DELETE").is_err());
}

#[test]
fn excluded_and_unindexable_fields_are_skipped() {
    let ctx = OpContext::background();
    let backend = InMemoryBackend::new();
    let row = RowKey::random();
    let write = CellWrite::json(
        row.clone(),
        "users",
        1,
        &json!({"email": "a@b.c", "secret": "x", "bad-name": 1, "_identity": "spoof"}),
    )
    .unwrap()
    .excluding(["secret"]);
    backend.put_cell(&ctx, &write).unwrap();

    assert!(backend.check_value_exist(&ctx, "users", "email", &IndexValue::from("a@b.c")).unwrap());
    assert!(!backend.check_value_exist(&ctx, "users", "secret", &IndexValue::from("x")).unwrap());
    assert_eq!(backend.get_cells_by_column_latest(&ctx, "users").unwrap().len(), 1);
    assert!(backend.check_value_exist(&ctx, "users", "bad-name", &IndexValue::Integer(1)).is_err());
}

#[test]
fn older_versions_do_not_rewind_the_index() {
    let ctx = OpContext::background();
    let backend = InMemoryBackend::new();
    let row = RowKey::random();
    put(&backend, &row, 10, &json!({"status": "active"}));
    put(&backend, &row, 5, &json!({"status": "pending"}));

    let active = FieldQuery::equal("users", "status", "active").unwrap();
    let hits = backend.get_cells_by_field_latest(&ctx, &active).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].ref_key, 10);
    let pending = FieldQuery::equal("users", "status", "pending").unwrap();
    assert!(backend.get_cells_by_field_latest(&ctx, &pending).unwrap().is_empty());
}

#[test]
fn partition_read_pages_by_added_at() {
    let ctx = OpContext::background();
    let backend = InMemoryBackend::new();
    for index in 0 .. 5 {
        put(&backend, &RowKey::random(), 1, &json!({"n": index}));
    }
    let page = backend
        .partition_read(&ctx, &PartitionRead::new(PartitionLocation::AddedAt, 0, 2).unwrap())
        .unwrap();
    assert_eq!(page.iter().map(|cell| cell.added_at).collect::<Vec<_>>(), vec![1, 2]);
    let next = backend
        .partition_read(&ctx, &PartitionRead::new(PartitionLocation::AddedAt, 2, 10).unwrap())
        .unwrap();
    assert_eq!(next.iter().map(|cell| cell.added_at).collect::<Vec<_>>(), vec![3, 4, 5]);

    let unbounded = PartitionRead { location: PartitionLocation::CreatedAt, after: 0, limit: 0 };
    assert!(matches!(backend.partition_read(&ctx, &unbounded), Err(StoreError::InvalidInput(_))));
}

#[test]
fn destroy_is_idempotent_and_terminal() {
    let ctx = OpContext::background();
    let backend = InMemoryBackend::new();
    put(&backend, &RowKey::random(), 1, &json!({"a": 1}));
    backend.destroy(&ctx).unwrap();
    backend.destroy(&ctx).unwrap();
    assert_eq!(backend.get_cells_by_column_latest(&ctx, "users").unwrap_err(), StoreError::Destroyed);
    assert_eq!(backend.reset_connection(&ctx).unwrap_err(), StoreError::Destroyed);
}

#[test]
fn field_absent_from_newest_write_keeps_its_entry() {
    let ctx = OpContext::background();
    let backend = InMemoryBackend::new();
    let row = RowKey::random();
    put(&backend, &row, 1, &json!({"status": "active"}));
    put(&backend, &row, 2, &json!({"plan": "free"}));

    let query = FieldQuery::equal("users", "status", "active").unwrap();
    let hits = backend.get_cells_by_field_latest(&ctx, &query).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].ref_key, 2);
    assert!(hits[0].document().unwrap().get("status").is_none());
}
