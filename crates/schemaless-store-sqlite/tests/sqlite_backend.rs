// crates/schemaless-store-sqlite/tests/sqlite_backend.rs
// ============================================================================
// Module: SQLite Backend Tests
// Description: Durable backend behavior for cells, indexes, and lifecycle.
// Purpose: Validate versioning, index currency, uniqueness, paging, and
//          connection lifecycle against real SQLite files.
// ============================================================================

//! ## Overview
//! Integration tests for [`SqliteBackend`]:
//! - Versioned writes and duplicate rejection
//! - Index currency, uniqueness, and both hit resolution strategies
//! - Identifier safety and index table name collisions
//! - Partition paging, reset, reopen, destroy, and cancellation

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use proptest::prelude::*;
use schemaless_core::Cell;
use schemaless_core::CellWrite;
use schemaless_core::Comparison;
use schemaless_core::FieldQuery;
use schemaless_core::IndexValue;
use schemaless_core::OpContext;
use schemaless_core::PartitionLocation;
use schemaless_core::PartitionRead;
use schemaless_core::RowKey;
use schemaless_core::StorageBackend;
use schemaless_core::StoreError;
use schemaless_store_sqlite::IndexResolution;
use schemaless_store_sqlite::SqliteBackend;
use schemaless_store_sqlite::SqliteBackendConfig;
use schemaless_store_sqlite::SqliteBackendError;
use schemaless_store_sqlite::SqliteSyncMode;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn open(dir: &TempDir) -> SqliteBackend {
    open_at(&dir.path().join("shard.db"), IndexResolution::Join)
}

fn open_at(path: &Path, resolution: IndexResolution) -> SqliteBackend {
    SqliteBackend::open(SqliteBackendConfig::new(path).with_index_resolution(resolution)).unwrap()
}

fn put(backend: &SqliteBackend, row: &RowKey, ref_key: i64, body: &Value) {
    let write = CellWrite::json(row.clone(), "users", ref_key, body).unwrap();
    backend.put_cell(&OpContext::background(), &write).unwrap();
}

fn row(byte: u8) -> RowKey {
    RowKey::new(vec![byte; 16])
}

// ============================================================================
// SECTION: Cells
// ============================================================================

#[test]
fn versions_are_stored_and_latest_wins() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    let ctx = OpContext::background();
    let key = row(1);
    put(&backend, &key, 1, &json!({"name": "ada"}));
    put(&backend, &key, 3, &json!({"name": "grace"}));
    put(&backend, &key, 2, &json!({"name": "linus"}));

    let first = backend.get_cell(&ctx, &key, "users", 1).unwrap().unwrap();
    assert_eq!(first.document().unwrap()["name"], "ada");
    let latest = backend.get_cell_latest(&ctx, &key, "users").unwrap().unwrap();
    assert_eq!(latest.ref_key, 3);
    assert!(latest.created_at.is_some());
    assert!(backend.get_cell(&ctx, &key, "users", 9).unwrap().is_none());
    assert!(backend.get_cell_latest(&ctx, &row(2), "users").unwrap().is_none());
}

#[test]
fn duplicate_version_is_rejected_without_side_effects() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    let ctx = OpContext::background();
    let key = row(1);
    put(&backend, &key, 1, &json!({"email": "a@example.com"}));

    let write = CellWrite::json(key.clone(), "users", 1, &json!({"email": "b@example.com"})).unwrap();
    let err = backend.put_cell(&ctx, &write).unwrap_err();
    assert!(matches!(err, StoreError::IntegrityViolation(_)));
    assert!(
        !backend.check_value_exist(&ctx, "users", "email", &IndexValue::from("b@example.com")).unwrap()
    );
}

#[test]
fn non_object_body_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    let ctx = OpContext::background();
    let write = CellWrite::new(row(1), "users", 1, b"\"just a string\"".to_vec());
    assert!(matches!(backend.put_cell(&ctx, &write), Err(StoreError::Serialization(_))));
    assert!(backend.get_cell_latest(&ctx, &row(1), "users").unwrap().is_none());
    assert!(backend.index_tables().unwrap().is_empty());
}

#[test]
fn oversized_body_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut config = SqliteBackendConfig::new(dir.path().join("shard.db"));
    config.max_body_bytes = 32;
    let backend = SqliteBackend::open(config).unwrap();
    let write =
        CellWrite::json(row(1), "users", 1, &json!({"bio": "x".repeat(64)})).unwrap();
    let err = backend.put_cell(&OpContext::background(), &write).unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput(_)));
}

#[test]
fn invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut config = SqliteBackendConfig::new(dir.path().join("shard.db"));
    config.busy_timeout_ms = 0;
    assert!(matches!(SqliteBackend::open(config), Err(SqliteBackendError::Invalid(_))));
    let directory = SqliteBackendConfig::new(dir.path());
    assert!(matches!(SqliteBackend::open(directory), Err(SqliteBackendError::Invalid(_))));
}

// ============================================================================
// SECTION: Indexes
// ============================================================================

#[test]
fn index_tracks_the_newest_version_only() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    let ctx = OpContext::background();
    let key = row(1);
    put(&backend, &key, 1, &json!({"status": "pending"}));
    put(&backend, &key, 2, &json!({"status": "active"}));
    put(&backend, &key, 0, &json!({"status": "archived"}));

    let active = FieldQuery::equal("users", "status", "active").unwrap();
    let hits = backend.get_cells_by_field_latest(&ctx, &active).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].ref_key, 2);
    for stale in ["pending", "archived"] {
        let query = FieldQuery::equal("users", "status", stale).unwrap();
        assert!(backend.get_cells_by_field_latest(&ctx, &query).unwrap().is_empty());
    }
}

#[test]
fn field_absent_from_newest_write_keeps_its_entry() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    let ctx = OpContext::background();
    let key = row(1);
    put(&backend, &key, 1, &json!({"status": "active", "plan": "pro"}));
    let write = CellWrite::json(key.clone(), "users", 2, &json!({"plan": "free"}))
        .unwrap()
        .excluding(["plan"]);
    backend.put_cell(&ctx, &write).unwrap();

    for (field, value) in [("status", "active"), ("plan", "pro")] {
        let query = FieldQuery::equal("users", field, value).unwrap();
        let hits = backend.get_cells_by_field_latest(&ctx, &query).unwrap();
        assert_eq!(hits.len(), 1, "{field}");
        assert_eq!(hits[0].ref_key, 2);
        assert!(hits[0].document().unwrap().get("status").is_none());
    }
    assert!(backend.check_value_exist(&ctx, "users", "status", &IndexValue::from("active")).unwrap());
}

#[test]
fn column_scan_returns_latest_cells_in_row_key_order() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    let ctx = OpContext::background();
    put(&backend, &row(3), 1, &json!({"n": 3}));
    put(&backend, &row(1), 1, &json!({"n": 1}));
    put(&backend, &row(1), 2, &json!({"n": 10}));
    put(&backend, &row(2), 1, &json!({}));

    let cells = backend.get_cells_by_column_latest(&ctx, "users").unwrap();
    let keys: Vec<RowKey> = cells.iter().map(|cell| cell.row_key.clone()).collect();
    assert_eq!(keys, vec![row(1), row(2), row(3)]);
    assert_eq!(cells[0].ref_key, 2);
    assert!(backend.get_cells_by_column_latest(&ctx, "orders").unwrap().is_empty());
}

#[test]
fn range_operators_match_sqlite_ordering() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    let ctx = OpContext::background();
    for (byte, age) in [(1_u8, 18_i64), (2, 25), (3, 40)] {
        put(&backend, &row(byte), 1, &json!({"age": age}));
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
}

#[test]
fn unique_lookup_detects_duplicates() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    let ctx = OpContext::background();
    put(&backend, &row(1), 1, &json!({"email": "a@example.com"}));
    put(&backend, &row(2), 1, &json!({"email": "b@example.com"}));

    let found = backend
        .get_cell_by_unique_field_latest(&ctx, "users", "email", &IndexValue::from("a@example.com"))
        .unwrap()
        .unwrap();
    assert_eq!(found.row_key, row(1));
    assert!(
        backend
            .get_cell_by_unique_field_latest(&ctx, "users", "email", &IndexValue::from("c@x.io"))
            .unwrap()
            .is_none()
    );

    put(&backend, &row(3), 1, &json!({"email": "a@example.com"}));
    let err = backend
        .get_cell_by_unique_field_latest(&ctx, "users", "email", &IndexValue::from("a@example.com"))
        .unwrap_err();
    assert!(matches!(err, StoreError::IntegrityViolation(_)));
}

#[test]
fn missing_index_reads_as_empty() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    let ctx = OpContext::background();
    put(&backend, &row(1), 1, &json!({"age": 30}));
    let value = IndexValue::from("x");
    assert!(!backend.check_value_exist(&ctx, "users", "nickname", &value).unwrap());
    assert!(
        backend.get_cell_by_unique_field_latest(&ctx, "users", "nickname", &value).unwrap().is_none()
    );
    let query = FieldQuery::equal("users", "nickname", "x").unwrap();
    assert!(backend.get_cells_by_field_latest(&ctx, &query).unwrap().is_empty());
}

#[test]
fn excluded_fields_get_no_index() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    let ctx = OpContext::background();
    let write = CellWrite::json(row(1), "users", 1, &json!({"email": "a@b.c", "token": "t"}))
        .unwrap()
        .excluding(["token"]);
    backend.put_cell(&ctx, &write).unwrap();
    let tables = backend.index_tables().unwrap();
    assert!(tables.contains(&"index_users_email".to_string()));
    assert!(tables.contains(&"index_users__identity".to_string()));
    assert!(!tables.contains(&"index_users_token".to_string()));
}

#[test]
fn hostile_identifiers_are_rejected() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    let ctx = OpContext::background();
    let value = IndexValue::Integer(1);
    for field in ["age; DROP TABLE cell", "a\"b", "row_key", ""] {
        let err = backend.check_value_exist(&ctx, "users", field, &value).unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)), "field {field}");
    }
    let write = CellWrite::json(row(1), "users x", 1, &json!({})).unwrap();
    assert!(matches!(backend.put_cell(&ctx, &write), Err(StoreError::InvalidInput(_))));
    assert!(FieldQuery::with_operator("users", "age", 1_i64, "LIKE").is_err());
}

#[test]
fn colliding_index_table_names_are_rejected() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    let ctx = OpContext::background();
    let first = CellWrite::json(row(1), "a_b", 1, &json!({"c": 1})).unwrap();
    backend.put_cell(&ctx, &first).unwrap();

    let second = CellWrite::json(row(2), "a", 1, &json!({"b_c": 2})).unwrap();
    let err = backend.put_cell(&ctx, &second).unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput(_)));
    assert!(backend.get_cell_latest(&ctx, &row(2), "a").unwrap().is_none());
    assert!(backend.check_value_exist(&ctx, "a_b", "c", &IndexValue::Integer(1)).unwrap());
}

#[test]
fn index_names_differing_only_in_case_are_rejected() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    let ctx = OpContext::background();
    let first = CellWrite::json(row(1), "schools", 1, &json!({"domain": "illinois.edu"})).unwrap();
    backend.put_cell(&ctx, &first).unwrap();

    let field_case = CellWrite::json(row(2), "schools", 1, &json!({"Domain": "y.edu"})).unwrap();
    assert!(matches!(backend.put_cell(&ctx, &field_case), Err(StoreError::InvalidInput(_))));
    let column_case = CellWrite::json(row(3), "Schools", 1, &json!({"domain": "z.edu"})).unwrap();
    assert!(matches!(backend.put_cell(&ctx, &column_case), Err(StoreError::InvalidInput(_))));

    assert!(backend.get_cell_latest(&ctx, &row(2), "schools").unwrap().is_none());
    assert!(backend.get_cell_latest(&ctx, &row(3), "Schools").unwrap().is_none());
    let query = FieldQuery::equal("schools", "domain", "y.edu").unwrap();
    assert!(backend.get_cells_by_field_latest(&ctx, &query).unwrap().is_empty());
    let kept = FieldQuery::equal("schools", "domain", "illinois.edu").unwrap();
    assert_eq!(backend.get_cells_by_field_latest(&ctx, &kept).unwrap().len(), 1);
    assert_eq!(backend.index_tables().unwrap(), vec![
        "index_schools__identity".to_string(),
        "index_schools_domain".to_string(),
    ]);
}

#[test]
fn indexes_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shard.db");
    {
        let backend = open_at(&path, IndexResolution::Join);
        put(&backend, &row(1), 1, &json!({"email": "a@example.com"}));
        backend.destroy(&OpContext::background()).unwrap();
    }
    let backend = open_at(&path, IndexResolution::PerRow);
    let ctx = OpContext::background();
    assert!(
        backend.check_value_exist(&ctx, "users", "email", &IndexValue::from("a@example.com")).unwrap()
    );
    assert_eq!(backend.get_cells_by_column_latest(&ctx, "users").unwrap().len(), 1);
}

// ============================================================================
// SECTION: Partition Reads
// ============================================================================

#[test]
fn partition_read_pages_in_insertion_order() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    let ctx = OpContext::background();
    for byte in 1 ..= 5 {
        put(&backend, &row(byte), 1, &json!({"n": byte}));
    }
    let page = backend
        .partition_read(&ctx, &PartitionRead::new(PartitionLocation::AddedAt, 0, 2).unwrap())
        .unwrap();
    assert_eq!(page.iter().map(|cell| cell.row_key.clone()).collect::<Vec<_>>(), vec![row(1), row(2)]);
    let rest = backend
        .partition_read(
            &ctx,
            &PartitionRead::new(PartitionLocation::AddedAt, page[1].added_at, 100).unwrap(),
        )
        .unwrap();
    assert_eq!(rest.len(), 3);
    assert!(rest.windows(2).all(|pair| pair[0].added_at < pair[1].added_at));

    let by_time = backend
        .partition_read(&ctx, &PartitionRead::new(PartitionLocation::CreatedAt, 0, 100).unwrap())
        .unwrap();
    assert_eq!(by_time.len(), 5);
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

#[test]
fn reset_connection_keeps_data() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    let ctx = OpContext::background();
    put(&backend, &row(1), 1, &json!({"a": 1}));
    backend.reset_connection(&ctx).unwrap();
    assert!(backend.get_cell_latest(&ctx, &row(1), "users").unwrap().is_some());
}

#[test]
fn destroy_is_idempotent_and_terminal() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    let ctx = OpContext::background();
    put(&backend, &row(1), 1, &json!({"a": 1}));
    backend.destroy(&ctx).unwrap();
    backend.destroy(&ctx).unwrap();
    assert_eq!(backend.get_cell_latest(&ctx, &row(1), "users").unwrap_err(), StoreError::Destroyed);
    assert_eq!(backend.reset_connection(&ctx).unwrap_err(), StoreError::Destroyed);
    assert!(dir.path().join("shard.db").exists());
}

#[test]
fn cancelled_context_is_rejected_before_work() {
    let dir = TempDir::new().unwrap();
    let backend = open(&dir);
    let ctx = OpContext::background();
    ctx.cancel();
    let write = CellWrite::json(row(1), "users", 1, &json!({"a": 1})).unwrap();
    assert_eq!(backend.put_cell(&ctx, &write).unwrap_err(), StoreError::Cancelled);
    let live = OpContext::background();
    assert!(backend.get_cell_latest(&live, &row(1), "users").unwrap().is_none());
}

#[test]
fn deadline_interrupts_a_running_scan() {
    let dir = TempDir::new().unwrap();
    let mut config = SqliteBackendConfig::new(dir.path().join("shard.db"));
    config.sync_mode = SqliteSyncMode::Normal;
    let backend = SqliteBackend::open(config).unwrap();
    let background = OpContext::background();
    for index in 0_u32 .. 4_000 {
        let key = RowKey::new(index.to_be_bytes().to_vec());
        let write = CellWrite::json(key, "users", 1, &json!({"n": index})).unwrap();
        backend.put_cell(&background, &write).unwrap();
    }

    let ctx = OpContext::with_timeout(Duration::from_millis(2));
    assert_eq!(
        backend.get_cells_by_column_latest(&ctx, "users").unwrap_err(),
        StoreError::DeadlineExceeded
    );
    assert_eq!(backend.get_cells_by_column_latest(&background, "users").unwrap().len(), 4_000);
}

#[test]
fn concurrent_writers_share_one_shard() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(open(&dir));
    let handles: Vec<_> = (0_u8 .. 4)
        .map(|worker| {
            let backend = Arc::clone(&backend);
            thread::spawn(move || {
                for version in 1 ..= 5 {
                    put(&backend, &row(worker), version, &json!({"worker": worker, "v": version}));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let cells = backend.get_cells_by_column_latest(&OpContext::background(), "users").unwrap();
    assert_eq!(cells.len(), 4);
    assert!(cells.iter().all(|cell| cell.ref_key == 5));
}

// ============================================================================
// SECTION: Resolution Strategies
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn join_and_per_row_resolution_agree(
        writes in prop::collection::vec((0_u8 .. 6, 0_i64 .. 4, 0_i64 .. 5), 1 .. 24),
        threshold in 0_i64 .. 5,
    ) {
        let dir = TempDir::new().unwrap();
        let joined = open_at(&dir.path().join("join.db"), IndexResolution::Join);
        let per_row = open_at(&dir.path().join("per_row.db"), IndexResolution::PerRow);
        let ctx = OpContext::background();
        for (byte, ref_key, score) in writes {
            let write = CellWrite::json(row(byte), "users", ref_key, &json!({"score": score})).unwrap();
            let left = joined.put_cell(&ctx, &write).is_ok();
            let right = per_row.put_cell(&ctx, &write).is_ok();
            prop_assert_eq!(left, right);
        }
        let project = |cells: Vec<Cell>| {
            cells.into_iter().map(|cell| (cell.row_key, cell.ref_key, cell.body)).collect::<Vec<_>>()
        };
        for comparison in [Comparison::Equal, Comparison::Greater, Comparison::LessOrEqual] {
            let query = FieldQuery::new("users", "score", threshold, comparison).unwrap();
            prop_assert_eq!(
                project(joined.get_cells_by_field_latest(&ctx, &query).unwrap()),
                project(per_row.get_cells_by_field_latest(&ctx, &query).unwrap())
            );
        }
    }
}
