// crates/schemaless-config/tests/load_validation.rs
// ============================================================================
// Module: Config Load Validation Tests
// Description: Loading, validation, and store assembly from TOML.
// Purpose: Ensure configuration fails closed and builds a working router.
// ============================================================================

//! Config loading and validation tests.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::fs;
use std::path::Path;

use schemaless_config::ChooserAlgorithm;
use schemaless_config::ConfigError;
use schemaless_config::SchemalessConfig;
use schemaless_core::CellWrite;
use schemaless_core::OpContext;
use schemaless_core::RowKey;
use schemaless_store_sqlite::IndexResolution;
use schemaless_store_sqlite::SqliteStoreMode;
use serde_json::json;
use tempfile::TempDir;

fn shards_toml(dir: &Path, count: usize) -> String {
    (0 .. count)
        .map(|index| {
            format!(
                "[[shards]]\nname = \"shard-{index}\"\npath = \"{}\"\n",
                dir.join(format!("shard-{index}.db")).display()
            )
        })
        .collect()
}

#[test]
fn defaults_apply_to_minimal_config() {
    let dir = TempDir::new().unwrap();
    let config = SchemalessConfig::parse(&shards_toml(dir.path(), 1)).unwrap();
    assert_eq!(config.chooser.algorithm, ChooserAlgorithm::Jump);
    assert_eq!(config.index.resolution, IndexResolution::Join);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.shards[0].journal_mode, SqliteStoreMode::Wal);
    assert_eq!(config.shards[0].busy_timeout_ms, 5_000);
}

#[test]
fn load_reads_explicit_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("schemaless.toml");
    let text = format!(
        "[chooser]\nalgorithm = \"rendezvous\"\n\n[index]\nresolution = \"per_row\"\n\n{}",
        shards_toml(dir.path(), 2)
    );
    fs::write(&path, text).unwrap();
    let config = SchemalessConfig::load(Some(&path)).unwrap();
    assert_eq!(config.chooser.algorithm, ChooserAlgorithm::Rendezvous);
    assert_eq!(config.index.resolution, IndexResolution::PerRow);
    assert_eq!(config.shards.len(), 2);
}

#[test]
fn load_rejects_missing_oversized_and_non_utf8_files() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.toml");
    assert!(matches!(SchemalessConfig::load(Some(&missing)), Err(ConfigError::Io(_))));

    let large = dir.path().join("large.toml");
    fs::write(&large, vec![b'#'; 1024 * 1024 + 1]).unwrap();
    assert!(matches!(SchemalessConfig::load(Some(&large)), Err(ConfigError::Invalid(_))));

    let binary = dir.path().join("binary.toml");
    fs::write(&binary, [0xff, 0xfe, 0xfd]).unwrap();
    assert!(matches!(SchemalessConfig::load(Some(&binary)), Err(ConfigError::Invalid(_))));
}

#[test]
fn invalid_shard_lists_fail_closed() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("a.db");
    let cases = [
        String::new(),
        format!(
            "[[shards]]\nname = \"a\"\npath = \"{0}\"\n[[shards]]\nname = \"a\"\npath = \"{0}x\"\n",
            base.display()
        ),
        format!(
            "[[shards]]\nname = \"a\"\npath = \"{0}\"\n[[shards]]\nname = \"b\"\npath = \"{0}\"\n",
            base.display()
        ),
        format!("[[shards]]\nname = \" \"\npath = \"{}\"\n", base.display()),
        format!("[[shards]]\nname = \"{}\"\npath = \"{}\"\n", "n".repeat(129), base.display()),
        format!("[[shards]]\nname = \"a\"\npath = \"{}\"\nbusy_timeout_ms = 0\n", base.display()),
        format!("[logging]\nlevel = \"loud\"\n{}", shards_toml(dir.path(), 1)),
    ];
    for case in cases {
        assert!(matches!(SchemalessConfig::parse(&case), Err(ConfigError::Invalid(_))), "{case}");
    }
}

#[test]
fn unknown_keys_are_parse_errors() {
    let dir = TempDir::new().unwrap();
    let text = format!("[chooser]\nalgorithm = \"ring\"\n{}", shards_toml(dir.path(), 1));
    assert!(matches!(SchemalessConfig::parse(&text), Err(ConfigError::Parse(_))));
    let text = format!("surprise = true\n{}", shards_toml(dir.path(), 1));
    assert!(matches!(SchemalessConfig::parse(&text), Err(ConfigError::Parse(_))));
}

#[test]
fn build_store_routes_across_configured_shards() {
    let dir = TempDir::new().unwrap();
    let config = SchemalessConfig::parse(&shards_toml(dir.path(), 3)).unwrap();
    let store = config.build_store().unwrap();
    assert_eq!(store.buckets().unwrap(), vec!["shard-0", "shard-1", "shard-2"]);

    let ctx = OpContext::background();
    for index in 0 .. 12 {
        let write = CellWrite::json(RowKey::random(), "users", 1, &json!({"n": index})).unwrap();
        store.put_cell(&ctx, &write).unwrap();
    }
    let all = store.get_cells_by_column_latest(&ctx, "users").unwrap();
    assert!(all.is_complete());
    assert_eq!(all.value.len(), 12);
    for index in 0 .. 3 {
        assert!(dir.path().join(format!("shard-{index}.db")).exists());
    }
}

#[test]
fn build_store_reports_unopenable_shards() {
    let dir = TempDir::new().unwrap();
    let text = format!("[[shards]]\nname = \"a\"\npath = \"{}\"\n", dir.path().display());
    let config = SchemalessConfig::parse(&text).unwrap();
    assert!(matches!(config.build_store(), Err(ConfigError::Store(_))));
}
