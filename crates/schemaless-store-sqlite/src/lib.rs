// crates/schemaless-store-sqlite/src/lib.rs
// ============================================================================
// Module: Schemaless SQLite Store
// Description: SQLite-backed storage backend for one shard.
// Purpose: Persist cells and their secondary indexes durably.
// Dependencies: rusqlite, schemaless-core, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`SqliteBackend`] implements [`schemaless_core::StorageBackend`] on a single
//! `SQLite` database file. Cells live in one append-only table; each
//! `(column, field)` pair gets its own lazily created index table.
//! Security posture: field names and operators are validated before they
//! reach SQL, and cell bodies are never logged.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod index;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::DEFAULT_MAX_BODY_BYTES;
pub use store::IndexResolution;
pub use store::SqliteBackend;
pub use store::SqliteBackendConfig;
pub use store::SqliteBackendError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
