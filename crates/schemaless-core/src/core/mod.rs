// crates/schemaless-core/src/core/mod.rs
// ============================================================================
// Module: Schemaless Core Types
// Description: Cell model, identifier rules, index values, operation context.
// Purpose: Group the data types shared by routers and backends.
// Dependencies: serde, serde_json, tokio-util, uuid
// ============================================================================

//! ## Overview
//! Core types are backend-agnostic. A [`Cell`] is immutable once written and
//! identified by `(row_key, column_name, ref_key)`; the latest cell for a
//! `(row_key, column_name)` pair is the one with the highest `ref_key`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod cell;
pub mod context;
pub mod identifiers;
pub mod value;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cell::Cell;
pub use cell::CellWrite;
pub use cell::Document;
pub use cell::RowKey;
pub use cell::decode_document;
pub use context::OpContext;
pub use identifiers::IDENTITY_FIELD;
pub use identifiers::MAX_IDENTIFIER_LENGTH;
pub use identifiers::ROW_KEY_COLUMN;
pub use identifiers::index_table_name;
pub use identifiers::is_indexable_field;
pub use identifiers::validate_column_name;
pub use identifiers::validate_field_name;
pub use value::IndexValue;
