// crates/schemaless-core/src/core/cell.rs
// ============================================================================
// Module: Cell Model
// Description: Row keys, immutable versioned cells, and write requests.
// Purpose: Define the record shape every backend persists.
// Dependencies: hex, serde, serde_json, tracing, uuid
// ============================================================================

//! ## Overview
//! A cell is one immutable version of a logical record. Callers choose the
//! row key, the column name, and the ordering `ref_key`; backends assign
//! `added_at` (insertion sequence) and `created_at` (unix milliseconds).
//! Bodies are opaque bytes, conventionally a flat JSON object whose fields
//! feed the secondary indexes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use uuid::Uuid;

use crate::core::identifiers::IDENTITY_FIELD;
use crate::core::identifiers::is_indexable_field;
use crate::core::value::IndexValue;
use crate::interfaces::StoreError;

/// Flat field to value document decoded from a cell body.
pub type Document = Map<String, Value>;

// ============================================================================
// SECTION: Row Key
// ============================================================================

/// Opaque, caller-generated row identifier.
///
/// # Invariants
/// - Bytes are compared lexicographically; ordering is stable across backends.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowKey(Vec<u8>);

impl RowKey {
    /// Wraps raw row key bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Generates a random UUID v4 row key.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4().as_bytes().to_vec())
    }

    /// Parses a row key from a UUID string or a hex string.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] when the text is neither.
    pub fn parse(text: &str) -> Result<Self, StoreError> {
        if let Ok(uuid) = Uuid::parse_str(text) {
            return Ok(Self(uuid.as_bytes().to_vec()));
        }
        hex::decode(text)
            .map(Self)
            .map_err(|_| StoreError::InvalidInput(format!("row key is not a uuid or hex: {text}")))
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the lowercase hex encoding used in logs and CLI output.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl From<Uuid> for RowKey {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.as_bytes().to_vec())
    }
}

impl From<&[u8]> for RowKey {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl AsRef<[u8]> for RowKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowKey({})", self.to_hex())
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// ============================================================================
// SECTION: Cell
// ============================================================================

/// One immutable, versioned record.
///
/// # Invariants
/// - `(row_key, column_name, ref_key)` is unique within a backend.
/// - Cells are never mutated after they are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Caller-assigned row identifier.
    pub row_key: RowKey,
    /// Logical column (table-like grouping).
    pub column_name: String,
    /// Caller-chosen version key; higher is newer.
    pub ref_key: i64,
    /// Opaque body bytes.
    pub body: Vec<u8>,
    /// Backend-assigned insertion sequence.
    pub added_at: i64,
    /// Backend timestamp in unix milliseconds, when recorded.
    pub created_at: Option<i64>,
}

impl Cell {
    /// Decodes the body as a flat field to value document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] when the body is not a JSON object.
    pub fn document(&self) -> Result<Document, StoreError> {
        decode_document(&self.body)
    }
}

/// Decodes a cell body into a flat field to value document.
///
/// # Errors
///
/// Returns [`StoreError::Serialization`] when the body is not valid JSON or
/// is not a JSON object.
pub fn decode_document(body: &[u8]) -> Result<Document, StoreError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(StoreError::Serialization("cell body must be a JSON object".to_string())),
        Err(err) => Err(StoreError::Serialization(format!("cell body is not valid JSON: {err}"))),
    }
}

// ============================================================================
// SECTION: Write Request
// ============================================================================

/// Canonical `PutCell` input.
///
/// # Invariants
/// - `exclude_fields` names body fields that must not be indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellWrite {
    /// Row identifier.
    pub row_key: RowKey,
    /// Column name.
    pub column_name: String,
    /// Version key.
    pub ref_key: i64,
    /// Body bytes.
    pub body: Vec<u8>,
    /// Body fields skipped by index maintenance.
    pub exclude_fields: BTreeSet<String>,
}

impl CellWrite {
    /// Builds a write with an empty exclusion set.
    #[must_use]
    pub fn new(
        row_key: RowKey,
        column_name: impl Into<String>,
        ref_key: i64,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            row_key,
            column_name: column_name.into(),
            ref_key,
            body: body.into(),
            exclude_fields: BTreeSet::new(),
        }
    }

    /// Builds a write whose body is the JSON encoding of `document`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] when the value cannot be encoded.
    pub fn json<T: Serialize>(
        row_key: RowKey,
        column_name: impl Into<String>,
        ref_key: i64,
        document: &T,
    ) -> Result<Self, StoreError> {
        let body =
            serde_json::to_vec(document).map_err(|err| StoreError::Serialization(err.to_string()))?;
        Ok(Self::new(row_key, column_name, ref_key, body))
    }

    /// Adds fields to the index exclusion set.
    #[must_use]
    pub fn excluding<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Returns the index entries this write maintains, identity first.
    ///
    /// Excluded fields are dropped silently; fields that break identifier
    /// rules are dropped with a warning.
    #[must_use]
    pub fn index_entries(&self, document: &Document) -> Vec<(String, IndexValue)> {
        let mut entries = Vec::with_capacity(document.len() + 1);
        entries.push((IDENTITY_FIELD.to_string(), IndexValue::Blob(self.row_key.as_bytes().to_vec())));
        for (field, value) in document {
            if self.exclude_fields.contains(field) {
                continue;
            }
            if !is_indexable_field(field) {
                tracing::warn!(column = %self.column_name, field = %field, "skipping unindexable field");
                continue;
            }
            entries.push((field.clone(), IndexValue::from_json(value)));
        }
        entries
    }
}
