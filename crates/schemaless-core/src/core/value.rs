// crates/schemaless-core/src/core/value.rs
// ============================================================================
// Module: Index Values
// Description: Typed values stored in secondary index entries.
// Purpose: Give every backend the same value typing and comparison rules.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Index entries hold one [`IndexValue`] per row key. JSON body values map
//! onto SQLite storage classes: booleans become `0`/`1`, arrays and objects
//! are stored as their JSON text. Comparison follows SQLite: `NULL` never
//! satisfies a comparison, numbers compare numerically, numbers sort before
//! text, and text sorts before blobs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Index Value
// ============================================================================

/// A single indexed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum IndexValue {
    /// JSON `null`.
    Null,
    /// Integer (JSON integers and booleans).
    Integer(i64),
    /// Floating point number.
    Real(f64),
    /// Text (JSON strings, or JSON text of arrays and objects).
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl IndexValue {
    /// Converts a JSON body value into its indexed form.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Integer(i64::from(*flag)),
            Value::Number(number) => number.as_i64().map_or_else(
                || number.as_f64().map_or_else(|| Self::Text(number.to_string()), Self::Real),
                Self::Integer,
            ),
            Value::String(text) => Self::Text(text.clone()),
            Value::Array(_) | Value::Object(_) => Self::Text(value.to_string()),
        }
    }

    /// Compares two values with SQLite semantics.
    ///
    /// Returns `None` when either side is `NULL`, which never matches.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Integer(left), Self::Integer(right)) => Some(left.cmp(right)),
            (Self::Integer(left), Self::Real(right)) => int_to_real(*left).partial_cmp(right),
            (Self::Real(left), Self::Integer(right)) => left.partial_cmp(&int_to_real(*right)),
            (Self::Real(left), Self::Real(right)) => left.partial_cmp(right),
            (Self::Text(left), Self::Text(right)) => Some(left.as_bytes().cmp(right.as_bytes())),
            (Self::Blob(left), Self::Blob(right)) => Some(left.cmp(right)),
            (left, right) => Some(left.storage_class().cmp(&right.storage_class())),
        }
    }

    /// SQLite storage class rank used for cross-type ordering.
    const fn storage_class(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Integer(_) | Self::Real(_) => 1,
            Self::Text(_) => 2,
            Self::Blob(_) => 3,
        }
    }
}

impl From<&Value> for IndexValue {
    fn from(value: &Value) -> Self {
        Self::from_json(value)
    }
}

impl From<&str> for IndexValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for IndexValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// Widens an integer for mixed numeric comparison.
#[allow(clippy::cast_precision_loss, reason = "Mixed int/real comparison mirrors SQLite.")]
const fn int_to_real(value: i64) -> f64 {
    value as f64
}

// ============================================================================
// SECTION: Tests
// ============================================================================
