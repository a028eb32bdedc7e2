// crates/schemaless-core/src/interfaces/mod.rs
// ============================================================================
// Module: Schemaless Interfaces
// Description: Storage backend contract, query types, and error taxonomy.
// Purpose: Define the capability surface the router consumes from backends.
// Dependencies: crate::core, serde, thiserror
// ============================================================================

//! ## Overview
//! A backend owns one shard's cells and that shard's secondary indexes. Every
//! operation is atomic with respect to the backend's own storage only and
//! takes an [`OpContext`] carrying the caller's deadline and cancellation.
//! A missing cell is a normal outcome (`None` or an empty list), never an
//! error.
//!
//! Security posture: field names and operators arrive from callers; they are
//! validated here before any backend embeds them in a query.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::Cell;
use crate::core::CellWrite;
use crate::core::IndexValue;
use crate::core::OpContext;
use crate::core::RowKey;
use crate::core::validate_column_name;
use crate::core::validate_field_name;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors surfaced by backends and the router.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Not-found is never represented here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Stored data violates a uniqueness assertion.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),
    /// Transient connectivity failure; reset the connection and retry.
    #[error("connection error: {0}")]
    Connection(String),
    /// A cell body could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// No shard could be resolved for the request.
    #[error("routing error: {0}")]
    Routing(String),
    /// Caller input was rejected before reaching storage.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The operation context was cancelled.
    #[error("operation cancelled")]
    Cancelled,
    /// The operation context deadline passed.
    #[error("operation deadline exceeded")]
    DeadlineExceeded,
    /// The backend was destroyed.
    #[error("backend destroyed")]
    Destroyed,
    /// Any other backend fault.
    #[error("store error: {0}")]
    Store(String),
}

impl StoreError {
    /// Returns true when a connection reset and retry may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

// ============================================================================
// SECTION: Comparison
// ============================================================================

/// Allow-listed comparison operators for field queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// `=`
    Equal,
    /// `!=`
    NotEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
}

impl Comparison {
    /// Parses a caller-supplied operator.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] for anything outside the allow-list.
    pub fn parse(operator: &str) -> Result<Self, StoreError> {
        match operator.trim() {
            "=" | "==" => Ok(Self::Equal),
            "!=" | "<>" => Ok(Self::NotEqual),
            ">" => Ok(Self::Greater),
            ">=" => Ok(Self::GreaterOrEqual),
            "<" => Ok(Self::Less),
            "<=" => Ok(Self::LessOrEqual),
            other => Err(StoreError::InvalidInput(format!("unsupported operator: {other:?}"))),
        }
    }

    /// Returns the SQL token for this operator.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
        }
    }

    /// Evaluates `stored <op> query` with SQL semantics.
    #[must_use]
    pub fn matches(self, stored: &IndexValue, query: &IndexValue) -> bool {
        let Some(ordering) = stored.compare(query) else {
            return false;
        };
        match self {
            Self::Equal => ordering == Ordering::Equal,
            Self::NotEqual => ordering != Ordering::Equal,
            Self::Greater => ordering == Ordering::Greater,
            Self::GreaterOrEqual => ordering != Ordering::Less,
            Self::Less => ordering == Ordering::Less,
            Self::LessOrEqual => ordering != Ordering::Greater,
        }
    }
}

impl FromStr for Comparison {
    type Err = StoreError;

    fn from_str(operator: &str) -> Result<Self, Self::Err> {
        Self::parse(operator)
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

// ============================================================================
// SECTION: Queries
// ============================================================================

/// Validated field query over a column's secondary index.
///
/// # Invariants
/// - `column` and `field` satisfy the identifier rules.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldQuery {
    /// Column to search.
    pub column: String,
    /// Indexed body field.
    pub field: String,
    /// Value compared against the index entry.
    pub value: IndexValue,
    /// Comparison applied as `entry <comparison> value`.
    pub comparison: Comparison,
}

impl FieldQuery {
    /// Builds a query, validating identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] when the column or field is invalid.
    pub fn new(
        column: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<IndexValue>,
        comparison: Comparison,
    ) -> Result<Self, StoreError> {
        let column = column.into();
        let field = field.into();
        validate_column_name(&column)?;
        validate_field_name(&field)?;
        Ok(Self { column, field, value: value.into(), comparison })
    }

    /// Builds an equality query.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] when the column or field is invalid.
    pub fn equal(
        column: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<IndexValue>,
    ) -> Result<Self, StoreError> {
        Self::new(column, field, value, Comparison::Equal)
    }

    /// Builds a query from a textual operator.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] when the operator is not allow-listed
    /// or an identifier is invalid.
    pub fn with_operator(
        column: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<IndexValue>,
        operator: &str,
    ) -> Result<Self, StoreError> {
        Self::new(column, field, value, Comparison::parse(operator)?)
    }
}

/// Upper bound on rows returned by one partition read.
pub const MAX_PARTITION_READ_LIMIT: usize = 10_000;

/// Cell attribute a partition read is ordered and filtered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionLocation {
    /// Backend insertion sequence.
    #[default]
    AddedAt,
    /// Backend creation timestamp.
    CreatedAt,
}

/// Bounded scan over one backend.
///
/// Returns cells with `location > after` in ascending `location` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRead {
    /// Attribute scanned.
    pub location: PartitionLocation,
    /// Exclusive lower bound.
    pub after: i64,
    /// Maximum number of cells returned.
    pub limit: usize,
}

impl PartitionRead {
    /// Builds a partition read.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] when `limit` is zero or exceeds
    /// [`MAX_PARTITION_READ_LIMIT`].
    pub fn new(location: PartitionLocation, after: i64, limit: usize) -> Result<Self, StoreError> {
        let read = Self { location, after, limit };
        read.validate()?;
        Ok(read)
    }

    /// Checks the limit bounds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] when the limit is out of range.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.limit == 0 || self.limit > MAX_PARTITION_READ_LIMIT {
            return Err(StoreError::InvalidInput(format!(
                "partition read limit must be between 1 and {MAX_PARTITION_READ_LIMIT}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Storage Backend
// ============================================================================

/// Per-shard persistence of cells and their secondary indexes.
pub trait StorageBackend: Send + Sync {
    /// Persists a cell and re-indexes every non-excluded body field.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IntegrityViolation`] for a duplicate version and
    /// [`StoreError::Serialization`] when the body is not a JSON object.
    fn put_cell(&self, ctx: &OpContext, write: &CellWrite) -> Result<(), StoreError>;

    /// Loads one exact version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn get_cell(
        &self,
        ctx: &OpContext,
        row_key: &RowKey,
        column: &str,
        ref_key: i64,
    ) -> Result<Option<Cell>, StoreError>;

    /// Loads the version with the highest ref key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn get_cell_latest(
        &self,
        ctx: &OpContext,
        row_key: &RowKey,
        column: &str,
    ) -> Result<Option<Cell>, StoreError>;

    /// Loads the latest cell of every row written to `column`, ordered by row key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn get_cells_by_column_latest(
        &self,
        ctx: &OpContext,
        column: &str,
    ) -> Result<Vec<Cell>, StoreError>;

    /// Loads the latest cell of every row whose indexed field matches, ordered
    /// by row key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn get_cells_by_field_latest(
        &self,
        ctx: &OpContext,
        query: &FieldQuery,
    ) -> Result<Vec<Cell>, StoreError>;

    /// Loads the single row whose field equals `value`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IntegrityViolation`] when more than one row matches.
    fn get_cell_by_unique_field_latest(
        &self,
        ctx: &OpContext,
        column: &str,
        field: &str,
        value: &IndexValue,
    ) -> Result<Option<Cell>, StoreError>;

    /// Returns true when any row's field equals `value`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn check_value_exist(
        &self,
        ctx: &OpContext,
        column: &str,
        field: &str,
        value: &IndexValue,
    ) -> Result<bool, StoreError>;

    /// Scans a bounded slice of this backend.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] for an out-of-range limit.
    fn partition_read(&self, ctx: &OpContext, read: &PartitionRead)
    -> Result<Vec<Cell>, StoreError>;

    /// Re-establishes the underlying connection with the stored configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when reconnecting fails.
    fn reset_connection(&self, ctx: &OpContext) -> Result<(), StoreError>;

    /// Releases every resource. Idempotent; later calls return
    /// [`StoreError::Destroyed`] for every other operation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when teardown fails.
    fn destroy(&self, ctx: &OpContext) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operators_outside_allow_list_are_rejected() {
        assert_eq!(Comparison::parse("==").ok(), Some(Comparison::Equal));
        assert_eq!(Comparison::parse("<>").ok(), Some(Comparison::NotEqual));
        assert!(Comparison::parse("= 1 OR 1 =").is_err());
        assert!(Comparison::parse("LIKE").is_err());
        assert!(Comparison::parse("").is_err());
    }

    #[test]
    fn null_matches_nothing() {
        for op in [Comparison::Equal, Comparison::NotEqual, Comparison::Less] {
            assert!(!op.matches(&IndexValue::Null, &IndexValue::Integer(1)));
        }
    }

    #[test]
    fn partition_limit_is_bounded() {
        assert!(PartitionRead::new(PartitionLocation::AddedAt, 0, 0).is_err());
        assert!(PartitionRead::new(PartitionLocation::AddedAt, 0, MAX_PARTITION_READ_LIMIT).is_ok());
        assert!(
            PartitionRead::new(PartitionLocation::CreatedAt, 0, MAX_PARTITION_READ_LIMIT + 1)
                .is_err()
        );
    }

    #[test]
    fn only_connection_errors_are_retryable() {
        assert!(StoreError::Connection("busy".to_string()).is_retryable());
        assert!(!StoreError::IntegrityViolation("dup".to_string()).is_retryable());
    }
}
