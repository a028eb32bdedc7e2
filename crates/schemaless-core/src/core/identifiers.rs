// crates/schemaless-core/src/core/identifiers.rs
// ============================================================================
// Module: Identifier Rules
// Description: Validation for column and field names used in index tables.
// Purpose: Keep names safe to embed in backend table and column identifiers.
// Dependencies: crate::interfaces
// ============================================================================

//! ## Overview
//! Column and field names end up inside index table names
//! (`index_<column>_<field>`) and index column names, so they are restricted
//! to ASCII letters, digits, and underscores, must not start with a digit,
//! and are capped at [`MAX_IDENTIFIER_LENGTH`] characters. `row_key` is
//! reserved for the index key column and [`IDENTITY_FIELD`] for the synthetic
//! per-row identity index.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a column or field name.
pub const MAX_IDENTIFIER_LENGTH: usize = 64;
/// Key column shared by every index table.
pub const ROW_KEY_COLUMN: &str = "row_key";
/// Synthetic field indexed for every write; answers "all rows in a column".
pub const IDENTITY_FIELD: &str = "_identity";

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates a column name.
///
/// # Errors
///
/// Returns [`StoreError::InvalidInput`] when the name breaks identifier rules.
pub fn validate_column_name(name: &str) -> Result<(), StoreError> {
    validate_identifier("column", name)
}

/// Validates a field name supplied to a query.
///
/// # Errors
///
/// Returns [`StoreError::InvalidInput`] when the name breaks identifier rules
/// or names a reserved index column.
pub fn validate_field_name(name: &str) -> Result<(), StoreError> {
    validate_identifier("field", name)?;
    if name.eq_ignore_ascii_case(ROW_KEY_COLUMN) {
        return Err(StoreError::InvalidInput(format!("field name {name} is reserved")));
    }
    Ok(())
}

/// Returns true when a body field can be indexed.
///
/// The identity field is reserved and never indexed from a body.
#[must_use]
pub fn is_indexable_field(name: &str) -> bool {
    name != IDENTITY_FIELD && validate_field_name(name).is_ok()
}

/// Returns the deterministic index table name for `(column, field)`.
#[must_use]
pub fn index_table_name(column: &str, field: &str) -> String {
    format!("index_{column}_{field}")
}

/// Shared identifier check.
fn validate_identifier(kind: &str, name: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::InvalidInput(format!("{kind} name must be non-empty")));
    }
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(StoreError::InvalidInput(format!(
            "{kind} name exceeds {MAX_IDENTIFIER_LENGTH} characters"
        )));
    }
    if name.starts_with(|ch: char| ch.is_ascii_digit()) {
        return Err(StoreError::InvalidInput(format!("{kind} name must not start with a digit")));
    }
    if !name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return Err(StoreError::InvalidInput(format!(
            "{kind} name {name} may only contain ASCII letters, digits, and underscores"
        )));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
