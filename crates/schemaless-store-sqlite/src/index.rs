// crates/schemaless-store-sqlite/src/index.rs
// ============================================================================
// Module: SQLite Secondary Indexes
// Description: Lazily created per-(column, field) index tables and queries.
// Purpose: Answer field queries against a shard without a predefined schema.
// Dependencies: rusqlite, schemaless-core, tracing
// ============================================================================

//! ## Overview
//! Every `(column, field)` pair owns a table named `index_<column>_<field>`
//! with a `row_key` primary key and one value column named after the field.
//! The value column has no declared type, so values keep their storage class
//! and comparisons follow `SQLite` ordering. Entries are upserted by row key,
//! so each row maps to the value from its newest write only.
//!
//! The `index_catalog` table records which pair owns which table. It lets
//! indexes survive reopen and rejects two pairs that would share one table
//! name (`a_b`/`c` and `a`/`b_c`). `SQLite` identifiers are case-insensitive,
//! so names that differ only in ASCII case (`domain`/`Domain`) collide too.
//!
//! Identifiers are validated by callers before reaching this module and are
//! always double-quoted in SQL.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use schemaless_core::Cell;
use schemaless_core::Comparison;
use schemaless_core::IndexValue;
use schemaless_core::RowKey;
use schemaless_core::index_table_name;

use crate::store::CELL_SELECT;
use crate::store::SqliteBackendError;
use crate::store::latest_cell;
use crate::store::map_cell_row;
use crate::store::unix_millis;

/// `(column, field)` to index table name.
pub(crate) type IndexCatalog = BTreeMap<(String, String), String>;

/// Optional value predicate applied to index entries.
pub(crate) type IndexFilter<'a> = Option<(Comparison, &'a IndexValue)>;

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Loads every registered index.
pub(crate) fn load_catalog(connection: &Connection) -> Result<IndexCatalog, SqliteBackendError> {
    let mut stmt =
        connection.prepare("SELECT column_name, field_name, table_name FROM index_catalog")?;
    let rows = stmt.query_map([], |row| {
        Ok(((row.get::<_, String>(0)?, row.get::<_, String>(1)?), row.get::<_, String>(2)?))
    })?;
    let mut catalog = IndexCatalog::new();
    for row in rows {
        let (key, table) = row?;
        catalog.insert(key, table);
    }
    Ok(catalog)
}

/// Returns the index table for `(column, field)`, creating it when missing.
///
/// Tables created here are recorded in `pending`; the caller merges them into
/// the cached catalog once the surrounding transaction commits.
pub(crate) fn ensure_index(
    connection: &Connection,
    catalog: &IndexCatalog,
    pending: &mut IndexCatalog,
    column: &str,
    field: &str,
) -> Result<String, SqliteBackendError> {
    let key = (column.to_string(), field.to_string());
    if let Some(table) = catalog.get(&key).or_else(|| pending.get(&key)) {
        return Ok(table.clone());
    }
    let table = index_table_name(column, field);
    let owner: Option<(String, String)> = connection
        .query_row(
            "SELECT column_name, field_name FROM index_catalog WHERE table_name = ?1 COLLATE NOCASE",
            params![table],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    match owner {
        Some(owner) if owner == key => {}
        Some((owner_column, owner_field)) => {
            return Err(SqliteBackendError::Invalid(format!(
                "index table {table} already belongs to {owner_column}.{owner_field}"
            )));
        }
        None => {
            connection.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_sql} (row_key BLOB PRIMARY KEY NOT NULL, \
                 {field_sql});
                 CREATE INDEX IF NOT EXISTS {value_index} ON {table_sql} ({field_sql});",
                table_sql = quote(&table),
                field_sql = quote(field),
                value_index = quote(&format!("idx_{table}")),
            ))?;
            connection.execute(
                "INSERT INTO index_catalog (column_name, field_name, table_name, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![column, field, table, unix_millis()],
            )?;
            tracing::info!(column = %column, field = %field, table = %table, "created index table");
        }
    }
    pending.insert(key, table.clone());
    Ok(table)
}

// ============================================================================
// SECTION: Maintenance
// ============================================================================

/// Upserts the entry for `row_key`.
pub(crate) fn put_index(
    connection: &Connection,
    table: &str,
    field: &str,
    row_key: &RowKey,
    value: &IndexValue,
) -> Result<(), SqliteBackendError> {
    let sql = format!(
        "INSERT INTO {table} (row_key, {field}) VALUES (?1, ?2) ON CONFLICT(row_key) DO UPDATE \
         SET {field} = excluded.{field}",
        table = quote(table),
        field = quote(field),
    );
    connection.execute(&sql, params![row_key.as_bytes(), sql_value(value)])?;
    Ok(())
}

// ============================================================================
// SECTION: Queries
// ============================================================================

/// Returns row keys whose entry satisfies `filter`, ordered by row key.
pub(crate) fn matching_row_keys(
    connection: &Connection,
    table: &str,
    field: &str,
    filter: IndexFilter<'_>,
) -> Result<Vec<RowKey>, SqliteBackendError> {
    let (clause, values) = match predicate_sql(&quote(field), filter, 1) {
        Some((condition, value)) => (format!("WHERE {condition}"), vec![value]),
        None => (String::new(), Vec::new()),
    };
    let sql = format!("SELECT row_key FROM {} {clause} ORDER BY row_key", quote(table));
    let mut stmt = connection.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), |row| row.get::<_, Vec<u8>>(0))?;
    let mut row_keys = Vec::new();
    for row in rows {
        row_keys.push(RowKey::new(row?));
    }
    Ok(row_keys)
}

/// Returns true when any entry equals `value`.
pub(crate) fn value_exists(
    connection: &Connection,
    table: &str,
    field: &str,
    value: &IndexValue,
) -> Result<bool, SqliteBackendError> {
    let sql = format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = ?1)",
        quote(table),
        quote(field)
    );
    Ok(connection.query_row(&sql, params![sql_value(value)], |row| row.get(0))?)
}

/// Resolves matching entries to latest cells with one join.
pub(crate) fn latest_cells_joined(
    connection: &Connection,
    column: &str,
    table: &str,
    field: &str,
    filter: IndexFilter<'_>,
) -> Result<Vec<Cell>, SqliteBackendError> {
    let mut values = vec![Value::Text(column.to_string())];
    let clause = match predicate_sql(&format!("i.{}", quote(field)), filter, 2) {
        Some((condition, value)) => {
            values.push(value);
            format!("AND {condition}")
        }
        None => String::new(),
    };
    let sql = format!(
        "{CELL_SELECT} AS c JOIN {table} AS i ON i.row_key = c.row_key WHERE c.column_name = ?1 \
         {clause} AND c.ref_key = (SELECT MAX(m.ref_key) FROM cell AS m WHERE m.row_key = \
         c.row_key AND m.column_name = c.column_name) ORDER BY c.row_key",
        table = quote(table),
    );
    let mut stmt = connection.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), map_cell_row)?;
    let mut cells = Vec::new();
    for row in rows {
        cells.push(row?);
    }
    Ok(cells)
}

/// Resolves matching entries to latest cells one row at a time.
pub(crate) fn latest_cells_per_row(
    connection: &Connection,
    column: &str,
    table: &str,
    field: &str,
    filter: IndexFilter<'_>,
) -> Result<Vec<Cell>, SqliteBackendError> {
    let mut cells = Vec::new();
    for row_key in matching_row_keys(connection, table, field, filter)? {
        if let Some(cell) = latest_cell(connection, &row_key, column)? {
            cells.push(cell);
        }
    }
    Ok(cells)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds `<field> <op> ?n` and its bound value.
fn predicate_sql(
    field_sql: &str,
    filter: IndexFilter<'_>,
    placeholder: usize,
) -> Option<(String, Value)> {
    filter.map(|(comparison, value)| {
        (format!("{field_sql} {} ?{placeholder}", comparison.as_sql()), sql_value(value))
    })
}

/// Double-quotes a validated identifier.
fn quote(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

/// Converts an index value to its `SQLite` storage class.
fn sql_value(value: &IndexValue) -> Value {
    match value {
        IndexValue::Null => Value::Null,
        IndexValue::Integer(number) => Value::Integer(*number),
        IndexValue::Real(number) => Value::Real(*number),
        IndexValue::Text(text) => Value::Text(text.clone()),
        IndexValue::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}
