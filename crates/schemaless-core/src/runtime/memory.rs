// crates/schemaless-core/src/runtime/memory.rs
// ============================================================================
// Module: In-Memory Backend
// Description: Process-local storage backend for tests and demos.
// Purpose: Provide the full backend contract without external storage.
// Dependencies: crate::core, crate::interfaces, tracing
// ============================================================================

//! ## Overview
//! [`InMemoryBackend`] keeps cells and per-(column, field) indexes in ordered
//! maps behind one mutex. It follows the same index and ordering rules as
//! the durable backends: index entries are upserted by row key, only the
//! newest version of a row re-indexes it, and list results are ordered by
//! row key. It is not intended for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use crate::core::Cell;
use crate::core::CellWrite;
use crate::core::IDENTITY_FIELD;
use crate::core::IndexValue;
use crate::core::OpContext;
use crate::core::RowKey;
use crate::core::decode_document;
use crate::core::validate_column_name;
use crate::core::validate_field_name;
use crate::interfaces::Comparison;
use crate::interfaces::FieldQuery;
use crate::interfaces::PartitionLocation;
use crate::interfaces::PartitionRead;
use crate::interfaces::StorageBackend;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: State
// ============================================================================

/// Cell identity `(row_key, column, ref_key)`.
type CellId = (RowKey, String, i64);
/// Index identity `(column, field)`.
type IndexId = (String, String);

/// Mutable backend contents.
#[derive(Debug, Default)]
struct MemoryState {
    /// Cells keyed by identity.
    cells: BTreeMap<CellId, Cell>,
    /// Index entries, one value per row key.
    indexes: BTreeMap<IndexId, BTreeMap<RowKey, IndexValue>>,
    /// Last assigned insertion sequence.
    last_added_at: i64,
    /// Set once the backend is destroyed.
    destroyed: bool,
}

impl MemoryState {
    /// Returns the newest version of a row.
    fn latest(&self, row_key: &RowKey, column: &str) -> Option<&Cell> {
        let start = (row_key.clone(), column.to_string(), i64::MIN);
        let end = (row_key.clone(), column.to_string(), i64::MAX);
        self.cells.range(start..=end).next_back().map(|(_, cell)| cell)
    }

    /// Returns index hits for `(column, field)` matching `predicate`.
    fn hits(
        &self,
        column: &str,
        field: &str,
        predicate: impl Fn(&IndexValue) -> bool,
    ) -> Vec<RowKey> {
        self.indexes
            .get(&(column.to_string(), field.to_string()))
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, value)| predicate(value))
                    .map(|(row_key, _)| row_key.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resolves row keys to their latest cells, preserving row key order.
    fn resolve(&self, row_keys: &[RowKey], column: &str) -> Vec<Cell> {
        row_keys.iter().filter_map(|row_key| self.latest(row_key, column)).cloned().collect()
    }
}

// ============================================================================
// SECTION: Backend
// ============================================================================

/// In-memory storage backend for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    /// Backend contents protected by a mutex.
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored cells.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend is destroyed.
    pub fn cell_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.cells.len())
    }

    /// Locks live state, rejecting destroyed backends.
    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        let guard = self
            .state
            .lock()
            .map_err(|_| StoreError::Store("in-memory backend mutex poisoned".to_string()))?;
        if guard.destroyed {
            return Err(StoreError::Destroyed);
        }
        Ok(guard)
    }

    /// Checks the context then locks live state.
    fn enter(&self, ctx: &OpContext) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        ctx.check()?;
        self.lock()
    }
}

impl StorageBackend for InMemoryBackend {
    fn put_cell(&self, ctx: &OpContext, write: &CellWrite) -> Result<(), StoreError> {
        validate_column_name(&write.column_name)?;
        let document = decode_document(&write.body)?;
        let mut state = self.enter(ctx)?;
        let id = (write.row_key.clone(), write.column_name.clone(), write.ref_key);
        if state.cells.contains_key(&id) {
            return Err(StoreError::IntegrityViolation(format!(
                "cell version {} already exists in column {}",
                write.ref_key, write.column_name
            )));
        }
        let is_newest = state
            .latest(&write.row_key, &write.column_name)
            .is_none_or(|latest| latest.ref_key < write.ref_key);
        state.last_added_at += 1;
        let cell = Cell {
            row_key: write.row_key.clone(),
            column_name: write.column_name.clone(),
            ref_key: write.ref_key,
            body: write.body.clone(),
            added_at: state.last_added_at,
            created_at: Some(unix_millis()),
        };
        state.cells.insert(id, cell);
        if !is_newest {
            return Ok(());
        }
        let entries = write.index_entries(&document);
        for (field, value) in entries {
            state
                .indexes
                .entry((write.column_name.clone(), field))
                .or_default()
                .insert(write.row_key.clone(), value);
        }
        Ok(())
    }

    fn get_cell(
        &self,
        ctx: &OpContext,
        row_key: &RowKey,
        column: &str,
        ref_key: i64,
    ) -> Result<Option<Cell>, StoreError> {
        let state = self.enter(ctx)?;
        Ok(state.cells.get(&(row_key.clone(), column.to_string(), ref_key)).cloned())
    }

    fn get_cell_latest(
        &self,
        ctx: &OpContext,
        row_key: &RowKey,
        column: &str,
    ) -> Result<Option<Cell>, StoreError> {
        let state = self.enter(ctx)?;
        Ok(state.latest(row_key, column).cloned())
    }

    fn get_cells_by_column_latest(
        &self,
        ctx: &OpContext,
        column: &str,
    ) -> Result<Vec<Cell>, StoreError> {
        validate_column_name(column)?;
        let state = self.enter(ctx)?;
        let row_keys = state.hits(column, IDENTITY_FIELD, |_| true);
        Ok(state.resolve(&row_keys, column))
    }

    fn get_cells_by_field_latest(
        &self,
        ctx: &OpContext,
        query: &FieldQuery,
    ) -> Result<Vec<Cell>, StoreError> {
        let state = self.enter(ctx)?;
        let row_keys = state.hits(&query.column, &query.field, |stored| {
            query.comparison.matches(stored, &query.value)
        });
        Ok(state.resolve(&row_keys, &query.column))
    }

    fn get_cell_by_unique_field_latest(
        &self,
        ctx: &OpContext,
        column: &str,
        field: &str,
        value: &IndexValue,
    ) -> Result<Option<Cell>, StoreError> {
        validate_column_name(column)?;
        validate_field_name(field)?;
        let state = self.enter(ctx)?;
        let row_keys = state.hits(column, field, |stored| Comparison::Equal.matches(stored, value));
        if row_keys.len() > 1 {
            return Err(StoreError::IntegrityViolation(format!(
                "{} rows share unique field {column}.{field}",
                row_keys.len()
            )));
        }
        Ok(state.resolve(&row_keys, column).into_iter().next())
    }

    fn check_value_exist(
        &self,
        ctx: &OpContext,
        column: &str,
        field: &str,
        value: &IndexValue,
    ) -> Result<bool, StoreError> {
        validate_column_name(column)?;
        validate_field_name(field)?;
        let state = self.enter(ctx)?;
        Ok(!state.hits(column, field, |stored| Comparison::Equal.matches(stored, value)).is_empty())
    }

    fn partition_read(
        &self,
        ctx: &OpContext,
        read: &PartitionRead,
    ) -> Result<Vec<Cell>, StoreError> {
        read.validate()?;
        let state = self.enter(ctx)?;
        let location = |cell: &Cell| match read.location {
            PartitionLocation::AddedAt => Some(cell.added_at),
            PartitionLocation::CreatedAt => cell.created_at,
        };
        let mut cells: Vec<Cell> = state
            .cells
            .values()
            .filter(|cell| location(cell).is_some_and(|value| value > read.after))
            .cloned()
            .collect();
        cells.sort_by_key(|cell| (location(cell), cell.added_at));
        cells.truncate(read.limit);
        Ok(cells)
    }

    fn reset_connection(&self, ctx: &OpContext) -> Result<(), StoreError> {
        self.enter(ctx).map(|_| ())
    }

    fn destroy(&self, _ctx: &OpContext) -> Result<(), StoreError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| StoreError::Store("in-memory backend mutex poisoned".to_string()))?;
        if !guard.destroyed {
            *guard = MemoryState { destroyed: true, ..MemoryState::default() };
        }
        Ok(())
    }
}

/// Current unix time in milliseconds.
fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}
