// crates/schemaless-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Storage Backend
// Description: Durable StorageBackend for one shard on a SQLite file.
// Purpose: Persist immutable cells and maintain their secondary indexes.
// Dependencies: rusqlite, schemaless-core, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`SqliteBackend`] owns one `SQLite` connection for one shard. `put_cell`
//! decodes the body first, then inserts the cell and upserts its index
//! entries inside a single transaction, so a failed write leaves neither
//! behind. Each call installs a progress handler bound to the caller's
//! [`OpContext`], so cancellation and deadlines interrupt running statements.
//! Security posture: database contents are untrusted, identifiers are
//! validated before use, and bodies never appear in logs or errors.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use schemaless_core::Cell;
use schemaless_core::CellWrite;
use schemaless_core::Comparison;
use schemaless_core::FieldQuery;
use schemaless_core::IDENTITY_FIELD;
use schemaless_core::IndexValue;
use schemaless_core::OpContext;
use schemaless_core::PartitionLocation;
use schemaless_core::PartitionRead;
use schemaless_core::RowKey;
use schemaless_core::StorageBackend;
use schemaless_core::StoreError;
use schemaless_core::decode_document;
use schemaless_core::validate_column_name;
use schemaless_core::validate_field_name;
use serde::Deserialize;
use thiserror::Error;

use crate::index;
use crate::index::IndexCatalog;
use crate::index::IndexFilter;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the shard.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default maximum cell body size.
pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;
/// Virtual machine steps between cancellation checks.
const PROGRESS_HANDLER_STEPS: i32 = 1_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Column list shared by every cell query; callers alias `cell` as `c`.
pub(crate) const CELL_SELECT: &str =
    "SELECT c.row_key, c.column_name, c.ref_key, c.body, c.added_at, c.created_at FROM cell";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode.
    #[default]
    Wal,
    /// Rollback journal deleted after each transaction.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode.
    #[default]
    Full,
    /// Normal synchronous mode.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// How index hits are turned into cells.
///
/// Both strategies return the same cells in row key order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IndexResolution {
    /// One join selecting the highest ref key per row.
    #[default]
    Join,
    /// One latest-cell lookup per matching row key.
    PerRow,
}

/// Configuration for one `SQLite` shard.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` and `max_body_bytes` are greater than zero.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteBackendConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Index hit resolution strategy.
    #[serde(default)]
    pub index_resolution: IndexResolution,
    /// Maximum accepted cell body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl SqliteBackendConfig {
    /// Returns a configuration with defaults for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            index_resolution: IndexResolution::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Returns a copy using `resolution`.
    #[must_use]
    pub fn with_index_resolution(mut self, resolution: IndexResolution) -> Self {
        self.index_resolution = resolution;
        self
    }

    /// Validates limits and the database path.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteBackendError::Invalid`] when a value is out of range.
    pub fn validate(&self) -> Result<(), SqliteBackendError> {
        if self.busy_timeout_ms == 0 {
            return Err(SqliteBackendError::Invalid(
                "busy_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(SqliteBackendError::Invalid(
                "max_body_bytes must be greater than zero".to_string(),
            ));
        }
        validate_store_path(&self.path)
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default maximum body size.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` backend errors.
///
/// # Invariants
/// - Error messages never embed cell bodies.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteBackendError {
    /// Filesystem error around the database file.
    #[error("sqlite backend io error: {0}")]
    Io(String),
    /// Connection is busy, locked, unopenable, or unreadable.
    #[error("sqlite backend unavailable: {0}")]
    Unavailable(String),
    /// A constraint or uniqueness assertion failed.
    #[error("sqlite backend integrity violation: {0}")]
    Integrity(String),
    /// A statement was interrupted by the operation context.
    #[error("sqlite backend statement interrupted")]
    Interrupted,
    /// Invalid configuration or request.
    #[error("sqlite backend invalid data: {0}")]
    Invalid(String),
    /// Cell body could not be decoded.
    #[error("sqlite backend serialization error: {0}")]
    Serialization(String),
    /// Cell body exceeds the configured limit.
    #[error("sqlite backend body too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual body size in bytes.
        actual_bytes: usize,
    },
    /// Stored schema version is not supported.
    #[error("sqlite backend version mismatch: {0}")]
    VersionMismatch(String),
    /// Any other `SQLite` engine error.
    #[error("sqlite backend db error: {0}")]
    Db(String),
}

impl From<rusqlite::Error> for SqliteBackendError {
    fn from(error: rusqlite::Error) -> Self {
        let message = error.to_string();
        match error.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => Self::Integrity(message),
            Some(ErrorCode::OperationInterrupted) => Self::Interrupted,
            Some(
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::NotADatabase,
            ) => Self::Unavailable(message),
            _ => Self::Db(message),
        }
    }
}

impl From<SqliteBackendError> for StoreError {
    fn from(error: SqliteBackendError) -> Self {
        match error {
            SqliteBackendError::Io(message) | SqliteBackendError::Unavailable(message) => {
                Self::Connection(message)
            }
            SqliteBackendError::Integrity(message) => Self::IntegrityViolation(message),
            SqliteBackendError::Interrupted => Self::Cancelled,
            SqliteBackendError::Invalid(message) => Self::InvalidInput(message),
            SqliteBackendError::Serialization(message) => Self::Serialization(message),
            SqliteBackendError::TooLarge { max_bytes, actual_bytes } => Self::InvalidInput(format!(
                "cell body exceeds size limit: {actual_bytes} bytes (max {max_bytes})"
            )),
            SqliteBackendError::VersionMismatch(message) | SqliteBackendError::Db(message) => {
                Self::Store(message)
            }
        }
    }
}

// ============================================================================
// SECTION: Backend
// ============================================================================

/// Open connection plus the cached index catalog.
#[derive(Debug)]
struct LiveConnection {
    /// Exclusive `SQLite` connection.
    connection: Connection,
    /// Registered index tables.
    catalog: IndexCatalog,
}

/// Connection lifecycle.
#[derive(Debug)]
enum ConnectionState {
    /// Connection ready for use.
    Open(Box<LiveConnection>),
    /// A reset failed; the next reset may recover.
    Closed,
    /// Terminal state after [`StorageBackend::destroy`].
    Destroyed,
}

/// `SQLite`-backed storage for one shard.
///
/// # Invariants
/// - Connection access is serialized through a mutex.
/// - The connection is never shared with another backend.
#[derive(Debug)]
pub struct SqliteBackend {
    /// Configuration reused by connection resets.
    config: SqliteBackendConfig,
    /// Connection state.
    state: Mutex<ConnectionState>,
}

impl SqliteBackend {
    /// Opens (creating when missing) the shard database.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteBackendError`] when the configuration is invalid or the
    /// database cannot be opened or initialized.
    pub fn open(config: SqliteBackendConfig) -> Result<Self, SqliteBackendError> {
        config.validate()?;
        ensure_parent_dir(&config.path)?;
        let live = open_live(&config)?;
        tracing::info!(path = %config.path.display(), indexes = live.catalog.len(), "opened sqlite shard");
        Ok(Self { config, state: Mutex::new(ConnectionState::Open(Box::new(live))) })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteBackendConfig {
        &self.config
    }

    /// Returns the registered index table names in `(column, field)` order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend is closed or destroyed.
    pub fn index_tables(&self) -> Result<Vec<String>, StoreError> {
        self.with_live(&OpContext::background(), |live| Ok(live.catalog.values().cloned().collect()))
    }

    /// Runs `operation` on the live connection under the context's interrupt.
    fn with_live<T>(
        &self,
        ctx: &OpContext,
        operation: impl FnOnce(&mut LiveConnection) -> Result<T, SqliteBackendError>,
    ) -> Result<T, StoreError> {
        ctx.check()?;
        let mut guard = self
            .state
            .lock()
            .map_err(|_| StoreError::Store("sqlite backend mutex poisoned".to_string()))?;
        let live = match &mut *guard {
            ConnectionState::Open(live) => live,
            ConnectionState::Closed => {
                return Err(StoreError::Connection(
                    "sqlite connection closed; reset required".to_string(),
                ));
            }
            ConnectionState::Destroyed => return Err(StoreError::Destroyed),
        };
        let interrupt = AssertUnwindSafe(ctx.clone());
        live.connection
            .progress_handler(PROGRESS_HANDLER_STEPS, Some(move || interrupt.is_done()))
            .map_err(|error| StoreError::from(SqliteBackendError::from(error)))?;
        let result = operation(live);
        if let Err(error) =
            live.connection.progress_handler(PROGRESS_HANDLER_STEPS, None::<fn() -> bool>)
        {
            tracing::warn!(error = %error, "failed to clear sqlite progress handler");
        }
        result.map_err(|error| match error {
            SqliteBackendError::Interrupted => ctx.check().err().unwrap_or(StoreError::Cancelled),
            other => other.into(),
        })
    }

    /// Resolves index hits to latest cells with the configured strategy.
    fn resolve_hits(
        &self,
        connection: &Connection,
        column: &str,
        table: &str,
        field: &str,
        filter: IndexFilter<'_>,
    ) -> Result<Vec<Cell>, SqliteBackendError> {
        match self.config.index_resolution {
            IndexResolution::Join => index::latest_cells_joined(connection, column, table, field, filter),
            IndexResolution::PerRow => {
                index::latest_cells_per_row(connection, column, table, field, filter)
            }
        }
    }
}

impl StorageBackend for SqliteBackend {
    fn put_cell(&self, ctx: &OpContext, write: &CellWrite) -> Result<(), StoreError> {
        validate_column_name(&write.column_name)?;
        if write.body.len() > self.config.max_body_bytes {
            return Err(SqliteBackendError::TooLarge {
                max_bytes: self.config.max_body_bytes,
                actual_bytes: write.body.len(),
            }
            .into());
        }
        let document = decode_document(&write.body)?;
        let entries = write.index_entries(&document);
        self.with_live(ctx, |live| {
            let LiveConnection { connection, catalog } = live;
            let tx = connection.transaction()?;
            let newest: Option<i64> = tx.query_row(
                "SELECT MAX(ref_key) FROM cell WHERE row_key = ?1 AND column_name = ?2",
                params![write.row_key.as_bytes(), write.column_name],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO cell (row_key, column_name, ref_key, body, created_at) VALUES (?1, \
                 ?2, ?3, ?4, ?5)",
                params![
                    write.row_key.as_bytes(),
                    write.column_name,
                    write.ref_key,
                    write.body,
                    unix_millis()
                ],
            )
            .map_err(|err| match SqliteBackendError::from(err) {
                SqliteBackendError::Integrity(_) => SqliteBackendError::Integrity(format!(
                    "cell version {} already exists in column {}",
                    write.ref_key, write.column_name
                )),
                other => other,
            })?;
            let mut pending = IndexCatalog::new();
            if newest.is_none_or(|max| max < write.ref_key) {
                for (field, value) in &entries {
                    let table =
                        index::ensure_index(&tx, catalog, &mut pending, &write.column_name, field)?;
                    index::put_index(&tx, &table, field, &write.row_key, value)?;
                }
            }
            tx.commit()?;
            catalog.extend(pending);
            Ok(())
        })?;
        tracing::debug!(row_key = %write.row_key, column = %write.column_name, ref_key = write.ref_key, "stored cell");
        Ok(())
    }

    fn get_cell(
        &self,
        ctx: &OpContext,
        row_key: &RowKey,
        column: &str,
        ref_key: i64,
    ) -> Result<Option<Cell>, StoreError> {
        self.with_live(ctx, |live| {
            let sql = format!(
                "{CELL_SELECT} AS c WHERE c.row_key = ?1 AND c.column_name = ?2 AND c.ref_key = ?3"
            );
            Ok(live
                .connection
                .query_row(&sql, params![row_key.as_bytes(), column, ref_key], map_cell_row)
                .optional()?)
        })
    }

    fn get_cell_latest(
        &self,
        ctx: &OpContext,
        row_key: &RowKey,
        column: &str,
    ) -> Result<Option<Cell>, StoreError> {
        self.with_live(ctx, |live| latest_cell(&live.connection, row_key, column))
    }

    fn get_cells_by_column_latest(
        &self,
        ctx: &OpContext,
        column: &str,
    ) -> Result<Vec<Cell>, StoreError> {
        validate_column_name(column)?;
        self.with_live(ctx, |live| {
            let key = (column.to_string(), IDENTITY_FIELD.to_string());
            match live.catalog.get(&key) {
                Some(table) => self.resolve_hits(&live.connection, column, table, IDENTITY_FIELD, None),
                None => Ok(Vec::new()),
            }
        })
    }

    fn get_cells_by_field_latest(
        &self,
        ctx: &OpContext,
        query: &FieldQuery,
    ) -> Result<Vec<Cell>, StoreError> {
        validate_column_name(&query.column)?;
        validate_field_name(&query.field)?;
        self.with_live(ctx, |live| {
            let key = (query.column.clone(), query.field.clone());
            match live.catalog.get(&key) {
                Some(table) => self.resolve_hits(
                    &live.connection,
                    &query.column,
                    table,
                    &query.field,
                    Some((query.comparison, &query.value)),
                ),
                None => Ok(Vec::new()),
            }
        })
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
        self.with_live(ctx, |live| {
            let key = (column.to_string(), field.to_string());
            let Some(table) = live.catalog.get(&key) else {
                return Ok(None);
            };
            let row_keys = index::matching_row_keys(
                &live.connection,
                table,
                field,
                Some((Comparison::Equal, value)),
            )?;
            match row_keys.as_slice() {
                [] => Ok(None),
                [row_key] => latest_cell(&live.connection, row_key, column),
                many => Err(SqliteBackendError::Integrity(format!(
                    "{} rows share unique field {column}.{field}",
                    many.len()
                ))),
            }
        })
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
        self.with_live(ctx, |live| {
            let key = (column.to_string(), field.to_string());
            match live.catalog.get(&key) {
                Some(table) => index::value_exists(&live.connection, table, field, value),
                None => Ok(false),
            }
        })
    }

    fn partition_read(
        &self,
        ctx: &OpContext,
        read: &PartitionRead,
    ) -> Result<Vec<Cell>, StoreError> {
        read.validate()?;
        let limit = i64::try_from(read.limit)
            .map_err(|_| StoreError::InvalidInput("partition read limit too large".to_string()))?;
        let order = match read.location {
            PartitionLocation::AddedAt => "c.added_at",
            PartitionLocation::CreatedAt => "c.created_at",
        };
        self.with_live(ctx, |live| {
            let sql = format!(
                "{CELL_SELECT} AS c WHERE {order} > ?1 ORDER BY {order}, c.added_at LIMIT ?2"
            );
            let mut stmt = live.connection.prepare(&sql)?;
            let rows = stmt.query_map(params![read.after, limit], map_cell_row)?;
            let mut cells = Vec::new();
            for row in rows {
                cells.push(row?);
            }
            Ok(cells)
        })
    }

    fn reset_connection(&self, ctx: &OpContext) -> Result<(), StoreError> {
        ctx.check()?;
        let mut guard = self
            .state
            .lock()
            .map_err(|_| StoreError::Store("sqlite backend mutex poisoned".to_string()))?;
        if matches!(*guard, ConnectionState::Destroyed) {
            return Err(StoreError::Destroyed);
        }
        *guard = ConnectionState::Closed;
        match open_live(&self.config) {
            Ok(live) => {
                *guard = ConnectionState::Open(Box::new(live));
                tracing::info!(path = %self.config.path.display(), "sqlite connection reset");
                Ok(())
            }
            Err(error) => {
                tracing::warn!(path = %self.config.path.display(), error = %error, "sqlite connection reset failed");
                Err(match error {
                    SqliteBackendError::Db(message) => StoreError::Connection(message),
                    other => other.into(),
                })
            }
        }
    }

    fn destroy(&self, _ctx: &OpContext) -> Result<(), StoreError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| StoreError::Store("sqlite backend mutex poisoned".to_string()))?;
        let previous = std::mem::replace(&mut *guard, ConnectionState::Destroyed);
        drop(guard);
        match previous {
            ConnectionState::Destroyed => Ok(()),
            ConnectionState::Closed => {
                tracing::info!(path = %self.config.path.display(), "sqlite shard destroyed");
                Ok(())
            }
            ConnectionState::Open(live) => {
                let result = live
                    .connection
                    .close()
                    .map_err(|(_, err)| StoreError::from(SqliteBackendError::from(err)));
                tracing::info!(path = %self.config.path.display(), "sqlite shard destroyed");
                result
            }
        }
    }
}

// ============================================================================
// SECTION: Shared Queries
// ============================================================================

/// Maps a row selected with [`CELL_SELECT`] into a [`Cell`].
pub(crate) fn map_cell_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Cell> {
    Ok(Cell {
        row_key: RowKey::new(row.get::<_, Vec<u8>>(0)?),
        column_name: row.get(1)?,
        ref_key: row.get(2)?,
        body: row.get(3)?,
        added_at: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Loads the highest ref key version of a row.
pub(crate) fn latest_cell(
    connection: &Connection,
    row_key: &RowKey,
    column: &str,
) -> Result<Option<Cell>, SqliteBackendError> {
    let sql = format!(
        "{CELL_SELECT} AS c WHERE c.row_key = ?1 AND c.column_name = ?2 ORDER BY c.ref_key DESC \
         LIMIT 1"
    );
    Ok(connection.query_row(&sql, params![row_key.as_bytes(), column], map_cell_row).optional()?)
}

/// Returns the current unix epoch in milliseconds.
pub(crate) fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the database exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteBackendError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteBackendError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteBackendError::Io(err.to_string()))
}

/// Validates database paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteBackendError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteBackendError::Invalid("store path must not be empty".to_string()));
    }
    if path.display().to_string().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteBackendError::Invalid("store path exceeds length limit".to_string()));
    }
    if path.components().any(|component| component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH) {
        return Err(SqliteBackendError::Invalid(
            "store path contains an overlong component".to_string(),
        ));
    }
    if path.is_dir() {
        return Err(SqliteBackendError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens the connection, initializes the schema, and loads the catalog.
fn open_live(config: &SqliteBackendConfig) -> Result<LiveConnection, SqliteBackendError> {
    let mut connection = open_connection(config)?;
    initialize_schema(&mut connection)?;
    let catalog = index::load_catalog(&connection)?;
    Ok(LiveConnection { connection, catalog })
}

/// Opens an `SQLite` connection with the configured pragmas.
fn open_connection(config: &SqliteBackendConfig) -> Result<Connection, SqliteBackendError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)?;
    connection.execute_batch(&format!(
        "PRAGMA journal_mode = {}; PRAGMA synchronous = {};",
        config.journal_mode.pragma_value(),
        config.sync_mode.pragma_value()
    ))?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    Ok(connection)
}

/// Initializes the schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteBackendError> {
    let tx = connection.transaction()?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS cell (
                    added_at INTEGER PRIMARY KEY AUTOINCREMENT,
                    row_key BLOB NOT NULL,
                    column_name TEXT NOT NULL,
                    ref_key INTEGER NOT NULL,
                    body BLOB NOT NULL,
                    created_at INTEGER,
                    UNIQUE (row_key, column_name, ref_key)
                );
                CREATE INDEX IF NOT EXISTS idx_cell_created_at ON cell (created_at);
                CREATE TABLE IF NOT EXISTS index_catalog (
                    column_name TEXT NOT NULL,
                    field_name TEXT NOT NULL,
                    table_name TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    created_at INTEGER NOT NULL,
                    PRIMARY KEY (column_name, field_name)
                );",
            )?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteBackendError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit()?;
    Ok(())
}
