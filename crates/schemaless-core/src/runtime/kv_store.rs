// crates/schemaless-core/src/runtime/kv_store.rs
// ============================================================================
// Module: KvStore Router
// Description: Per-call shard resolution and live topology migration.
// Purpose: Route cell operations across shards while the shard set changes.
// Dependencies: crate::{chooser, core, interfaces}, tracing
// ============================================================================

//! ## Overview
//! [`KvStore`] always holds a primary topology (chooser plus shard map) and,
//! while migrating, a second migration topology.
//!
//! - Writes go to the migration topology only; there is no dual write.
//! - Single-row reads ask the migration side first and fall back to the
//!   primary side on a miss. Errors never trigger the fallback.
//! - Fan-out queries cover the primary topology only.
//!
//! Rows that exist only in the primary topology must be copied by a backfill
//! before [`KvStore::end_migration`], or they become unreachable.
//!
//! The routing lock guards metadata only. Every method copies the backend
//! handles it needs and releases the lock before calling a backend.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;

use crate::chooser::Chooser;
use crate::chooser::JumpHashChooser;
use crate::core::Cell;
use crate::core::CellWrite;
use crate::core::IndexValue;
use crate::core::OpContext;
use crate::core::RowKey;
use crate::core::validate_column_name;
use crate::core::validate_field_name;
use crate::interfaces::FieldQuery;
use crate::interfaces::PartitionRead;
use crate::interfaces::StorageBackend;
use crate::interfaces::StoreError;
use crate::runtime::fanout::FanOut;
use crate::runtime::fanout::ShardFailure;

/// Shared backend handle.
type Backend = Arc<dyn StorageBackend>;

// ============================================================================
// SECTION: Shards and State
// ============================================================================

/// Named backend registered with the router.
#[derive(Clone)]
pub struct Shard {
    /// Shard name, unique within a topology.
    pub name: String,
    /// Backend holding the shard's cells.
    pub backend: Backend,
}

impl Shard {
    /// Creates a shard.
    #[must_use]
    pub fn new(name: impl Into<String>, backend: Backend) -> Self {
        Self { name: name.into(), backend }
    }
}

impl fmt::Debug for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shard").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Router state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    /// One topology serves every call.
    Stable,
    /// A migration topology is in flight.
    Migrating,
}

/// Chooser plus the shard map it addresses.
struct Topology {
    /// Key to shard name mapping.
    chooser: Box<dyn Chooser>,
    /// Shard name to backend.
    shards: BTreeMap<String, Backend>,
}

impl Topology {
    /// Builds a topology whose buckets follow `shards` order.
    fn from_shards(mut chooser: Box<dyn Chooser>, shards: Vec<Shard>) -> Result<Self, StoreError> {
        chooser.set_buckets(shards.iter().map(|shard| shard.name.clone()).collect())?;
        let shards = shards.into_iter().map(|shard| (shard.name, shard.backend)).collect();
        Ok(Self { chooser, shards })
    }

    /// Returns the chosen shard name and its backend, if registered.
    fn lookup(&self, key: &[u8]) -> Result<(String, Option<Backend>), StoreError> {
        let name = self.chooser.choose(key)?;
        Ok((name.to_string(), self.shards.get(name).cloned()))
    }

    /// Returns the chosen shard, failing when it is not registered.
    fn resolve(&self, key: &[u8]) -> Result<(String, Backend), StoreError> {
        match self.lookup(key)? {
            (name, Some(backend)) => Ok((name, backend)),
            (name, None) => {
                Err(StoreError::Routing(format!("chooser selected unknown shard {name}")))
            }
        }
    }

    /// Copies every registered shard in name order.
    fn snapshot(&self) -> Vec<Shard> {
        self.shards
            .iter()
            .map(|(name, backend)| Shard::new(name.clone(), Arc::clone(backend)))
            .collect()
    }
}

/// Routing metadata guarded by the router lock.
struct RoutingState {
    /// Topology serving reads and fan-out queries.
    primary: Topology,
    /// Topology receiving writes while migrating.
    migration: Option<Topology>,
}

impl RoutingState {
    /// Topology addressed by writes and shard edits.
    fn addressed_mut(&mut self) -> &mut Topology {
        match self.migration.as_mut() {
            Some(migration) => migration,
            None => &mut self.primary,
        }
    }
}

// ============================================================================
// SECTION: KvStore
// ============================================================================

/// Sharded cell store router.
///
/// # Invariants
/// - At most one migration is in flight; starting another replaces it.
/// - The routing lock is never held across a backend call.
/// - Writes, shard edits, and migration transitions take the lock exclusively.
pub struct KvStore {
    /// Routing metadata.
    routing: RwLock<RoutingState>,
}

impl KvStore {
    /// Creates a router over `shards`, whose order becomes the bucket order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Routing`] when the shard list is empty or has
    /// duplicate names.
    pub fn new(chooser: Box<dyn Chooser>, shards: Vec<Shard>) -> Result<Self, StoreError> {
        let primary = Topology::from_shards(chooser, shards)?;
        Ok(Self { routing: RwLock::new(RoutingState { primary, migration: None }) })
    }

    /// Creates a router using [`JumpHashChooser`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Routing`] when the shard list is rejected.
    pub fn with_jump_hash(shards: Vec<Shard>) -> Result<Self, StoreError> {
        Self::new(Box::new(JumpHashChooser::new()), shards)
    }

    /// Returns whether a migration is in flight.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the routing lock is poisoned.
    pub fn migration_state(&self) -> Result<MigrationState, StoreError> {
        let routing = self.read_routing()?;
        Ok(if routing.migration.is_some() {
            MigrationState::Migrating
        } else {
            MigrationState::Stable
        })
    }

    /// Returns the primary topology's shard names in name order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the routing lock is poisoned.
    pub fn shard_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.read_routing()?.primary.shards.keys().cloned().collect())
    }

    /// Returns the primary chooser's bucket list.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the routing lock is poisoned.
    pub fn buckets(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.read_routing()?.primary.chooser.buckets().to_vec())
    }

    /// Returns the migration chooser's bucket list, if migrating.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the routing lock is poisoned.
    pub fn migration_buckets(&self) -> Result<Option<Vec<String>>, StoreError> {
        let routing = self.read_routing()?;
        Ok(routing.migration.as_ref().map(|migration| migration.chooser.buckets().to_vec()))
    }

    // ------------------------------------------------------------------------
    // Single-row operations
    // ------------------------------------------------------------------------

    /// Writes a cell to the addressed topology.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Routing`] when no shard resolves, or the backend
    /// error.
    pub fn put_cell(&self, ctx: &OpContext, write: &CellWrite) -> Result<(), StoreError> {
        ctx.check()?;
        let (shard, backend) = {
            let mut routing = self.write_routing()?;
            routing.addressed_mut().resolve(write.row_key.as_bytes())?
        };
        tracing::debug!(shard = %shard, row_key = %write.row_key, column = %write.column_name, "put cell");
        backend.put_cell(ctx, write)
    }

    /// Loads one exact version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] from routing or from the backend consulted.
    pub fn get_cell(
        &self,
        ctx: &OpContext,
        row_key: &RowKey,
        column: &str,
        ref_key: i64,
    ) -> Result<Option<Cell>, StoreError> {
        self.read_with_fallback(ctx, row_key, |backend| {
            backend.get_cell(ctx, row_key, column, ref_key)
        })
    }

    /// Loads the latest version of a row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] from routing or from the backend consulted.
    pub fn get_cell_latest(
        &self,
        ctx: &OpContext,
        row_key: &RowKey,
        column: &str,
    ) -> Result<Option<Cell>, StoreError> {
        self.read_with_fallback(ctx, row_key, |backend| {
            backend.get_cell_latest(ctx, row_key, column)
        })
    }

    /// Runs a single-row read on the migration side, then on the primary
    /// side when the migration side misses.
    fn read_with_fallback<T>(
        &self,
        ctx: &OpContext,
        row_key: &RowKey,
        read: impl Fn(&dyn StorageBackend) -> Result<Option<T>, StoreError>,
    ) -> Result<Option<T>, StoreError> {
        ctx.check()?;
        let (migration, primary) = {
            let routing = self.read_routing()?;
            let migration = match routing.migration.as_ref() {
                Some(topology) => Some(topology.lookup(row_key.as_bytes())?),
                None => None,
            };
            (migration, routing.primary.resolve(row_key.as_bytes()))
        };
        if let Some((shard, backend)) = migration {
            match backend {
                Some(backend) => {
                    if let Some(found) = read(backend.as_ref())? {
                        return Ok(Some(found));
                    }
                    tracing::debug!(shard = %shard, row_key = %row_key, "migration miss, reading primary");
                }
                None => {
                    tracing::debug!(shard = %shard, "migration shard not registered, reading primary");
                }
            }
        }
        let (_, backend) = primary?;
        read(backend.as_ref())
    }

    // ------------------------------------------------------------------------
    // Fan-out queries (primary topology only)
    // ------------------------------------------------------------------------

    /// Loads the latest cell of every row in `column` across the primary
    /// shards, ordered by row key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] for a bad column name or the
    /// context error once the context is done. Shard failures are reported in
    /// the returned [`FanOut`].
    pub fn get_cells_by_column_latest(
        &self,
        ctx: &OpContext,
        column: &str,
    ) -> Result<FanOut<Vec<Cell>>, StoreError> {
        validate_column_name(column)?;
        let fan_out = self.fan_out(ctx, |backend| backend.get_cells_by_column_latest(ctx, column))?;
        Ok(fan_out.map(merge_latest))
    }

    /// Loads the latest cell of every row matching `query` across the
    /// primary shards, ordered by row key.
    ///
    /// # Errors
    ///
    /// Returns the context error once the context is done. Shard failures are
    /// reported in the returned [`FanOut`].
    pub fn get_cells_by_field_latest(
        &self,
        ctx: &OpContext,
        query: &FieldQuery,
    ) -> Result<FanOut<Vec<Cell>>, StoreError> {
        let fan_out = self.fan_out(ctx, |backend| backend.get_cells_by_field_latest(ctx, query))?;
        Ok(fan_out.map(merge_latest))
    }

    /// Loads the single row whose `field` equals `value` across the primary
    /// shards.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IntegrityViolation`] when more than one row
    /// matches anywhere or any shard reports a violation.
    pub fn get_cell_by_unique_field_latest(
        &self,
        ctx: &OpContext,
        column: &str,
        field: &str,
        value: &IndexValue,
    ) -> Result<FanOut<Option<Cell>>, StoreError> {
        validate_column_name(column)?;
        validate_field_name(field)?;
        let fan_out = self.fan_out(ctx, |backend| {
            backend.get_cell_by_unique_field_latest(ctx, column, field, value)
        })?;
        if let Some(failure) = fan_out
            .failures
            .iter()
            .find(|failure| matches!(failure.error, StoreError::IntegrityViolation(_)))
        {
            return Err(failure.error.clone());
        }
        let mut merged = merge_latest(vec![fan_out.value.into_iter().flatten().collect()]);
        if merged.len() > 1 {
            return Err(StoreError::IntegrityViolation(format!(
                "{} rows across shards share unique field {column}.{field}",
                merged.len()
            )));
        }
        Ok(FanOut { value: merged.pop(), failures: fan_out.failures })
    }

    /// Returns true when any primary shard holds a row whose `field` equals
    /// `value`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] for bad identifiers or the context
    /// error once the context is done.
    pub fn check_value_exist(
        &self,
        ctx: &OpContext,
        column: &str,
        field: &str,
        value: &IndexValue,
    ) -> Result<FanOut<bool>, StoreError> {
        validate_column_name(column)?;
        validate_field_name(field)?;
        let fan_out =
            self.fan_out(ctx, |backend| backend.check_value_exist(ctx, column, field, value))?;
        Ok(fan_out.map(|found| found.into_iter().any(|exists| exists)))
    }

    /// Runs `query` on every primary shard, collecting successes and
    /// failures.
    fn fan_out<T>(
        &self,
        ctx: &OpContext,
        query: impl Fn(&dyn StorageBackend) -> Result<T, StoreError>,
    ) -> Result<FanOut<Vec<T>>, StoreError> {
        let shards = self.read_routing()?.primary.snapshot();
        let mut value = Vec::with_capacity(shards.len());
        let mut failures = Vec::new();
        for shard in shards {
            ctx.check()?;
            match query(shard.backend.as_ref()) {
                Ok(result) => value.push(result),
                Err(error) => {
                    tracing::warn!(shard = %shard.name, error = %error, "shard query failed");
                    failures.push(ShardFailure { shard: shard.name, error });
                }
            }
        }
        Ok(FanOut { value, failures })
    }

    // ------------------------------------------------------------------------
    // Partition reads and lifecycle
    // ------------------------------------------------------------------------

    /// Scans the shard at bucket position `partition`.
    ///
    /// While migrating, the migration bucket list is used when that bucket
    /// has a registered migration backend.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Routing`] when `partition` is out of range or
    /// names an unregistered shard.
    pub fn partition_read(
        &self,
        ctx: &OpContext,
        partition: usize,
        read: &PartitionRead,
    ) -> Result<Vec<Cell>, StoreError> {
        ctx.check()?;
        let (shard, backend) = {
            let routing = self.read_routing()?;
            let migration = routing.migration.as_ref().and_then(|topology| {
                let name = topology.chooser.buckets().get(partition)?;
                topology.shards.get(name).map(|backend| (name.clone(), Arc::clone(backend)))
            });
            match migration {
                Some(found) => found,
                None => {
                    let primary = &routing.primary;
                    let name = primary.chooser.buckets().get(partition).ok_or_else(|| {
                        StoreError::Routing(format!("partition {partition} is out of range"))
                    })?;
                    let backend = primary.shards.get(name).ok_or_else(|| {
                        StoreError::Routing(format!("partition {partition} names unknown shard {name}"))
                    })?;
                    (name.clone(), Arc::clone(backend))
                }
            }
        };
        tracing::debug!(shard = %shard, partition, limit = read.limit, "partition read");
        backend.partition_read(ctx, read)
    }

    /// Resets the connections serving `row_key`, migration side first.
    ///
    /// # Errors
    ///
    /// Returns the first reset failure.
    pub fn reset_connection(&self, ctx: &OpContext, row_key: &RowKey) -> Result<(), StoreError> {
        ctx.check()?;
        let (migration, primary) = {
            let routing = self.read_routing()?;
            let migration = match routing.migration.as_ref() {
                Some(topology) => topology.lookup(row_key.as_bytes())?.1,
                None => None,
            };
            (migration, routing.primary.resolve(row_key.as_bytes())?)
        };
        if let Some(backend) = migration {
            backend.reset_connection(ctx)?;
        }
        let (shard, backend) = primary;
        tracing::info!(shard = %shard, "resetting shard connection");
        backend.reset_connection(ctx)
    }

    /// Destroys every distinct backend in both topologies once.
    ///
    /// # Errors
    ///
    /// Returns the first destroy failure after attempting every backend.
    pub fn destroy(&self, ctx: &OpContext) -> Result<(), StoreError> {
        let shards = {
            let routing = self.read_routing()?;
            let mut shards = routing.primary.snapshot();
            if let Some(migration) = routing.migration.as_ref() {
                shards.extend(migration.snapshot());
            }
            shards
        };
        let mut destroyed: Vec<Backend> = Vec::new();
        let mut first_error = None;
        for shard in shards {
            if destroyed.iter().any(|seen| Arc::ptr_eq(seen, &shard.backend)) {
                continue;
            }
            if let Err(error) = shard.backend.destroy(ctx) {
                tracing::warn!(shard = %shard.name, error = %error, "shard destroy failed");
                first_error.get_or_insert(error);
            }
            destroyed.push(shard.backend);
        }
        first_error.map_or(Ok(()), Err)
    }

    // ------------------------------------------------------------------------
    // Shard map and migration
    // ------------------------------------------------------------------------

    /// Registers a backend in the addressed shard map.
    ///
    /// The addressed map is the migration map while migrating, else the
    /// primary map. Choosers are not changed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the routing lock is poisoned.
    pub fn add_shard(&self, shard: Shard) -> Result<Option<Backend>, StoreError> {
        let mut routing = self.write_routing()?;
        tracing::info!(shard = %shard.name, "adding shard");
        Ok(routing.addressed_mut().shards.insert(shard.name, shard.backend))
    }

    /// Removes a backend from the addressed shard map.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the routing lock is poisoned.
    pub fn delete_shard(&self, name: &str) -> Result<Option<Backend>, StoreError> {
        let mut routing = self.write_routing()?;
        tracing::info!(shard = %name, "deleting shard");
        Ok(routing.addressed_mut().shards.remove(name))
    }

    /// Starts a migration to `chooser` over the backends already registered
    /// in the primary topology.
    ///
    /// `chooser` must already hold its bucket list.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Routing`] when the chooser has no buckets or a
    /// bucket names an unregistered shard.
    pub fn begin_migration(&self, chooser: Box<dyn Chooser>) -> Result<(), StoreError> {
        let bucket_count = chooser.buckets().len();
        let mut routing = self.write_routing()?;
        if bucket_count == 0 {
            return Err(StoreError::Routing("migration chooser has no buckets".to_string()));
        }
        if let Some(unknown) =
            chooser.buckets().iter().find(|bucket| !routing.primary.shards.contains_key(*bucket))
        {
            return Err(StoreError::Routing(format!("migration bucket {unknown} is not a known shard")));
        }
        let shards = routing.primary.shards.clone();
        let replaced = routing.migration.replace(Topology { chooser, shards }).is_some();
        tracing::info!(replaced, buckets = bucket_count, "migration started");
        Ok(())
    }

    /// Starts a migration to a new shard set; bucket order follows `shards`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Routing`] when the shard list is rejected.
    pub fn begin_migration_with_shards(
        &self,
        chooser: Box<dyn Chooser>,
        shards: Vec<Shard>,
    ) -> Result<(), StoreError> {
        let topology = Topology::from_shards(chooser, shards)?;
        let bucket_count = topology.chooser.buckets().len();
        let mut routing = self.write_routing()?;
        let replaced = routing.migration.replace(topology).is_some();
        tracing::info!(replaced, buckets = bucket_count, "migration with new shards started");
        Ok(())
    }

    /// Promotes the migration topology to primary.
    ///
    /// Returns the retired primary shards that the new primary no longer
    /// references; closing them is up to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Routing`] when no migration is in flight.
    pub fn end_migration(&self) -> Result<Vec<Shard>, StoreError> {
        let mut routing = self.write_routing()?;
        let migration = routing
            .migration
            .take()
            .ok_or_else(|| StoreError::Routing("no migration in flight".to_string()))?;
        let retired = std::mem::replace(&mut routing.primary, migration);
        let kept: Vec<&Backend> = routing.primary.shards.values().collect();
        let retired: Vec<Shard> = retired
            .snapshot()
            .into_iter()
            .filter(|shard| !kept.iter().any(|backend| Arc::ptr_eq(backend, &shard.backend)))
            .collect();
        tracing::info!(retired = retired.len(), "migration ended");
        Ok(retired)
    }

    /// Acquires the routing lock for reading.
    fn read_routing(&self) -> Result<RwLockReadGuard<'_, RoutingState>, StoreError> {
        self.routing
            .read()
            .map_err(|_| StoreError::Store("kv store routing lock poisoned".to_string()))
    }

    /// Acquires the routing lock for writing.
    fn write_routing(&self) -> Result<RwLockWriteGuard<'_, RoutingState>, StoreError> {
        self.routing
            .write()
            .map_err(|_| StoreError::Store("kv store routing lock poisoned".to_string()))
    }
}

/// Merges per-shard results by row key, keeping the highest ref key, and
/// orders them by row key.
fn merge_latest(per_shard: Vec<Vec<Cell>>) -> Vec<Cell> {
    let mut merged: BTreeMap<RowKey, Cell> = BTreeMap::new();
    for cell in per_shard.into_iter().flatten() {
        match merged.get(&cell.row_key) {
            Some(existing) if existing.ref_key >= cell.ref_key => {}
            _ => {
                merged.insert(cell.row_key.clone(), cell);
            }
        }
    }
    merged.into_values().collect()
}
