// crates/schemaless-core/src/lib.rs
// ============================================================================
// Module: Schemaless Core Library
// Description: Public API surface for the sharded schemaless cell store.
// Purpose: Expose the cell model, routing contracts, and the KvStore router.
// Dependencies: crate::{core, chooser, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Schemaless core stores immutable, versioned cells across a set of shards.
//! A [`Chooser`] maps row keys to shard names, every shard is a
//! [`StorageBackend`], and the [`KvStore`] router resolves shards per call and
//! coordinates live migration between two shard topologies. Backends are
//! plugged in through the backend contract; the in-memory backend in
//! [`runtime::memory`] exists for tests and demos.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod chooser;
pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use chooser::Chooser;
pub use chooser::ChooserError;
pub use chooser::JumpHashChooser;
pub use chooser::RendezvousChooser;
pub use interfaces::Comparison;
pub use interfaces::FieldQuery;
pub use interfaces::MAX_PARTITION_READ_LIMIT;
pub use interfaces::PartitionLocation;
pub use interfaces::PartitionRead;
pub use interfaces::StorageBackend;
pub use interfaces::StoreError;
pub use runtime::FanOut;
pub use runtime::InMemoryBackend;
pub use runtime::KvStore;
pub use runtime::MigrationState;
pub use runtime::Shard;
pub use runtime::ShardFailure;
