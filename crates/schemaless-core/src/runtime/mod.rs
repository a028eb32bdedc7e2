// crates/schemaless-core/src/runtime/mod.rs
// ============================================================================
// Module: Schemaless Runtime
// Description: KvStore router, fan-out results, and the in-memory backend.
// Purpose: Resolve shards per call and coordinate live topology migration.
// Dependencies: crate::{chooser, core, interfaces}, tracing
// ============================================================================

//! ## Overview
//! The runtime holds the [`KvStore`] router. Routing metadata is guarded by a
//! single lock that is released before any backend call, so slow shards
//! never stall routing for other keys.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod fanout;
pub mod kv_store;
pub mod memory;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use fanout::FanOut;
pub use fanout::ShardFailure;
pub use kv_store::KvStore;
pub use kv_store::MigrationState;
pub use kv_store::Shard;
pub use memory::InMemoryBackend;
