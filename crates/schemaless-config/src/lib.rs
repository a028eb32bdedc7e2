// crates/schemaless-config/src/lib.rs
// ============================================================================
// Module: Schemaless Config
// Description: Configuration model and store assembly.
// Purpose: Turn a TOML file into a validated, ready-to-use router.
// Dependencies: schemaless-core, schemaless-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! [`SchemalessConfig`] is loaded from TOML with strict size and path limits,
//! validated fail-closed, and then used to open one `SQLite` shard per
//! `[[shards]]` entry behind a [`schemaless_core::KvStore`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ChooserAlgorithm;
pub use config::ChooserConfig;
pub use config::ConfigError;
pub use config::IndexConfig;
pub use config::LoggingConfig;
pub use config::SchemalessConfig;
pub use config::ShardConfig;
