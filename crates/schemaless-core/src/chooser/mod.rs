// crates/schemaless-core/src/chooser/mod.rs
// ============================================================================
// Module: Chooser Contract
// Description: Deterministic mapping from row keys to shard names.
// Purpose: Let the router swap consistent-hashing strategies at construction.
// Dependencies: thiserror, xxhash-rust
// ============================================================================

//! ## Overview
//! A chooser owns an ordered bucket list and maps a key to one bucket name.
//! Choosing is a pure function of `(key, buckets)`. Bucket order matters to
//! positional algorithms such as jump hashing: append new buckets instead of
//! inserting them, because reordering remaps unrelated keys.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod jump;
pub mod rendezvous;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use thiserror::Error;

use crate::interfaces::StoreError;

pub use jump::JumpHashChooser;
pub use rendezvous::RendezvousChooser;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Chooser configuration and lookup errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChooserError {
    /// The bucket list is empty.
    #[error("chooser has no buckets")]
    Empty,
    /// A bucket name appears more than once.
    #[error("duplicate bucket: {0}")]
    DuplicateBucket(String),
}

impl From<ChooserError> for StoreError {
    fn from(err: ChooserError) -> Self {
        Self::Routing(err.to_string())
    }
}

// ============================================================================
// SECTION: Contract
// ============================================================================

/// Key to bucket mapping used by the router.
pub trait Chooser: Send + Sync {
    /// Replaces the bucket list.
    ///
    /// # Errors
    ///
    /// Returns [`ChooserError`] when the list is empty or has duplicates.
    fn set_buckets(&mut self, buckets: Vec<String>) -> Result<(), ChooserError>;

    /// Maps `key` to a bucket name.
    ///
    /// # Errors
    ///
    /// Returns [`ChooserError::Empty`] when no buckets are configured.
    fn choose(&self, key: &[u8]) -> Result<&str, ChooserError>;

    /// Returns the current bucket list in order.
    fn buckets(&self) -> &[String];
}

/// Rejects empty and duplicate bucket lists.
pub(crate) fn validate_buckets(buckets: &[String]) -> Result<(), ChooserError> {
    if buckets.is_empty() {
        return Err(ChooserError::Empty);
    }
    let mut seen = BTreeSet::new();
    for bucket in buckets {
        if !seen.insert(bucket.as_str()) {
            return Err(ChooserError::DuplicateBucket(bucket.clone()));
        }
    }
    Ok(())
}
