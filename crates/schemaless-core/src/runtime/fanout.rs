// crates/schemaless-core/src/runtime/fanout.rs
// ============================================================================
// Module: Fan-Out Results
// Description: Partial-success results for queries spanning every shard.
// Purpose: Keep per-shard failures next to the results other shards produced.
// Dependencies: crate::interfaces
// ============================================================================

//! ## Overview
//! A failing shard never discards what the other shards returned. Callers
//! use [`FanOut::is_complete`] to tell "some shards failed" apart from "all
//! shards were empty", or [`FanOut::into_result`] for all-or-nothing handling.

use crate::interfaces::StoreError;

/// One shard's failure during a fan-out query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardFailure {
    /// Shard name.
    pub shard: String,
    /// Error reported by the shard.
    pub error: StoreError,
}

/// Merged fan-out value plus the shards that failed.
#[derive(Debug, Clone, PartialEq)]
pub struct FanOut<T> {
    /// Value merged from every shard that answered.
    pub value: T,
    /// Shards that failed, in topology order.
    pub failures: Vec<ShardFailure>,
}

impl<T> FanOut<T> {
    /// Returns true when every shard answered.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns the value, or the first shard failure.
    ///
    /// # Errors
    ///
    /// Returns the first failing shard's error.
    pub fn into_result(self) -> Result<T, StoreError> {
        match self.failures.into_iter().next() {
            Some(failure) => Err(failure.error),
            None => Ok(self.value),
        }
    }

    /// Maps the merged value, keeping the failures.
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FanOut<U> {
        FanOut { value: f(self.value), failures: self.failures }
    }
}
