// crates/schemaless-core/src/chooser/rendezvous.rs
// ============================================================================
// Module: Rendezvous Chooser
// Description: Highest-random-weight hashing over xxh3 scores.
// Purpose: Order-insensitive alternative to jump hashing.
// Dependencies: xxhash-rust
// ============================================================================

//! ## Overview
//! Each bucket scores a key with `xxh3_64_with_seed`, seeded by the digest of
//! the bucket name; the highest score wins and ties break on the name. Adding
//! or removing a bucket only moves the keys that bucket wins or loses, and
//! bucket order is irrelevant.

use xxhash_rust::xxh3::xxh3_64;
use xxhash_rust::xxh3::xxh3_64_with_seed;

use super::Chooser;
use super::ChooserError;
use super::validate_buckets;

/// Rendezvous (highest random weight) chooser.
#[derive(Debug, Clone, Default)]
pub struct RendezvousChooser {
    /// Ordered bucket names.
    buckets: Vec<String>,
    /// Per-bucket score seed, parallel to `buckets`.
    seeds: Vec<u64>,
}

impl RendezvousChooser {
    /// Creates a chooser with no buckets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a chooser already configured with `buckets`.
    ///
    /// # Errors
    ///
    /// Returns [`ChooserError`] when the bucket list is rejected.
    pub fn with_buckets(buckets: Vec<String>) -> Result<Self, ChooserError> {
        let mut chooser = Self::new();
        chooser.set_buckets(buckets)?;
        Ok(chooser)
    }
}

impl Chooser for RendezvousChooser {
    fn set_buckets(&mut self, buckets: Vec<String>) -> Result<(), ChooserError> {
        validate_buckets(&buckets)?;
        self.seeds = buckets.iter().map(|name| xxh3_64(name.as_bytes())).collect();
        self.buckets = buckets;
        Ok(())
    }

    fn choose(&self, key: &[u8]) -> Result<&str, ChooserError> {
        self.buckets
            .iter()
            .zip(&self.seeds)
            .map(|(name, seed)| (xxh3_64_with_seed(key, *seed), name.as_str()))
            .max()
            .map(|(_, name)| name)
            .ok_or(ChooserError::Empty)
    }

    fn buckets(&self) -> &[String] {
        &self.buckets
    }
}
