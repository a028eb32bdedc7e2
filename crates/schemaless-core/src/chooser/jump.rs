// crates/schemaless-core/src/chooser/jump.rs
// ============================================================================
// Module: Jump Hash Chooser
// Description: Jump consistent hashing over an xxh3 key digest.
// Purpose: Default chooser with minimal remapping when buckets are appended.
// Dependencies: xxhash-rust
// ============================================================================

//! ## Overview
//! Keys are hashed with `xxh3_64` (seed 0) and fed into the jump consistent
//! hash recurrence, which yields a position in `[0, n)`. Growing from `n` to
//! `n + 1` buckets moves about `1 / (n + 1)` of keys, all of them to the new
//! last bucket.

use xxhash_rust::xxh3::xxh3_64;

use super::Chooser;
use super::ChooserError;
use super::validate_buckets;

/// Key digest function.
pub type KeyHasher = fn(&[u8]) -> u64;

/// Multiplier of the jump hash linear congruential step.
const JUMP_MULTIPLIER: u64 = 2_862_933_555_777_941_757;

/// Jump consistent hash chooser.
#[derive(Debug, Clone)]
pub struct JumpHashChooser {
    /// Ordered bucket names.
    buckets: Vec<String>,
    /// Key digest.
    hasher: KeyHasher,
}

impl JumpHashChooser {
    /// Creates a chooser with no buckets and the `xxh3_64` digest.
    #[must_use]
    pub fn new() -> Self {
        Self::with_hasher(xxh3_64)
    }

    /// Creates a chooser with a custom key digest.
    #[must_use]
    pub fn with_hasher(hasher: KeyHasher) -> Self {
        Self { buckets: Vec::new(), hasher }
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

impl Default for JumpHashChooser {
    fn default() -> Self {
        Self::new()
    }
}

impl Chooser for JumpHashChooser {
    fn set_buckets(&mut self, buckets: Vec<String>) -> Result<(), ChooserError> {
        validate_buckets(&buckets)?;
        self.buckets = buckets;
        Ok(())
    }

    fn choose(&self, key: &[u8]) -> Result<&str, ChooserError> {
        if self.buckets.is_empty() {
            return Err(ChooserError::Empty);
        }
        let index = jump_consistent_hash((self.hasher)(key), self.buckets.len());
        self.buckets.get(index).map(String::as_str).ok_or(ChooserError::Empty)
    }

    fn buckets(&self) -> &[String] {
        &self.buckets
    }
}

/// Maps a 64-bit digest to a bucket index in `[0, buckets)`.
///
/// `buckets` must be non-zero.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "The recurrence is defined over floating point division."
)]
pub fn jump_consistent_hash(mut key: u64, buckets: usize) -> usize {
    let count = buckets as u64;
    let mut chosen: u64 = 0;
    let mut next: u64 = 0;
    while next < count {
        chosen = next;
        key = key.wrapping_mul(JUMP_MULTIPLIER).wrapping_add(1);
        next = ((chosen + 1) as f64 * ((1_u64 << 31) as f64 / ((key >> 33) + 1) as f64)) as u64;
    }
    chosen as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_bucket_always_wins() {
        for key in 0..1_000_u64 {
            assert_eq!(jump_consistent_hash(key, 1), 0);
        }
    }

    #[test]
    fn results_stay_in_range() {
        for key in 0..1_000_u64 {
            assert!(jump_consistent_hash(key.wrapping_mul(0x9e37_79b9), 7) < 7);
        }
    }

    #[test]
    fn empty_chooser_fails() {
        assert_eq!(JumpHashChooser::new().choose(b"k"), Err(ChooserError::Empty));
    }
}
