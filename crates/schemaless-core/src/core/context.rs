// crates/schemaless-core/src/core/context.rs
// ============================================================================
// Module: Operation Context
// Description: Caller-supplied deadline and cancellation signal.
// Purpose: Let every router and backend call abort promptly on request.
// Dependencies: tokio-util
// ============================================================================

//! ## Overview
//! Every operation takes an [`OpContext`]. The router imposes no timeout of
//! its own; backends poll [`OpContext::check`] between steps and may hook
//! [`OpContext::is_done`] into their I/O layer to interrupt running work.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Context
// ============================================================================

/// Deadline and cancellation carried by every call.
///
/// # Invariants
/// - Cloned contexts share the same cancellation token.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    /// Absolute deadline, if any.
    deadline: Option<Instant>,
    /// Cancellation signal shared with the caller.
    cancel: CancellationToken,
}

impl OpContext {
    /// Returns a context with no deadline and a fresh token.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Returns a context that expires after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            cancel: CancellationToken::new(),
        }
    }

    /// Returns a copy of this context with an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Returns a copy of this context bound to `token`.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Returns the cancellation token.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancels the context and every clone of it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns the configured deadline.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the time left before the deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns true once the context is cancelled or expired.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Fails when the context is cancelled or expired.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cancelled`] or [`StoreError::DeadlineExceeded`].
    pub fn check(&self) -> Result<(), StoreError> {
        if self.cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(StoreError::DeadlineExceeded);
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
