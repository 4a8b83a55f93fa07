//! Operation idempotency guard: each logical operation mutates the cache at
//! most once.
//!
//! A join that is reconciled after a timeout, or retried by a caller with the
//! same [`OperationId`], must not bump the cached total twice. Applying an id
//! a second time returns [`SidebetError::DuplicateOperation`].
//!
//! The guard is bounded; once full, the oldest id is forgotten so memory
//! stays flat in long-running processes.

use std::collections::{HashSet, VecDeque};

use sidebet_types::{OperationId, Result, SidebetError};

pub struct IdempotencyGuard {
    applied: HashSet<OperationId>,
    /// Insertion order, front = oldest.
    order: VecDeque<OperationId>,
    capacity: usize,
}

impl IdempotencyGuard {
    /// # Panics
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "IdempotencyGuard capacity must be > 0");
        Self {
            applied: HashSet::with_capacity(capacity.min(4096)),
            order: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    /// Record `op_id` as applied.
    ///
    /// # Errors
    /// [`SidebetError::DuplicateOperation`] if it was already recorded.
    pub fn mark_applied(&mut self, op_id: OperationId) -> Result<()> {
        if self.applied.contains(&op_id) {
            return Err(SidebetError::DuplicateOperation(op_id));
        }
        if self.applied.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.applied.remove(&oldest);
            }
        }
        self.applied.insert(op_id);
        self.order.push_back(op_id);
        Ok(())
    }

    pub fn is_applied(&self, op_id: &OperationId) -> bool {
        self.applied.contains(op_id)
    }

    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}
