//! Per-sender sequence numbers.
//!
//! Concurrent mutating calls from one sender must carry distinct, gap-free
//! nonces. The manager hands out a [`NonceLease`] per sender; the lease holds
//! that sender's slot exclusively from nonce selection until the transaction
//! is accepted (or refused) by the ledger. Different senders never contend.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use sidebet_types::Address;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<Option<u64>>>;

/// Tracks the next nonce for every sender the gateway has used.
#[derive(Debug, Default)]
pub struct NonceManager {
    slots: Mutex<HashMap<Address, Slot>>,
}

impl NonceManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `sender`'s counter.
    pub async fn lease(&self, sender: Address) -> NonceLease {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(sender).or_default())
        };
        NonceLease {
            sender,
            guard: slot.lock_owned().await,
        }
    }

    /// Next nonce the manager would hand out for `sender`, if it knows one.
    pub async fn peek(&self, sender: Address) -> Option<u64> {
        *self.lease(sender).await.guard
    }

    /// Forget `sender`'s counter; the next lease reseeds from the ledger.
    pub async fn invalidate(&self, sender: Address) {
        self.lease(sender).await.invalidate();
    }
}

/// Exclusive access to one sender's counter. Dropping the lease without
/// [`commit`](Self::commit) leaves the counter unchanged, so the nonce is
/// handed out again.
#[derive(Debug)]
pub struct NonceLease {
    sender: Address,
    guard: OwnedMutexGuard<Option<u64>>,
}

impl NonceLease {
    #[must_use]
    pub fn sender(&self) -> Address {
        self.sender
    }

    /// The next nonce, if the counter has been seeded.
    #[must_use]
    pub fn known(&self) -> Option<u64> {
        *self.guard
    }

    /// Seed an unknown counter from the ledger's pending count.
    pub fn seed(&mut self, next: u64) {
        if self.guard.is_none() {
            *self.guard = Some(next);
        }
    }

    /// `nonce` was accepted by the ledger.
    pub fn commit(self, nonce: u64) {
        let mut guard = self.guard;
        let next = nonce.saturating_add(1);
        *guard = Some(guard.map_or(next, |current| current.max(next)));
    }

    /// The ledger disagreed with the counter; reseed on next use.
    pub fn invalidate(self) {
        let mut guard = self.guard;
        *guard = None;
    }
}
