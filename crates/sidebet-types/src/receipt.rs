//! Receipt types.
//!
//! A [`TxReceipt`] proves that a ledger transaction was included and buried
//! under the configured confirmation depth. An [`OperationReceipt`] is what
//! the engine hands back to callers for each lifecycle operation.

use serde::{Deserialize, Serialize};

use crate::{Address, BetId, OperationId, TxHash};

/// Lifecycle operations accepted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Create,
    Join,
    Resolve,
    Claim,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Join => write!(f, "JOIN"),
            Self::Resolve => write!(f, "RESOLVE"),
            Self::Claim => write!(f, "CLAIM"),
        }
    }
}

/// Where a mutating operation was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Route {
    /// Submitted to the ledger and awaited to confirmation depth.
    Ledger,
    /// Applied to the local cache only.
    Rehearsal,
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ledger => write!(f, "LEDGER"),
            Self::Rehearsal => write!(f, "REHEARSAL"),
        }
    }
}

/// Receipt for a confirmed ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    /// Block the transaction was included in.
    pub block_number: u64,
    /// `false` when the ledger executed the call and reverted it.
    pub succeeded: bool,
    pub gas_used: u64,
    /// Set for instantiation transactions.
    pub contract_address: Option<Address>,
    /// Revert reason, when the ledger reports one.
    pub revert_reason: Option<String>,
    /// Confirmations observed when the gateway stopped waiting.
    pub confirmations: u64,
}

impl TxReceipt {
    /// Number of confirmations at `head`, counting the inclusion block.
    #[must_use]
    pub fn confirmations_at(&self, head: u64) -> u64 {
        head.checked_sub(self.block_number).map_or(0, |d| d + 1)
    }
}

/// Result of a join, resolve, or claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationReceipt {
    pub op_id: OperationId,
    pub operation: Operation,
    pub bet_id: BetId,
    pub route: Route,
    /// Hash of the confirming transaction, ledger route only. `None` when the
    /// outcome was established by a reconciling read.
    pub tx_hash: Option<TxHash>,
    /// `true` when a timed-out call was found to have landed.
    pub reconciled: bool,
}

impl OperationReceipt {
    #[must_use]
    pub fn rehearsed(op_id: OperationId, operation: Operation, bet_id: BetId) -> Self {
        Self {
            op_id,
            operation,
            bet_id,
            route: Route::Rehearsal,
            tx_hash: None,
            reconciled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt_at(block: u64) -> TxReceipt {
        TxReceipt {
            tx_hash: TxHash([1u8; 32]),
            block_number: block,
            succeeded: true,
            gas_used: 21_000,
            contract_address: None,
            revert_reason: None,
            confirmations: 0,
        }
    }

    #[test]
    fn confirmations_count_inclusion_block() {
        let r = receipt_at(100);
        assert_eq!(r.confirmations_at(99), 0);
        assert_eq!(r.confirmations_at(100), 1);
        assert_eq!(r.confirmations_at(102), 3);
    }

    #[test]
    fn operation_display() {
        assert_eq!(Operation::Join.to_string(), "JOIN");
        assert_eq!(Route::Rehearsal.to_string(), "REHEARSAL");
    }

    #[test]
    fn rehearsed_receipt_has_no_tx() {
        let r = OperationReceipt::rehearsed(OperationId::new(), Operation::Claim, Address::ZERO);
        assert_eq!(r.route, Route::Rehearsal);
        assert!(r.tx_hash.is_none());
        assert!(!r.reconciled);
    }
}
