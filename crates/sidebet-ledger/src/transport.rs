//! The seam between the gateway and a concrete ledger.

use std::sync::Arc;

use async_trait::async_trait;
use sidebet_types::{Address, Result, TxHash, TxReceipt};

use crate::call::{ReadCall, ReadValue, TxRequest};

/// Raw ledger access. Implementations translate these calls into their wire
/// protocol and map failures onto the gateway error kinds:
///
/// - unreachable / refused before reaching the pool → `LedgerUnavailable`
/// - sent, but the answer was lost → `SubmissionUncertain`
/// - sequence number mismatch → `NonceConflict`
/// - executed and rejected (reads) → `CallReverted`
#[async_trait]
pub trait LedgerTransport: Send + Sync {
    /// Network identity of the connected ledger.
    async fn chain_id(&self) -> Result<u64>;

    /// Height of the latest block.
    async fn block_number(&self) -> Result<u64>;

    /// The node's current gas price quote.
    async fn gas_price(&self) -> Result<u128>;

    /// Next sequence number for `sender`, counting pooled transactions.
    async fn pending_nonce(&self, sender: &Address) -> Result<u64>;

    /// Hand a transaction to the ledger. Returns once it is accepted into
    /// the pool, not when it is included.
    async fn submit(&self, tx: &TxRequest) -> Result<TxHash>;

    /// Receipt of an included transaction, `None` while pending or unknown.
    async fn receipt(&self, tx_hash: &TxHash) -> Result<Option<TxReceipt>>;

    /// Execute a read-only accessor against the latest state.
    async fn read(&self, at: &Address, call: &ReadCall) -> Result<ReadValue>;
}

/// Lets several gateways, or a gateway and a test harness, share one ledger.
#[async_trait]
impl<T: LedgerTransport + ?Sized> LedgerTransport for Arc<T> {
    async fn chain_id(&self) -> Result<u64> {
        (**self).chain_id().await
    }

    async fn block_number(&self) -> Result<u64> {
        (**self).block_number().await
    }

    async fn gas_price(&self) -> Result<u128> {
        (**self).gas_price().await
    }

    async fn pending_nonce(&self, sender: &Address) -> Result<u64> {
        (**self).pending_nonce(sender).await
    }

    async fn submit(&self, tx: &TxRequest) -> Result<TxHash> {
        (**self).submit(tx).await
    }

    async fn receipt(&self, tx_hash: &TxHash) -> Result<Option<TxReceipt>> {
        (**self).receipt(tx_hash).await
    }

    async fn read(&self, at: &Address, call: &ReadCall) -> Result<ReadValue> {
        (**self).read(at, call).await
    }
}
