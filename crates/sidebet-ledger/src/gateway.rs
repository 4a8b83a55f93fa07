//! The gateway: submit, sequence, and await ledger transactions.

use async_trait::async_trait;
use sidebet_types::{
    Address, BetSnapshot, LedgerConfig, Participation, Result, SidebetError, TxHash, TxReceipt,
};
use tokio::time::Instant;

use crate::call::{CallOptions, ConstructorArgs, ContractCall, ReadCall, ReadValue, TxRequest};
use crate::nonce::NonceManager;
use crate::transport::LedgerTransport;

/// What the engine needs from the ledger.
///
/// Mutating calls resolve only once the transaction is buried under the
/// configured confirmation depth. A submitted call that does not get there
/// in time fails with `LedgerTimeout`, and one whose submission answer was
/// lost fails with `SubmissionUncertain`; either way its outcome is unknown.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Identity of the connected network.
    async fn network_id(&self) -> Result<u64>;

    /// Instantiate a settlement contract and return its address.
    async fn deploy(&self, from: Address, args: ConstructorArgs) -> Result<Address>;

    /// Submit `call` to the contract at `to` and wait for confirmation.
    async fn call(
        &self,
        from: Address,
        to: Address,
        call: ContractCall,
        opts: CallOptions,
    ) -> Result<TxReceipt>;

    /// Non-mutating accessor.
    async fn read(&self, at: Address, call: ReadCall) -> Result<ReadValue>;

    async fn bet_details(&self, bet: Address) -> Result<BetSnapshot> {
        match self.read(bet, ReadCall::BetDetails).await? {
            ReadValue::BetDetails(snapshot) => Ok(snapshot),
            other => Err(unexpected("getBetDetails", &other)),
        }
    }

    async fn participation(&self, bet: Address, participant: Address) -> Result<Participation> {
        match self
            .read(bet, ReadCall::Participation { participant })
            .await?
        {
            ReadValue::Participation(p) => Ok(p),
            other => Err(unexpected("getParticipation", &other)),
        }
    }

    async fn allowance(&self, asset: Address, owner: Address, spender: Address) -> Result<u128> {
        match self
            .read(asset, ReadCall::Allowance { owner, spender })
            .await?
        {
            ReadValue::Amount(v) => Ok(v),
            other => Err(unexpected("allowance", &other)),
        }
    }
}

fn unexpected(method: &str, value: &ReadValue) -> SidebetError {
    SidebetError::AbiDecode(format!("{method} returned unexpected value {value:?}"))
}

/// [`LedgerGateway`] over any [`LedgerTransport`].
pub struct Gateway<T> {
    transport: T,
    config: LedgerConfig,
    nonces: NonceManager,
}

impl<T: LedgerTransport> Gateway<T> {
    pub fn new(transport: T, config: LedgerConfig) -> Self {
        Self {
            transport,
            config,
            nonces: NonceManager::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn bump(&self, price: u128) -> u128 {
        price.saturating_mul(u128::from(self.config.gas_price_bump_pct)) / 100
    }

    /// Sequence, price, and submit one transaction, then wait for it.
    async fn send(
        &self,
        from: Address,
        to: Option<Address>,
        call: ContractCall,
        opts: CallOptions,
    ) -> Result<TxReceipt> {
        let gas_limit = call.gas_limit(&self.config.gas);
        let mut gas_price = self.bump(self.transport.gas_price().await?);
        if opts.nonce.is_some() {
            // replacing a pooled tx needs a strictly higher price
            gas_price = self.bump(gas_price);
        }
        let method = call.method();

        let (tx_hash, nonce) = {
            let mut lease = self.nonces.lease(from).await;
            let nonce = match opts.nonce.or(lease.known()) {
                Some(n) => n,
                None => {
                    let n = self.transport.pending_nonce(&from).await?;
                    lease.seed(n);
                    n
                }
            };
            let tx = TxRequest {
                from,
                to,
                call,
                gas_limit,
                gas_price,
                nonce,
            };
            match self.transport.submit(&tx).await {
                Ok(hash) => {
                    lease.commit(nonce);
                    (hash, nonce)
                }
                Err(err @ SidebetError::NonceConflict { .. }) => {
                    tracing::warn!(sender = %from, nonce, method, "Nonce rejected; reseeding");
                    lease.invalidate();
                    return Err(err);
                }
                Err(err @ SidebetError::SubmissionUncertain { .. }) => {
                    // the transaction may be pooled; never hand its nonce out again
                    tracing::warn!(sender = %from, nonce, method, error = %err, "Submission outcome unknown");
                    lease.commit(nonce);
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
        };

        tracing::debug!(
            tx = %tx_hash,
            sender = %from,
            nonce,
            gas_limit,
            gas_price,
            method,
            "Transaction submitted"
        );

        self.await_confirmation(tx_hash, nonce).await
    }

    /// Poll until `tx_hash` is buried `confirmations` deep, reverted, or the
    /// budget runs out. Transport hiccups while polling are not fatal.
    async fn await_confirmation(&self, tx_hash: TxHash, nonce: u64) -> Result<TxReceipt> {
        let started = Instant::now();
        let deadline = started + self.config.confirmation_timeout;
        let wanted = self.config.confirmations;

        loop {
            match self.transport.receipt(&tx_hash).await {
                Ok(Some(mut receipt)) => {
                    if !receipt.succeeded {
                        let reason = receipt
                            .revert_reason
                            .unwrap_or_else(|| "execution reverted".to_string());
                        tracing::warn!(tx = %tx_hash, %reason, "Transaction reverted");
                        return Err(SidebetError::CallReverted { reason });
                    }
                    match self.transport.block_number().await {
                        Ok(head) => {
                            let seen = receipt.confirmations_at(head);
                            if seen >= wanted {
                                receipt.confirmations = seen;
                                tracing::info!(
                                    tx = %tx_hash,
                                    block = receipt.block_number,
                                    confirmations = seen,
                                    gas_used = receipt.gas_used,
                                    "Transaction confirmed"
                                );
                                return Ok(receipt);
                            }
                        }
                        Err(err) => tracing::debug!(tx = %tx_hash, error = %err, "Head poll failed"),
                    }
                }
                Ok(None) => {}
                Err(err) => tracing::debug!(tx = %tx_hash, error = %err, "Receipt poll failed"),
            }

            let now = Instant::now();
            if now >= deadline {
                let waited_ms = u64::try_from(now.duration_since(started).as_millis())
                    .unwrap_or(u64::MAX);
                tracing::warn!(tx = %tx_hash, nonce, waited_ms, "Confirmation timed out");
                return Err(SidebetError::LedgerTimeout {
                    tx_hash,
                    nonce,
                    waited_ms,
                });
            }
            tokio::time::sleep(self.config.poll_interval.min(deadline - now)).await;
        }
    }
}

#[async_trait]
impl<T: LedgerTransport> LedgerGateway for Gateway<T> {
    async fn network_id(&self) -> Result<u64> {
        self.transport.chain_id().await
    }

    async fn deploy(&self, from: Address, args: ConstructorArgs) -> Result<Address> {
        let title = args.title.clone();
        let receipt = self
            .send(from, None, ContractCall::Instantiate(args), CallOptions::default())
            .await?;
        let address = receipt.contract_address.ok_or_else(|| {
            SidebetError::unavailable(format!(
                "instantiation {} confirmed without a contract address",
                receipt.tx_hash
            ))
        })?;
        tracing::info!(contract = %address, creator = %from, %title, "Settlement contract deployed");
        Ok(address)
    }

    async fn call(
        &self,
        from: Address,
        to: Address,
        call: ContractCall,
        opts: CallOptions,
    ) -> Result<TxReceipt> {
        self.send(from, Some(to), call, opts).await
    }

    async fn read(&self, at: Address, call: ReadCall) -> Result<ReadValue> {
        self.transport.read(&at, &call).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config() -> LedgerConfig {
        LedgerConfig {
            confirmations: 2,
            confirmation_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(10),
            ..LedgerConfig::default()
        }
    }

    #[test]
    fn gas_price_bump() {
        let gw = Gateway::new(crate::SimulatedLedger::new(1), config());
        assert_eq!(gw.bump(100), 120);
        assert_eq!(gw.bump(u128::MAX), u128::MAX / 100);
    }
}
