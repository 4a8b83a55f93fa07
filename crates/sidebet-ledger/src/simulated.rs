//! In-process ledger for tests and rehearsals.
//!
//! Executes the settlement contract and the fungible asset with the same
//! rules the deployed contracts enforce, mines one block per transaction,
//! and tracks per-sender nonces like a real pool. Faults can be injected to
//! exercise the gateway's timeout and reconciliation paths.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use sidebet_types::{
    Address, BetSnapshot, BetStatus, Participation, Result, SidebetError, TxHash, TxReceipt,
    constants,
};

use crate::call::{ContractCall, ReadCall, ReadValue, TxRequest};
use crate::transport::LedgerTransport;

/// Gas each entry point actually consumes.
const DEPLOY_COST: u64 = 1_500_000;
const APPROVE_COST: u64 = 46_000;
const JOIN_COST: u64 = 150_000;
const RESOLVE_COST: u64 = 60_000;
const CLAIM_COST: u64 = 80_000;

const BASE_GAS_PRICE: u128 = 50_000_000_000;

/// A one-shot fault applied to the next submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Refuse the submission.
    Unavailable,
    /// Accept into the pool but never mine it, until released or replaced.
    Withhold,
    /// Mine it, but never report its receipt.
    HideReceipt,
    /// Mine it, but lose the answer to the submission.
    LoseResponse,
}

#[derive(Debug, Clone)]
struct Pending {
    tx: TxRequest,
    hash: TxHash,
}

#[derive(Debug, Clone, Copy, Default)]
struct Stake {
    option_index: u64,
    amount: u128,
    claimed: bool,
}

#[derive(Debug)]
struct BetContract {
    owner: Address,
    title: String,
    options: Vec<String>,
    asset: Address,
    total: u128,
    status: BetStatus,
    winner: u64,
    pools: Vec<u128>,
    stakes: HashMap<Address, Stake>,
}

impl BetContract {
    fn snapshot(&self) -> BetSnapshot {
        BetSnapshot {
            title: self.title.clone(),
            options: self.options.clone(),
            total_amount: self.total,
            status: self.status,
            winner_option_index: self.winner,
        }
    }
}

type Revert = String;

#[derive(Debug)]
struct State {
    chain_id: u64,
    head: u64,
    offline: bool,
    faults: VecDeque<Fault>,
    /// Next nonce each sender must use to be mined.
    accounts: HashMap<Address, u64>,
    withheld: BTreeMap<(Address, u64), Pending>,
    queued: BTreeMap<(Address, u64), Pending>,
    receipts: HashMap<TxHash, TxReceipt>,
    hidden: HashSet<TxHash>,
    bets: HashMap<Address, BetContract>,
    balances: HashMap<(Address, Address), u128>,
    allowances: HashMap<(Address, Address, Address), u128>,
    submissions: usize,
    native: Address,
}

fn tx_hash(tx: &TxRequest) -> TxHash {
    let mut h = Sha256::new();
    h.update(b"sidebet:tx");
    h.update(tx.from.as_bytes());
    h.update(tx.nonce.to_be_bytes());
    h.update(tx.gas_price.to_be_bytes());
    if let Some(to) = tx.to {
        h.update(to.as_bytes());
    }
    h.update(tx.call.calldata());
    TxHash(h.finalize().into())
}

fn contract_address(from: Address, nonce: u64) -> Address {
    let mut h = Sha256::new();
    h.update(b"sidebet:create");
    h.update(from.as_bytes());
    h.update(nonce.to_be_bytes());
    let digest = h.finalize();
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[12..]);
    Address(out)
}

impl State {
    fn expected_nonce(&self, sender: Address) -> u64 {
        self.accounts.get(&sender).copied().unwrap_or(0)
    }

    fn pending_nonce(&self, sender: Address) -> u64 {
        let mut n = self.expected_nonce(sender);
        while self.withheld.contains_key(&(sender, n)) || self.queued.contains_key(&(sender, n)) {
            n += 1;
        }
        n
    }

    fn balance(&self, asset: Address, owner: Address) -> u128 {
        self.balances.get(&(asset, owner)).copied().unwrap_or(0)
    }

    fn allowance(&self, asset: Address, owner: Address, spender: Address) -> u128 {
        self.allowances
            .get(&(asset, owner, spender))
            .copied()
            .unwrap_or(0)
    }

    fn transfer(
        &mut self,
        asset: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> std::result::Result<(), Revert> {
        if asset == self.native {
            return Ok(());
        }
        let available = self.balance(asset, from);
        if available < amount {
            return Err(format!("insufficient balance: {available} < {amount}"));
        }
        self.balances.insert((asset, from), available - amount);
        *self.balances.entry((asset, to)).or_default() += amount;
        Ok(())
    }

    fn transfer_from(
        &mut self,
        asset: Address,
        owner: Address,
        spender: Address,
        amount: u128,
    ) -> std::result::Result<(), Revert> {
        if asset == self.native {
            return Ok(());
        }
        let allowed = self.allowance(asset, owner, spender);
        if allowed < amount {
            return Err(format!("insufficient allowance: {allowed} < {amount}"));
        }
        self.transfer(asset, owner, spender, amount)?;
        self.allowances
            .insert((asset, owner, spender), allowed - amount);
        Ok(())
    }

    /// Mine `p` in a fresh block, then anything it unblocked.
    fn mine(&mut self, p: Pending, hide: bool) {
        let from = p.tx.from;
        self.execute(p, hide);
        loop {
            let next = self.expected_nonce(from);
            match self.queued.remove(&(from, next)) {
                Some(q) => self.execute(q, false),
                None => break,
            }
        }
    }

    fn execute(&mut self, p: Pending, hide: bool) {
        let Pending { tx, hash } = p;
        self.head += 1;
        self.accounts.insert(tx.from, tx.nonce + 1);

        let cost = match &tx.call {
            ContractCall::Instantiate(_) => DEPLOY_COST,
            ContractCall::Approve { .. } => APPROVE_COST,
            ContractCall::JoinBet { .. } => JOIN_COST,
            ContractCall::ResolveBet { .. } => RESOLVE_COST,
            ContractCall::ClaimWinnings => CLAIM_COST,
        };
        let outcome = if tx.gas_limit < cost {
            Err("out of gas".to_string())
        } else {
            self.apply(&tx)
        };

        let (succeeded, gas_used, contract_address, revert_reason) = match outcome {
            Ok(created) => (true, cost, created, None),
            Err(reason) => (false, tx.gas_limit.min(cost), None, Some(reason)),
        };
        tracing::trace!(tx = %hash, block = self.head, succeeded, "Simulated transaction mined");
        self.receipts.insert(
            hash,
            TxReceipt {
                tx_hash: hash,
                block_number: self.head,
                succeeded,
                gas_used,
                contract_address,
                revert_reason,
                confirmations: 0,
            },
        );
        if hide {
            self.hidden.insert(hash);
        }
    }

    fn apply(&mut self, tx: &TxRequest) -> std::result::Result<Option<Address>, Revert> {
        let sender = tx.from;
        match (&tx.call, tx.to) {
            (ContractCall::Instantiate(args), None) => {
                if args.options.len() < constants::MIN_OPTIONS {
                    return Err("at least two options required".into());
                }
                let address = contract_address(sender, tx.nonce);
                self.bets.insert(
                    address,
                    BetContract {
                        owner: sender,
                        title: args.title.clone(),
                        options: args.options.clone(),
                        asset: args.asset,
                        total: 0,
                        status: BetStatus::Open,
                        winner: 0,
                        pools: vec![0; args.options.len()],
                        stakes: HashMap::new(),
                    },
                );
                Ok(Some(address))
            }
            (ContractCall::Approve { spender, amount }, Some(asset)) => {
                self.allowances.insert((asset, sender, *spender), *amount);
                Ok(None)
            }
            (ContractCall::JoinBet { option_index, amount }, Some(bet)) => {
                self.join(bet, sender, *option_index, *amount).map(|()| None)
            }
            (ContractCall::ResolveBet { winner_option_index }, Some(bet)) => {
                let contract = self.bet_mut(bet)?;
                if contract.owner != sender {
                    return Err("only the owner can resolve".into());
                }
                if contract.status != BetStatus::Open {
                    return Err("bet is not open".into());
                }
                if usize::try_from(*winner_option_index).map_or(true, |i| i >= contract.options.len()) {
                    return Err("invalid option".into());
                }
                contract.status = BetStatus::Resolved;
                contract.winner = *winner_option_index;
                Ok(None)
            }
            (ContractCall::ClaimWinnings, Some(bet)) => self.claim(bet, sender).map(|()| None),
            (call, _) => Err(format!("{} sent to wrong target", call.method())),
        }
    }

    fn bet_mut(&mut self, at: Address) -> std::result::Result<&mut BetContract, Revert> {
        self.bets
            .get_mut(&at)
            .ok_or_else(|| format!("no contract at {at}"))
    }

    fn join(
        &mut self,
        bet: Address,
        sender: Address,
        option: u64,
        amount: u128,
    ) -> std::result::Result<(), Revert> {
        let asset = {
            let contract = self.bet_mut(bet)?;
            if contract.status != BetStatus::Open {
                return Err("bet is not open".into());
            }
            if usize::try_from(option).map_or(true, |i| i >= contract.options.len()) {
                return Err("invalid option".into());
            }
            if amount == 0 {
                return Err("amount must be positive".into());
            }
            if let Some(prev) = contract.stakes.get(&sender) {
                if prev.amount > 0 && prev.option_index != option {
                    return Err("already joined a different option".into());
                }
            }
            contract.asset
        };
        self.transfer_from(asset, sender, bet, amount)?;

        let contract = self.bet_mut(bet)?;
        let slot = usize::try_from(option).map_err(|e| e.to_string())?;
        contract.pools[slot] += amount;
        contract.total += amount;
        let stake = contract.stakes.entry(sender).or_default();
        stake.option_index = option;
        stake.amount += amount;
        Ok(())
    }

    fn claim(&mut self, bet: Address, sender: Address) -> std::result::Result<(), Revert> {
        let (asset, payout) = {
            let contract = self.bet_mut(bet)?;
            if contract.status != BetStatus::Resolved {
                return Err("bet is not resolved".into());
            }
            let winner = contract.winner;
            let total = contract.total;
            let pool = usize::try_from(winner)
                .ok()
                .and_then(|i| contract.pools.get(i).copied())
                .unwrap_or(0);
            let stake = contract
                .stakes
                .get(&sender)
                .filter(|s| s.amount > 0)
                .ok_or_else(|| "did not participate".to_string())?;
            if stake.option_index != winner {
                return Err("did not pick the winning option".into());
            }
            if stake.claimed {
                return Err("already claimed".into());
            }
            let payout = stake
                .amount
                .checked_mul(total)
                .map(|v| v / pool.max(1))
                .ok_or_else(|| "payout overflow".to_string())?;
            (contract.asset, payout)
        };
        self.transfer(asset, bet, sender, payout)?;
        if let Some(stake) = self.bet_mut(bet)?.stakes.get_mut(&sender) {
            stake.claimed = true;
        }
        Ok(())
    }

    fn read(&self, at: Address, call: &ReadCall) -> Result<ReadValue> {
        let no_contract = || SidebetError::CallReverted {
            reason: format!("{} returned no data (no contract at address?)", call.method()),
        };
        match call {
            ReadCall::BetDetails => self
                .bets
                .get(&at)
                .map(|c| ReadValue::BetDetails(c.snapshot()))
                .ok_or_else(no_contract),
            ReadCall::Participation { participant } => {
                let contract = self.bets.get(&at).ok_or_else(no_contract)?;
                let stake = contract.stakes.get(participant).copied().unwrap_or_default();
                Ok(ReadValue::Participation(Participation {
                    option_index: stake.option_index,
                    amount: stake.amount,
                    claimed: stake.claimed,
                }))
            }
            ReadCall::Allowance { owner, spender } => {
                Ok(ReadValue::Amount(self.allowance(at, *owner, *spender)))
            }
            ReadCall::BalanceOf { owner } => Ok(ReadValue::Amount(self.balance(at, *owner))),
        }
    }
}

/// A ledger that lives in memory.
#[derive(Debug)]
pub struct SimulatedLedger {
    state: Mutex<State>,
}

impl SimulatedLedger {
    #[must_use]
    pub fn new(chain_id: u64) -> Self {
        let native = constants::NATIVE_ASSET_PLACEHOLDER
            .parse()
            .unwrap_or(Address::ZERO);
        Self {
            state: Mutex::new(State {
                chain_id,
                head: 0,
                offline: false,
                faults: VecDeque::new(),
                accounts: HashMap::new(),
                withheld: BTreeMap::new(),
                queued: BTreeMap::new(),
                receipts: HashMap::new(),
                hidden: HashSet::new(),
                bets: HashMap::new(),
                balances: HashMap::new(),
                allowances: HashMap::new(),
                submissions: 0,
                native,
            }),
        }
    }

    /// Mint `amount` of `asset` to `owner`.
    pub fn fund(&self, asset: Address, owner: Address, amount: u128) {
        *self.state.lock().balances.entry((asset, owner)).or_default() += amount;
    }

    #[must_use]
    pub fn balance_of(&self, asset: Address, owner: Address) -> u128 {
        self.state.lock().balance(asset, owner)
    }

    /// Queue a fault for the next submission.
    pub fn inject(&self, fault: Fault) {
        self.state.lock().faults.push_back(fault);
    }

    /// Refuse every request until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Mine every withheld transaction in nonce order.
    pub fn release_withheld(&self) {
        let mut state = self.state.lock();
        let withheld = std::mem::take(&mut state.withheld);
        for ((from, nonce), p) in withheld {
            if nonce == state.expected_nonce(from) {
                state.mine(p, false);
            } else if nonce > state.expected_nonce(from) {
                state.queued.insert((from, nonce), p);
            }
        }
    }

    /// Submissions seen, including refused ones.
    #[must_use]
    pub fn submission_count(&self) -> usize {
        self.state.lock().submissions
    }

    /// Number of settlement contracts instantiated.
    #[must_use]
    pub fn contract_count(&self) -> usize {
        self.state.lock().bets.len()
    }

    fn ensure_online(state: &State) -> Result<()> {
        if state.offline {
            return Err(SidebetError::unavailable("simulated ledger is offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerTransport for SimulatedLedger {
    async fn chain_id(&self) -> Result<u64> {
        let state = self.state.lock();
        Self::ensure_online(&state)?;
        Ok(state.chain_id)
    }

    /// Every poll observes one more block.
    async fn block_number(&self) -> Result<u64> {
        let mut state = self.state.lock();
        Self::ensure_online(&state)?;
        state.head += 1;
        Ok(state.head)
    }

    async fn gas_price(&self) -> Result<u128> {
        let state = self.state.lock();
        Self::ensure_online(&state)?;
        Ok(BASE_GAS_PRICE)
    }

    async fn pending_nonce(&self, sender: &Address) -> Result<u64> {
        let state = self.state.lock();
        Self::ensure_online(&state)?;
        Ok(state.pending_nonce(*sender))
    }

    async fn submit(&self, tx: &TxRequest) -> Result<TxHash> {
        let mut state = self.state.lock();
        state.submissions += 1;
        Self::ensure_online(&state)?;

        let fault = state.faults.pop_front();
        if fault == Some(Fault::Unavailable) {
            return Err(SidebetError::unavailable("simulated submission refused"));
        }

        let expected = state.expected_nonce(tx.from);
        if tx.nonce < expected {
            return Err(SidebetError::NonceConflict {
                sender: tx.from,
                nonce: tx.nonce,
            });
        }

        let hash = tx_hash(tx);
        let key = (tx.from, tx.nonce);
        if let Some(replaced) = state.withheld.remove(&key) {
            tracing::debug!(old = %replaced.hash, new = %hash, nonce = tx.nonce, "Pooled transaction replaced");
        }
        state.queued.remove(&key);

        let pending = Pending {
            tx: tx.clone(),
            hash,
        };
        match fault {
            Some(Fault::Withhold) => {
                state.withheld.insert(key, pending);
            }
            _ if tx.nonce > expected => {
                state.queued.insert(key, pending);
            }
            other => state.mine(pending, other == Some(Fault::HideReceipt)),
        }
        if fault == Some(Fault::LoseResponse) {
            return Err(SidebetError::SubmissionUncertain {
                sender: tx.from,
                nonce: tx.nonce,
                reason: "simulated response lost".into(),
            });
        }
        Ok(hash)
    }

    async fn receipt(&self, tx_hash: &TxHash) -> Result<Option<TxReceipt>> {
        let state = self.state.lock();
        Self::ensure_online(&state)?;
        if state.hidden.contains(tx_hash) {
            return Ok(None);
        }
        Ok(state.receipts.get(tx_hash).cloned())
    }

    async fn read(&self, at: &Address, call: &ReadCall) -> Result<ReadValue> {
        let state = self.state.lock();
        Self::ensure_online(&state)?;
        let value = state.read(*at, call)?;
        // round-trip through the wire encoding
        call.decode(&value.encode())
    }
}

#[cfg(test)]
mod tests {
    use sidebet_types::GasBudget;

    use super::*;
    use crate::call::ConstructorArgs;

    fn asset() -> Address {
        Address::from_low_u8(0xaa)
    }

    fn tx(from: Address, to: Option<Address>, call: ContractCall, nonce: u64) -> TxRequest {
        TxRequest {
            gas_limit: call.gas_limit(&GasBudget::default()),
            from,
            to,
            call,
            gas_price: BASE_GAS_PRICE,
            nonce,
        }
    }

    async fn deploy(ledger: &SimulatedLedger, owner: Address) -> Address {
        let nonce = ledger.pending_nonce(&owner).await.unwrap();
        let create = ContractCall::Instantiate(ConstructorArgs {
            title: "Will it rain tomorrow?".into(),
            options: vec!["yes".into(), "no".into()],
            asset: asset(),
        });
        let hash = ledger.submit(&tx(owner, None, create, nonce)).await.unwrap();
        ledger
            .receipt(&hash)
            .await
            .unwrap()
            .unwrap()
            .contract_address
            .unwrap()
    }

    async fn stake(
        ledger: &SimulatedLedger,
        bet: Address,
        who: Address,
        option: u64,
        amount: u128,
    ) -> TxReceipt {
        let n = ledger.pending_nonce(&who).await.unwrap();
        ledger
            .submit(&tx(who, Some(asset()), ContractCall::Approve { spender: bet, amount }, n))
            .await
            .unwrap();
        let hash = ledger
            .submit(&tx(
                who,
                Some(bet),
                ContractCall::JoinBet {
                    option_index: option,
                    amount,
                },
                n + 1,
            ))
            .await
            .unwrap();
        ledger.receipt(&hash).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn pays_out_pro_rata() {
        let ledger = SimulatedLedger::new(1);
        let owner = Address::from_low_u8(1);
        let (a, b, c) = (
            Address::from_low_u8(2),
            Address::from_low_u8(3),
            Address::from_low_u8(4),
        );
        for who in [a, b, c] {
            ledger.fund(asset(), who, 100);
        }
        let bet = deploy(&ledger, owner).await;

        assert!(stake(&ledger, bet, a, 0, 10).await.succeeded);
        assert!(stake(&ledger, bet, b, 0, 20).await.succeeded);
        assert!(stake(&ledger, bet, c, 1, 30).await.succeeded);

        let n = ledger.pending_nonce(&owner).await.unwrap();
        ledger
            .submit(&tx(owner, Some(bet), ContractCall::ResolveBet { winner_option_index: 0 }, n))
            .await
            .unwrap();

        let n = ledger.pending_nonce(&a).await.unwrap();
        let h = ledger
            .submit(&tx(a, Some(bet), ContractCall::ClaimWinnings, n))
            .await
            .unwrap();
        assert!(ledger.receipt(&h).await.unwrap().unwrap().succeeded);
        // 10 * 60 / 30
        assert_eq!(ledger.balance_of(asset(), a), 90 + 20);

        let n = ledger.pending_nonce(&c).await.unwrap();
        let h = ledger
            .submit(&tx(c, Some(bet), ContractCall::ClaimWinnings, n))
            .await
            .unwrap();
        let r = ledger.receipt(&h).await.unwrap().unwrap();
        assert!(!r.succeeded);
        assert_eq!(r.revert_reason.as_deref(), Some("did not pick the winning option"));
    }

    #[tokio::test]
    async fn join_without_allowance_reverts() {
        let ledger = SimulatedLedger::new(1);
        let owner = Address::from_low_u8(1);
        let a = Address::from_low_u8(2);
        ledger.fund(asset(), a, 100);
        let bet = deploy(&ledger, owner).await;

        let h = ledger
            .submit(&tx(a, Some(bet), ContractCall::JoinBet { option_index: 0, amount: 5 }, 0))
            .await
            .unwrap();
        let r = ledger.receipt(&h).await.unwrap().unwrap();
        assert!(!r.succeeded);
        assert!(r.revert_reason.unwrap().contains("allowance"));
    }

    #[tokio::test]
    async fn stale_nonce_conflicts() {
        let ledger = SimulatedLedger::new(1);
        let owner = Address::from_low_u8(1);
        let bet = deploy(&ledger, owner).await;
        let err = ledger
            .submit(&tx(owner, Some(bet), ContractCall::ResolveBet { winner_option_index: 0 }, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, SidebetError::NonceConflict { nonce: 0, .. }));
    }

    #[tokio::test]
    async fn future_nonce_waits_for_gap() {
        let ledger = SimulatedLedger::new(1);
        let owner = Address::from_low_u8(1);
        let bet = deploy(&ledger, owner).await;

        let later = ledger
            .submit(&tx(owner, Some(bet), ContractCall::ResolveBet { winner_option_index: 1 }, 2))
            .await
            .unwrap();
        assert!(ledger.receipt(&later).await.unwrap().is_none());
        assert_eq!(ledger.pending_nonce(&owner).await.unwrap(), 1);

        // a no-op approve fills the gap and unblocks the queued resolve
        ledger
            .submit(&tx(owner, Some(asset()), ContractCall::Approve { spender: bet, amount: 0 }, 1))
            .await
            .unwrap();
        assert!(ledger.receipt(&later).await.unwrap().unwrap().succeeded);
        assert_eq!(ledger.pending_nonce(&owner).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn withheld_then_replaced() {
        let ledger = SimulatedLedger::new(1);
        let owner = Address::from_low_u8(1);
        let bet = deploy(&ledger, owner).await;

        ledger.inject(Fault::Withhold);
        let resolve = ContractCall::ResolveBet { winner_option_index: 0 };
        let first = ledger
            .submit(&tx(owner, Some(bet), resolve.clone(), 1))
            .await
            .unwrap();
        assert_eq!(ledger.pending_nonce(&owner).await.unwrap(), 2);

        let mut replacement = tx(owner, Some(bet), resolve, 1);
        replacement.gas_price *= 2;
        let second = ledger.submit(&replacement).await.unwrap();
        assert_ne!(first, second);

        ledger.release_withheld();
        assert!(ledger.receipt(&first).await.unwrap().is_none());
        assert!(ledger.receipt(&second).await.unwrap().unwrap().succeeded);
    }

    #[tokio::test]
    async fn lost_response_still_mines() {
        let ledger = SimulatedLedger::new(1);
        let owner = Address::from_low_u8(1);
        let bet = deploy(&ledger, owner).await;

        ledger.inject(Fault::LoseResponse);
        let err = ledger
            .submit(&tx(owner, Some(bet), ContractCall::ResolveBet { winner_option_index: 1 }, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, SidebetError::SubmissionUncertain { nonce: 1, .. }), "{err:?}");
        assert_eq!(ledger.pending_nonce(&owner).await.unwrap(), 2);
        let ReadValue::BetDetails(s) = ledger.read(&bet, &ReadCall::BetDetails).await.unwrap() else {
            panic!("not bet details");
        };
        assert_eq!(s.status, BetStatus::Resolved);
    }

    #[tokio::test]
    async fn out_of_gas_reverts() {
        let ledger = SimulatedLedger::new(1);
        let owner = Address::from_low_u8(1);
        let bet = deploy(&ledger, owner).await;
        let mut t = tx(owner, Some(bet), ContractCall::ResolveBet { winner_option_index: 0 }, 1);
        t.gas_limit = 21_000;
        let h = ledger.submit(&t).await.unwrap();
        let r = ledger.receipt(&h).await.unwrap().unwrap();
        assert!(!r.succeeded);
        assert_eq!(r.revert_reason.as_deref(), Some("out of gas"));

        let details = ledger.read(&bet, &ReadCall::BetDetails).await.unwrap();
        let ReadValue::BetDetails(s) = details else {
            panic!("unexpected {details:?}");
        };
        assert_eq!(s.status, BetStatus::Open);
    }

    #[tokio::test]
    async fn offline_refuses_everything() {
        let ledger = SimulatedLedger::new(1);
        ledger.set_offline(true);
        assert!(matches!(
            ledger.chain_id().await,
            Err(SidebetError::LedgerUnavailable { .. })
        ));
        ledger.set_offline(false);
        assert_eq!(ledger.chain_id().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn read_missing_contract_reverts() {
        let ledger = SimulatedLedger::new(1);
        let err = ledger
            .read(&Address::from_low_u8(7), &ReadCall::BetDetails)
            .await
            .unwrap_err();
        assert!(matches!(err, SidebetError::CallReverted { .. }));
    }
}
