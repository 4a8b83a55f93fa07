//! The Bet Settlement Engine.
//!
//! Orchestrates the bet lifecycle:
//! 1. Validate the request against the cached projection (no side effects)
//! 2. Resolve the requester's ledger address
//! 3. Pick a route ([`ModeSelector`])
//! 4. Ledger route: submit through the gateway and await confirmation,
//!    reconciling once if the outcome is unknown
//! 5. Apply the cache mutation exactly once and return a receipt

use std::sync::Arc;

use sidebet_ledger::{CallOptions, ConstructorArgs, ContractCall, LedgerGateway};
use sidebet_types::{
    Address, Bet, BetId, EngineConfig, Operation, OperationId, OperationReceipt, Participation,
    Result, Route, SidebetError, TxHash, UserHandle, constants,
};

use crate::identity::{IdentityResolver, InMemoryIdentities};
use crate::mode::ModeSelector;
use crate::registry::{BetRegistry, InMemoryRegistry};

/// The ledger state a mutating call is expected to produce. Checked after an
/// ambiguous failure to learn whether the call landed.
#[derive(Debug, Clone, Copy)]
enum Effect {
    Approved {
        asset: Address,
        owner: Address,
        spender: Address,
        at_least: u128,
    },
    Staked {
        bet: BetId,
        participant: Address,
        at_least: u128,
    },
    Resolved {
        bet: BetId,
        winner: usize,
    },
    Claimed {
        bet: BetId,
        participant: Address,
    },
}

/// How a guarded call concluded.
#[derive(Debug, Clone, Copy)]
struct Landed {
    tx_hash: Option<TxHash>,
    reconciled: bool,
}

impl Landed {
    fn confirmed(tx_hash: TxHash) -> Self {
        Self {
            tx_hash: Some(tx_hash),
            reconciled: false,
        }
    }
}

pub struct SettlementEngine {
    gateway: Arc<dyn LedgerGateway>,
    registry: Arc<dyn BetRegistry>,
    identities: Arc<dyn IdentityResolver>,
    selector: ModeSelector,
    config: EngineConfig,
}

impl SettlementEngine {
    pub fn new(
        config: EngineConfig,
        gateway: Arc<dyn LedgerGateway>,
        registry: Arc<dyn BetRegistry>,
        identities: Arc<dyn IdentityResolver>,
    ) -> Self {
        let selector = ModeSelector::new(Arc::clone(&gateway), &config.ledger);
        tracing::info!(
            engine = constants::ENGINE_NAME,
            version = constants::VERSION,
            asset = %config.ledger.settlement_asset,
            confirmations = config.ledger.confirmations,
            "Settlement engine ready"
        );
        Self {
            gateway,
            registry,
            identities,
            selector,
            config,
        }
    }

    /// Engine with an in-memory registry and identity map.
    pub fn in_memory(config: EngineConfig, gateway: Arc<dyn LedgerGateway>) -> Self {
        let registry = Arc::new(InMemoryRegistry::new(config.idempotency_cache_size));
        Self::new(
            config,
            gateway,
            registry,
            Arc::new(InMemoryIdentities::new()),
        )
    }

    pub fn registry(&self) -> &Arc<dyn BetRegistry> {
        &self.registry
    }

    pub fn identities(&self) -> &Arc<dyn IdentityResolver> {
        &self.identities
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =================================================================
    // Lifecycle operations
    // =================================================================

    /// Deploy a new settlement instance and register it as an open bet.
    ///
    /// # Errors
    /// `Validation` for a bad title or option list. Any ledger failure is
    /// reported as `LedgerUnavailable` and leaves the registry untouched.
    pub async fn create(
        &self,
        title: &str,
        options: Vec<String>,
        requester: &UserHandle,
    ) -> Result<Bet> {
        let op_id = OperationId::new();
        let title = title.trim().to_string();
        validate_new_bet(&title, &options)?;
        let creator = self.identities.resolve(requester)?;

        tracing::info!(%op_id, %requester, %title, options = options.len(), "Creating bet");
        let args = ConstructorArgs {
            title: title.clone(),
            options: options.clone(),
            asset: self.config.ledger.settlement_asset,
        };
        let bet_id = self
            .gateway
            .deploy(creator, args)
            .await
            .map_err(|e| e.for_operation(Operation::Create, Address::ZERO))?;

        let bet = Bet::open(bet_id, title, options, creator);
        self.registry.insert(bet.clone())?;
        tracing::info!(%op_id, bet_id = %bet_id, creator = %creator, "Bet created");
        Ok(bet)
    }

    /// Stake `amount` (smallest units) on `option_index`.
    ///
    /// # Errors
    /// `BetNotFound`, `IllegalTransition` or `Validation` before any ledger
    /// call; `JoinFailed` wrapping the ledger error otherwise. On the ledger
    /// route the cached total only moves once the stake is confirmed, and
    /// then to the total the ledger reports.
    pub async fn join(
        &self,
        bet_id: BetId,
        option_index: usize,
        amount: u128,
        requester: &UserHandle,
    ) -> Result<OperationReceipt> {
        let op_id = OperationId::new();
        let bet = self.lookup(bet_id).await?;
        check_transition(&bet, Operation::Join)?;
        if !bet.is_valid_option(option_index) {
            return Err(SidebetError::validation(format!(
                "option {option_index} out of range for {} options",
                bet.option_count()
            )));
        }
        if amount == 0 {
            return Err(SidebetError::validation("stake amount must be positive"));
        }
        let participant = self.identities.resolve(requester)?;

        let route = self.selector.route().await;
        tracing::info!(%op_id, bet_id = %bet_id, %requester, option_index, amount, %route, "Joining bet");

        let receipt = match route {
            Route::Rehearsal => {
                self.registry.add_stake(&bet_id, op_id, amount)?;
                OperationReceipt::rehearsed(op_id, Operation::Join, bet_id)
            }
            Route::Ledger => {
                let landed = self
                    .stake_on_ledger(bet_id, participant, option_index, amount)
                    .await
                    .map_err(|e| e.for_operation(Operation::Join, bet_id))?;
                let total = self
                    .confirmed_total(bet_id, bet.total_amount, amount)
                    .await;
                self.registry.confirm_stake(&bet_id, op_id, total)?;
                ledger_receipt(op_id, Operation::Join, bet_id, landed)
            }
        };
        tracing::info!(%op_id, bet_id = %bet_id, reconciled = receipt.reconciled, "Join applied");
        Ok(receipt)
    }

    async fn stake_on_ledger(
        &self,
        bet_id: BetId,
        participant: Address,
        option_index: usize,
        amount: u128,
    ) -> Result<Landed> {
        let before = self.gateway.participation(bet_id, participant).await?;
        let at_least = before.amount.checked_add(amount).ok_or_else(|| {
            SidebetError::validation(format!("stake {amount} overflows existing position"))
        })?;

        if self.config.ledger.asset_requires_approval() {
            let asset = self.config.ledger.settlement_asset;
            self.guarded(
                participant,
                asset,
                ContractCall::Approve {
                    spender: bet_id,
                    amount,
                },
                Effect::Approved {
                    asset,
                    owner: participant,
                    spender: bet_id,
                    at_least: amount,
                },
            )
            .await?;
        }

        self.guarded(
            participant,
            bet_id,
            ContractCall::JoinBet {
                option_index: option_index as u64,
                amount,
            },
            Effect::Staked {
                bet: bet_id,
                participant,
                at_least,
            },
        )
        .await
    }

    /// Bet total once a stake is confirmed. The ledger is authoritative; if
    /// it cannot be read, the total this join started from plus its stake
    /// is a lower bound that a later refresh raises.
    async fn confirmed_total(&self, bet_id: BetId, started_from: u128, amount: u128) -> u128 {
        match self.gateway.bet_details(bet_id).await {
            Ok(snapshot) => snapshot.total_amount,
            Err(err) => {
                tracing::warn!(bet_id = %bet_id, error = %err, "Total re-read failed; caching a lower bound");
                started_from.saturating_add(amount)
            }
        }
    }

    /// Declare `winner` and move the bet to `Resolved`.
    ///
    /// # Errors
    /// `IllegalTransition` if the bet is already resolved, before any ledger
    /// call. A rejection by the contract (e.g. requester is not the owner)
    /// surfaces as `ResolveFailed`.
    pub async fn resolve(
        &self,
        bet_id: BetId,
        winner: usize,
        requester: &UserHandle,
    ) -> Result<OperationReceipt> {
        let op_id = OperationId::new();
        let bet = self.lookup(bet_id).await?;
        check_transition(&bet, Operation::Resolve)?;
        if !bet.is_valid_option(winner) {
            return Err(SidebetError::validation(format!(
                "winner {winner} out of range for {} options",
                bet.option_count()
            )));
        }
        let sender = self.identities.resolve(requester)?;

        let route = self.selector.route().await;
        tracing::info!(%op_id, bet_id = %bet_id, %requester, winner, %route, "Resolving bet");

        let receipt = match route {
            Route::Rehearsal => {
                self.registry.mark_resolved(&bet_id, op_id, winner)?;
                OperationReceipt::rehearsed(op_id, Operation::Resolve, bet_id)
            }
            Route::Ledger => {
                let landed = self
                    .guarded(
                        sender,
                        bet_id,
                        ContractCall::ResolveBet {
                            winner_option_index: winner as u64,
                        },
                        Effect::Resolved {
                            bet: bet_id,
                            winner,
                        },
                    )
                    .await
                    .map_err(|e| e.for_operation(Operation::Resolve, bet_id))?;
                self.registry.mark_resolved(&bet_id, op_id, winner)?;
                ledger_receipt(op_id, Operation::Resolve, bet_id, landed)
            }
        };
        tracing::info!(
            %op_id,
            bet_id = %bet_id,
            winner = bet.options[winner].as_str(),
            "Bet resolved"
        );
        Ok(receipt)
    }

    /// Collect winnings. The contract decides whether the requester won and
    /// whether they already claimed; nothing about claims is cached.
    ///
    /// # Errors
    /// `IdentityNotFound` if the requester has never been seen,
    /// `IllegalTransition` if the bet is not resolved, `ClaimFailed` if the
    /// contract rejects the claim.
    pub async fn claim(&self, bet_id: BetId, requester: &UserHandle) -> Result<OperationReceipt> {
        let op_id = OperationId::new();
        let bet = self.lookup(bet_id).await?;
        check_transition(&bet, Operation::Claim)?;
        let claimant = self
            .identities
            .lookup(requester)
            .ok_or_else(|| SidebetError::IdentityNotFound(requester.clone()))?;

        let route = self.selector.route().await;
        tracing::info!(%op_id, bet_id = %bet_id, %requester, %route, "Claiming winnings");

        let receipt = match route {
            Route::Rehearsal => OperationReceipt::rehearsed(op_id, Operation::Claim, bet_id),
            Route::Ledger => {
                let landed = self
                    .guarded(
                        claimant,
                        bet_id,
                        ContractCall::ClaimWinnings,
                        Effect::Claimed {
                            bet: bet_id,
                            participant: claimant,
                        },
                    )
                    .await
                    .map_err(|e| e.for_operation(Operation::Claim, bet_id))?;
                ledger_receipt(op_id, Operation::Claim, bet_id, landed)
            }
        };
        tracing::info!(%op_id, bet_id = %bet_id, "Claim settled");
        Ok(receipt)
    }

    /// Cache-first read of a bet; a miss is filled from the ledger.
    ///
    /// # Errors
    /// `BetNotFound` if the ledger has no instance at `bet_id`.
    /// `LedgerUnavailable` if the ledger could not be asked.
    pub async fn lookup(&self, bet_id: BetId) -> Result<Bet> {
        if let Some(bet) = self.registry.get(&bet_id) {
            return Ok(bet);
        }
        tracing::debug!(bet_id = %bet_id, "Cache miss; reading ledger");
        self.refresh(bet_id).await
    }

    /// Re-read the bet from the ledger and merge it into the cache.
    pub async fn refresh(&self, bet_id: BetId) -> Result<Bet> {
        let snapshot = self
            .gateway
            .bet_details(bet_id)
            .await
            .map_err(|e| not_a_bet(e, bet_id))?;
        self.registry.merge_snapshot(&bet_id, snapshot)
    }

    /// The requester's position in a bet, as the ledger reports it.
    pub async fn participation(
        &self,
        bet_id: BetId,
        requester: &UserHandle,
    ) -> Result<Participation> {
        let participant = self
            .identities
            .lookup(requester)
            .ok_or_else(|| SidebetError::IdentityNotFound(requester.clone()))?;
        self.gateway
            .participation(bet_id, participant)
            .await
            .map_err(|e| not_a_bet(e, bet_id))
    }

    // =================================================================
    // Guarded submission
    // =================================================================

    /// Submit `call` and await confirmation. When the outcome is unknown,
    /// check whether `effect` is already on the ledger before trying once
    /// more. A timed-out or unanswered submission is retried with the same
    /// nonce, so at most one of the two can be included; a rejected nonce is
    /// retried with a fresh one.
    async fn guarded(
        &self,
        from: Address,
        to: Address,
        call: ContractCall,
        effect: Effect,
    ) -> Result<Landed> {
        let unknown = match self
            .gateway
            .call(from, to, call.clone(), CallOptions::default())
            .await
        {
            Ok(receipt) => return Ok(Landed::confirmed(receipt.tx_hash)),
            Err(err) => err,
        };
        let retry = match unknown {
            SidebetError::LedgerTimeout { nonce, .. }
            | SidebetError::SubmissionUncertain { nonce, .. } => CallOptions::replacing(nonce),
            SidebetError::NonceConflict { .. } => CallOptions::default(),
            other => return Err(other),
        };
        tracing::warn!(error = %unknown, method = call.method(), "Outcome unknown; reconciling");

        match self.effect_landed(effect).await {
            Ok(true) => return Ok(reconciled(&unknown)),
            Ok(false) => {}
            Err(read_err) => {
                tracing::warn!(error = %read_err, "Reconciling read failed");
                return Err(unknown);
            }
        }

        tracing::info!(nonce = ?retry.nonce, method = call.method(), "Effect not on ledger; resubmitting");
        match self.gateway.call(from, to, call, retry).await {
            Ok(receipt) => Ok(Landed::confirmed(receipt.tx_hash)),
            Err(err) if err.is_ambiguous() => match self.effect_landed(effect).await {
                Ok(true) => Ok(reconciled(&err)),
                _ => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    async fn effect_landed(&self, effect: Effect) -> Result<bool> {
        let landed = match effect {
            Effect::Approved {
                asset,
                owner,
                spender,
                at_least,
            } => self.gateway.allowance(asset, owner, spender).await? >= at_least,
            Effect::Staked {
                bet,
                participant,
                at_least,
            } => self.gateway.participation(bet, participant).await?.amount >= at_least,
            Effect::Resolved { bet, winner } => {
                self.gateway.bet_details(bet).await?.winner() == Some(winner)
            }
            Effect::Claimed { bet, participant } => {
                self.gateway.participation(bet, participant).await?.claimed
            }
        };
        tracing::debug!(?effect, landed, "Reconciled");
        Ok(landed)
    }
}

fn reconciled(cause: &SidebetError) -> Landed {
    tracing::warn!(error = %cause, "Call with unknown outcome found on ledger");
    Landed {
        tx_hash: None,
        reconciled: true,
    }
}

/// A read at an address with no settlement contract either reverts or
/// returns data that does not decode.
fn not_a_bet(err: SidebetError, bet_id: BetId) -> SidebetError {
    match err {
        SidebetError::CallReverted { .. } | SidebetError::AbiDecode(_) => {
            SidebetError::BetNotFound(bet_id)
        }
        other => other,
    }
}

fn ledger_receipt(
    op_id: OperationId,
    operation: Operation,
    bet_id: BetId,
    landed: Landed,
) -> OperationReceipt {
    OperationReceipt {
        op_id,
        operation,
        bet_id,
        route: Route::Ledger,
        tx_hash: landed.tx_hash,
        reconciled: landed.reconciled,
    }
}

fn check_transition(bet: &Bet, op: Operation) -> Result<()> {
    if bet.status.permits(op) {
        Ok(())
    } else {
        Err(SidebetError::IllegalTransition {
            bet_id: bet.id,
            status: bet.status,
            attempted: op,
        })
    }
}

fn validate_new_bet(title: &str, options: &[String]) -> Result<()> {
    if title.is_empty() {
        return Err(SidebetError::validation("title must not be empty"));
    }
    if title.len() > constants::MAX_TITLE_LEN {
        return Err(SidebetError::validation(format!(
            "title longer than {} bytes",
            constants::MAX_TITLE_LEN
        )));
    }
    if options.len() < constants::MIN_OPTIONS {
        return Err(SidebetError::validation(format!(
            "at least {} options required, got {}",
            constants::MIN_OPTIONS,
            options.len()
        )));
    }
    if options.len() > constants::MAX_OPTIONS {
        return Err(SidebetError::validation(format!(
            "at most {} options allowed, got {}",
            constants::MAX_OPTIONS,
            options.len()
        )));
    }
    if let Some(i) = options.iter().position(|o| o.trim().is_empty()) {
        return Err(SidebetError::validation(format!("option {i} is blank")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn new_bet_validation() {
        validate_new_bet("Will it rain tomorrow?", &opts(&["yes", "no"])).unwrap();
        assert!(validate_new_bet("", &opts(&["yes", "no"])).is_err());
        assert!(validate_new_bet("t", &opts(&["only"])).is_err());
        assert!(validate_new_bet("t", &opts(&["a", "  "])).is_err());
        let many: Vec<String> = (0..=constants::MAX_OPTIONS).map(|i| i.to_string()).collect();
        assert!(validate_new_bet("t", &many).is_err());
        assert!(validate_new_bet(&"x".repeat(constants::MAX_TITLE_LEN + 1), &opts(&["a", "b"])).is_err());
    }

    #[test]
    fn unreadable_contracts_are_not_bets() {
        let id = Address::from_low_u8(3);
        let reverted = SidebetError::CallReverted {
            reason: "no data".into(),
        };
        assert!(matches!(not_a_bet(reverted, id), SidebetError::BetNotFound(x) if x == id));
        let garbage = SidebetError::AbiDecode("empty".into());
        assert!(matches!(not_a_bet(garbage, id), SidebetError::BetNotFound(_)));
        let down = SidebetError::unavailable("down");
        assert!(matches!(not_a_bet(down, id), SidebetError::LedgerUnavailable { .. }));
    }

    #[test]
    fn transitions() {
        let mut bet = Bet::open(
            Address::from_low_u8(1),
            "t".into(),
            opts(&["a", "b"]),
            Address::from_low_u8(2),
        );
        check_transition(&bet, Operation::Join).unwrap();
        check_transition(&bet, Operation::Resolve).unwrap();
        assert!(matches!(
            check_transition(&bet, Operation::Claim),
            Err(SidebetError::IllegalTransition { .. })
        ));

        bet.status = sidebet_types::BetStatus::Resolved;
        check_transition(&bet, Operation::Claim).unwrap();
        assert!(check_transition(&bet, Operation::Join).is_err());
        assert!(check_transition(&bet, Operation::Resolve).is_err());
    }
}
