//! Bet Registry: the local projection cache.
//!
//! The registry is a keyed store of [`Bet`] projections. Every mutation runs
//! inside a per-bet critical section so joins on different bets never
//! contend, and the projection invariants hold under any interleaving:
//!
//! - `options` and `title` never change after insertion
//! - `total_amount` never decreases
//! - `status` only moves forward; `winner_option_index` is set once
//! - entries are never removed
//! - each [`OperationId`] mutates the cache at most once

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use sidebet_types::{
    Bet, BetId, BetSnapshot, BetStatus, Operation, OperationId, Result, SidebetError,
};

use crate::idempotency::IdempotencyGuard;

/// Swappable store of bet projections.
pub trait BetRegistry: Send + Sync {
    /// Register a new bet.
    fn insert(&self, bet: Bet) -> Result<()>;

    /// Snapshot of a cached bet.
    fn get(&self, id: &BetId) -> Option<Bet>;

    /// Add `amount` to an open bet's total on behalf of `op_id`. Used when
    /// the cache is the only authority (rehearsal).
    fn add_stake(&self, id: &BetId, op_id: OperationId, amount: u128) -> Result<Bet>;

    /// Record a stake the ledger confirmed, on behalf of `op_id`, taking the
    /// bet total from the ledger. Applies even if a concurrent resolve has
    /// moved the projection on.
    fn confirm_stake(&self, id: &BetId, op_id: OperationId, ledger_total: u128) -> Result<Bet>;

    /// Move the bet to `Resolved` with `winner`. Re-applying the same winner
    /// is a no-op; a different winner is a divergence.
    fn mark_resolved(&self, id: &BetId, op_id: OperationId, winner: usize) -> Result<Bet>;

    /// Fold a ledger snapshot into the cache, inserting the bet if absent.
    fn merge_snapshot(&self, id: &BetId, snapshot: BetSnapshot) -> Result<Bet>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process [`BetRegistry`].
pub struct InMemoryRegistry {
    bets: RwLock<HashMap<BetId, Arc<Mutex<Bet>>>>,
    applied: Mutex<IdempotencyGuard>,
}

impl InMemoryRegistry {
    #[must_use]
    pub fn new(idempotency_capacity: usize) -> Self {
        Self {
            bets: RwLock::new(HashMap::new()),
            applied: Mutex::new(IdempotencyGuard::new(idempotency_capacity)),
        }
    }

    fn entry(&self, id: &BetId) -> Result<Arc<Mutex<Bet>>> {
        self.bets
            .read()
            .get(id)
            .cloned()
            .ok_or(SidebetError::BetNotFound(*id))
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new(sidebet_types::constants::OPERATION_IDEMPOTENCY_CACHE_SIZE)
    }
}

fn diverged(id: BetId, reason: impl Into<String>) -> SidebetError {
    let reason = reason.into();
    tracing::error!(bet_id = %id, %reason, "Cache diverged from ledger");
    SidebetError::CacheDiverged { bet_id: id, reason }
}

impl BetRegistry for InMemoryRegistry {
    fn insert(&self, bet: Bet) -> Result<()> {
        match self.bets.write().entry(bet.id) {
            Entry::Occupied(_) => Err(SidebetError::DuplicateBet(bet.id)),
            Entry::Vacant(slot) => {
                tracing::debug!(bet_id = %bet.id, options = bet.options.len(), "Bet registered");
                slot.insert(Arc::new(Mutex::new(bet)));
                Ok(())
            }
        }
    }

    fn get(&self, id: &BetId) -> Option<Bet> {
        let entry = self.bets.read().get(id).cloned()?;
        let bet = entry.lock().clone();
        Some(bet)
    }

    fn add_stake(&self, id: &BetId, op_id: OperationId, amount: u128) -> Result<Bet> {
        let entry = self.entry(id)?;
        let mut bet = entry.lock();

        if !bet.is_open() {
            return Err(SidebetError::IllegalTransition {
                bet_id: *id,
                status: bet.status,
                attempted: Operation::Join,
            });
        }
        let total = bet
            .total_amount
            .checked_add(amount)
            .ok_or_else(|| SidebetError::Internal(format!("stake total overflow on {id}")))?;

        self.applied.lock().mark_applied(op_id)?;
        bet.total_amount = total;
        Ok(bet.clone())
    }

    fn confirm_stake(&self, id: &BetId, op_id: OperationId, ledger_total: u128) -> Result<Bet> {
        let entry = self.entry(id)?;
        let mut bet = entry.lock();

        self.applied.lock().mark_applied(op_id)?;
        // a refresh may already have folded in this or a later stake
        bet.total_amount = bet.total_amount.max(ledger_total);
        Ok(bet.clone())
    }

    fn mark_resolved(&self, id: &BetId, op_id: OperationId, winner: usize) -> Result<Bet> {
        let entry = self.entry(id)?;
        let mut bet = entry.lock();

        if !bet.is_valid_option(winner) {
            return Err(SidebetError::validation(format!(
                "winner index {winner} out of range for {} options",
                bet.option_count()
            )));
        }
        match (bet.status, bet.winner_option_index) {
            (BetStatus::Resolved, Some(existing)) if existing == winner => {
                return Ok(bet.clone());
            }
            (BetStatus::Resolved, existing) => {
                return Err(diverged(
                    *id,
                    format!("resolved with winner {existing:?}, ledger reports {winner}"),
                ));
            }
            (BetStatus::Closed, _) => {
                return Err(SidebetError::IllegalTransition {
                    bet_id: *id,
                    status: bet.status,
                    attempted: Operation::Resolve,
                });
            }
            (BetStatus::Open, _) => {}
        }

        self.applied.lock().mark_applied(op_id)?;
        bet.status = BetStatus::Resolved;
        bet.winner_option_index = Some(winner);
        Ok(bet.clone())
    }

    fn merge_snapshot(&self, id: &BetId, snapshot: BetSnapshot) -> Result<Bet> {
        let entry = {
            let mut bets = self.bets.write();
            match bets.entry(*id) {
                Entry::Vacant(slot) => {
                    let bet = Bet::from_snapshot(*id, snapshot);
                    tracing::debug!(bet_id = %id, status = %bet.status, "Bet populated from ledger");
                    slot.insert(Arc::new(Mutex::new(bet.clone())));
                    return Ok(bet);
                }
                Entry::Occupied(slot) => Arc::clone(slot.get()),
            }
        };

        let mut bet = entry.lock();
        if bet.options != snapshot.options || bet.title != snapshot.title {
            return Err(diverged(*id, "title or options differ from ledger"));
        }
        let ledger_winner = snapshot.winner();
        if let (Some(cached), Some(ledger)) = (bet.winner_option_index, ledger_winner) {
            if cached != ledger {
                return Err(diverged(
                    *id,
                    format!("cached winner {cached}, ledger winner {ledger}"),
                ));
            }
        }

        bet.total_amount = bet.total_amount.max(snapshot.total_amount);
        if snapshot.status.rank() > bet.status.rank() {
            bet.status = snapshot.status;
        }
        if bet.winner_option_index.is_none() {
            bet.winner_option_index = ledger_winner;
        }
        Ok(bet.clone())
    }

    fn len(&self) -> usize {
        self.bets.read().len()
    }
}

#[cfg(test)]
mod tests {
    use sidebet_types::Address;

    use super::*;

    fn rain(id: BetId) -> Bet {
        Bet::open(
            id,
            "Will it rain tomorrow?".into(),
            vec!["yes".into(), "no".into()],
            Address::from_low_u8(1),
        )
    }

    fn snapshot(total: u128, status: BetStatus, winner: u64) -> BetSnapshot {
        BetSnapshot {
            title: "Will it rain tomorrow?".into(),
            options: vec!["yes".into(), "no".into()],
            total_amount: total,
            status,
            winner_option_index: winner,
        }
    }

    #[test]
    fn insert_then_get() {
        let reg = InMemoryRegistry::default();
        let id = Address::from_low_u8(9);
        reg.insert(rain(id)).unwrap();
        let bet = reg.get(&id).unwrap();
        assert_eq!(bet.total_amount, 0);
        assert!(bet.is_open());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn duplicate_insert_rejected() {
        let reg = InMemoryRegistry::default();
        let id = Address::from_low_u8(9);
        reg.insert(rain(id)).unwrap();
        assert!(matches!(
            reg.insert(rain(id)),
            Err(SidebetError::DuplicateBet(_))
        ));
    }

    #[test]
    fn stake_applies_once_per_operation() {
        let reg = InMemoryRegistry::default();
        let id = Address::from_low_u8(9);
        reg.insert(rain(id)).unwrap();
        let op = OperationId::new();

        reg.add_stake(&id, op, 10).unwrap();
        let err = reg.add_stake(&id, op, 10).unwrap_err();
        assert!(matches!(err, SidebetError::DuplicateOperation(_)));
        assert_eq!(reg.get(&id).unwrap().total_amount, 10);
    }

    #[test]
    fn cache_only_stake_needs_open_bet() {
        let reg = InMemoryRegistry::default();
        let id = Address::from_low_u8(9);
        reg.insert(rain(id)).unwrap();
        reg.mark_resolved(&id, OperationId::new(), 0).unwrap();

        let err = reg.add_stake(&id, OperationId::new(), 5).unwrap_err();
        assert!(matches!(err, SidebetError::IllegalTransition { .. }));
        assert_eq!(reg.get(&id).unwrap().total_amount, 0);
    }

    #[test]
    fn confirmed_stake_takes_ledger_total() {
        let reg = InMemoryRegistry::default();
        let id = Address::from_low_u8(9);
        reg.insert(rain(id)).unwrap();
        reg.mark_resolved(&id, OperationId::new(), 0).unwrap();

        // applies after a concurrent resolve
        let op = OperationId::new();
        assert_eq!(reg.confirm_stake(&id, op, 5).unwrap().total_amount, 5);
        assert!(matches!(
            reg.confirm_stake(&id, op, 5),
            Err(SidebetError::DuplicateOperation(_))
        ));

        // a refresh that already saw the stake is not added to
        reg.merge_snapshot(&id, snapshot(12, BetStatus::Resolved, 0))
            .unwrap();
        let bet = reg.confirm_stake(&id, OperationId::new(), 12).unwrap();
        assert_eq!(bet.total_amount, 12);
        // a stale ledger total never lowers the cache
        let bet = reg.confirm_stake(&id, OperationId::new(), 7).unwrap();
        assert_eq!(bet.total_amount, 12);
    }

    #[test]
    fn resolve_is_set_once() {
        let reg = InMemoryRegistry::default();
        let id = Address::from_low_u8(9);
        reg.insert(rain(id)).unwrap();

        let bet = reg.mark_resolved(&id, OperationId::new(), 1).unwrap();
        assert_eq!(bet.winner_label(), Some("no"));
        // same winner again: no-op
        reg.mark_resolved(&id, OperationId::new(), 1).unwrap();
        let err = reg.mark_resolved(&id, OperationId::new(), 0).unwrap_err();
        assert!(matches!(err, SidebetError::CacheDiverged { .. }));
        assert_eq!(reg.get(&id).unwrap().winner_option_index, Some(1));
    }

    #[test]
    fn resolve_out_of_range() {
        let reg = InMemoryRegistry::default();
        let id = Address::from_low_u8(9);
        reg.insert(rain(id)).unwrap();
        assert!(matches!(
            reg.mark_resolved(&id, OperationId::new(), 2),
            Err(SidebetError::Validation { .. })
        ));
    }

    #[test]
    fn unknown_bet() {
        let reg = InMemoryRegistry::default();
        let err = reg
            .confirm_stake(&Address::ZERO, OperationId::new(), 1)
            .unwrap_err();
        assert!(matches!(err, SidebetError::BetNotFound(_)));
    }

    #[test]
    fn merge_inserts_with_unknown_creator() {
        let reg = InMemoryRegistry::default();
        let id = Address::from_low_u8(9);
        let bet = reg
            .merge_snapshot(&id, snapshot(15, BetStatus::Open, 0))
            .unwrap();
        assert_eq!(bet.creator, None);
        assert_eq!(bet.total_amount, 15);
        assert_eq!(bet.winner_option_index, None);
    }

    #[test]
    fn merge_is_monotonic() {
        let reg = InMemoryRegistry::default();
        let id = Address::from_low_u8(9);
        reg.insert(rain(id)).unwrap();
        reg.add_stake(&id, OperationId::new(), 20).unwrap();

        // stale read: lower total is ignored
        let bet = reg
            .merge_snapshot(&id, snapshot(10, BetStatus::Open, 0))
            .unwrap();
        assert_eq!(bet.total_amount, 20);

        let bet = reg
            .merge_snapshot(&id, snapshot(25, BetStatus::Resolved, 0))
            .unwrap();
        assert_eq!(bet.total_amount, 25);
        assert_eq!(bet.status, BetStatus::Resolved);
        assert_eq!(bet.winner_option_index, Some(0));
        assert!(bet.creator.is_some(), "creator survives merge");

        // status never goes back
        let bet = reg
            .merge_snapshot(&id, snapshot(25, BetStatus::Open, 0))
            .unwrap();
        assert_eq!(bet.status, BetStatus::Resolved);
    }

    #[test]
    fn merge_detects_divergence() {
        let reg = InMemoryRegistry::default();
        let id = Address::from_low_u8(9);
        reg.insert(rain(id)).unwrap();
        reg.mark_resolved(&id, OperationId::new(), 0).unwrap();

        let err = reg
            .merge_snapshot(&id, snapshot(0, BetStatus::Resolved, 1))
            .unwrap_err();
        assert!(matches!(err, SidebetError::CacheDiverged { .. }));

        let mut renamed = snapshot(0, BetStatus::Open, 0);
        renamed.options = vec!["a".into(), "b".into(), "c".into()];
        assert!(reg.merge_snapshot(&id, renamed).is_err());
    }

    #[test]
    fn concurrent_stakes_are_not_lost() {
        let reg = Arc::new(InMemoryRegistry::default());
        let id = Address::from_low_u8(9);
        reg.insert(rain(id)).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        reg.add_stake(&id, OperationId::new(), 1).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(reg.get(&id).unwrap().total_amount, 800);
    }
}
