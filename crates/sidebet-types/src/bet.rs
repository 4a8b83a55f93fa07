//! Bet projection types.
//!
//! A [`Bet`] is the locally cached view of one settlement contract instance.
//!
//! ## State Machine
//!
//! ```text
//!   ┌──────┐  resolve   ┌──────────┐
//!   │ OPEN ├───────────▶│ RESOLVED │◀──┐ claim
//!   └──┬───┘            └────┬─────┘───┘
//!      │ join                │
//!      └──▶ OPEN             ▼ (terminal)
//! ```
//!
//! `CLOSED` is representable because the ledger can report it, but no engine
//! operation moves a bet into it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Address, BetId, Operation};

/// Lifecycle status of a bet. Wire encoding matches the contract's enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum BetStatus {
    Open,
    /// Reserved; never entered through engine operations.
    Closed,
    Resolved,
}

impl BetStatus {
    /// Decode the contract's `uint8` status.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Open),
            1 => Some(Self::Closed),
            2 => Some(Self::Resolved),
            _ => None,
        }
    }

    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Closed => 1,
            Self::Resolved => 2,
        }
    }

    /// Whether `op` is permitted from this status.
    #[must_use]
    pub fn permits(self, op: Operation) -> bool {
        match op {
            Operation::Join | Operation::Resolve => self == Self::Open,
            Operation::Claim => self == Self::Resolved,
            Operation::Create => false,
        }
    }

    /// Forward-only ordering used when merging ledger reads into the cache.
    #[must_use]
    pub fn rank(self) -> u8 {
        self.code()
    }
}

impl fmt::Display for BetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Closed => write!(f, "CLOSED"),
            Self::Resolved => write!(f, "RESOLVED"),
        }
    }
}

/// Cached projection of one bet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    /// Instance address of the bet's settlement contract.
    pub id: BetId,
    pub title: String,
    /// Outcome labels; the index is the canonical outcome reference.
    pub options: Vec<String>,
    /// Accumulated stake in the settlement asset's smallest unit.
    pub total_amount: u128,
    pub status: BetStatus,
    /// `None` when the projection was populated from a ledger read.
    pub creator: Option<Address>,
    pub winner_option_index: Option<usize>,
    /// When this projection entered the local cache.
    pub created_at: DateTime<Utc>,
}

impl Bet {
    /// A freshly created, open bet with no stake.
    #[must_use]
    pub fn open(id: BetId, title: String, options: Vec<String>, creator: Address) -> Self {
        Self {
            id,
            title,
            options,
            total_amount: 0,
            status: BetStatus::Open,
            creator: Some(creator),
            winner_option_index: None,
            created_at: Utc::now(),
        }
    }

    /// Build a projection from a ledger snapshot. The creator is unknown.
    #[must_use]
    pub fn from_snapshot(id: BetId, snapshot: BetSnapshot) -> Self {
        let winner_option_index = snapshot.winner();
        Self {
            id,
            title: snapshot.title,
            options: snapshot.options,
            total_amount: snapshot.total_amount,
            status: snapshot.status,
            creator: None,
            winner_option_index,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn option_count(&self) -> usize {
        self.options.len()
    }

    #[must_use]
    pub fn is_valid_option(&self, index: usize) -> bool {
        index < self.options.len()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == BetStatus::Open
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.status == BetStatus::Resolved
    }

    /// Label of the winning option, once resolved.
    #[must_use]
    pub fn winner_label(&self) -> Option<&str> {
        self.winner_option_index
            .and_then(|i| self.options.get(i))
            .map(String::as_str)
    }
}

/// Public state of a settlement instance as read from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetSnapshot {
    pub title: String,
    pub options: Vec<String>,
    pub total_amount: u128,
    pub status: BetStatus,
    /// Raw winner slot. Only meaningful when `status == Resolved`.
    pub winner_option_index: u64,
}

impl BetSnapshot {
    /// Winner index if the instance is resolved and the index is in range.
    #[must_use]
    pub fn winner(&self) -> Option<usize> {
        if self.status != BetStatus::Resolved {
            return None;
        }
        usize::try_from(self.winner_option_index)
            .ok()
            .filter(|i| *i < self.options.len())
    }
}

/// One participant's position in a bet, as read from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Participation {
    pub option_index: u64,
    /// Cumulative stake in smallest units. Zero means "never joined".
    pub amount: u128,
    pub claimed: bool,
}

impl Participation {
    #[must_use]
    pub fn has_joined(&self) -> bool {
        self.amount > 0
    }
}
