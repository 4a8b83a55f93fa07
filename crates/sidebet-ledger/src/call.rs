//! Typed ledger intents: mutating calls, reads, and the transactions that
//! carry them.

use serde::{Deserialize, Serialize};
use sidebet_types::{
    Address, BetSnapshot, BetStatus, GasBudget, Participation, Result, SidebetError,
};

use crate::abi::{self, Decoder, Token, selectors};

/// Arguments of the settlement contract's constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructorArgs {
    pub title: String,
    pub options: Vec<String>,
    /// Asset stakes are denominated in.
    pub asset: Address,
}

impl ConstructorArgs {
    /// ABI-encoded constructor arguments, appended to the contract bytecode.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        abi::encode(&[
            Token::String(self.title.clone()),
            Token::StringArray(self.options.clone()),
            Token::Address(self.asset),
        ])
    }
}

/// A state-changing contract interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractCall {
    /// Deploy a new settlement instance.
    Instantiate(ConstructorArgs),
    /// `approve(spender, amount)` on the settlement asset.
    Approve { spender: Address, amount: u128 },
    /// `joinBet(optionIndex, amount)` on a bet instance.
    JoinBet { option_index: u64, amount: u128 },
    /// `resolveBet(winnerOptionIndex)` on a bet instance.
    ResolveBet { winner_option_index: u64 },
    /// `claimWinnings()` on a bet instance.
    ClaimWinnings,
}

impl ContractCall {
    /// Entry point name, for logs.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::Instantiate(_) => "constructor",
            Self::Approve { .. } => "approve",
            Self::JoinBet { .. } => "joinBet",
            Self::ResolveBet { .. } => "resolveBet",
            Self::ClaimWinnings => "claimWinnings",
        }
    }

    /// Gas limit for this call under `budget`.
    #[must_use]
    pub fn gas_limit(&self, budget: &GasBudget) -> u64 {
        match self {
            Self::Instantiate(_) => budget.deploy,
            Self::Approve { .. } => budget.approve,
            Self::JoinBet { .. } => budget.join,
            Self::ResolveBet { .. } => budget.resolve,
            Self::ClaimWinnings => budget.claim,
        }
    }

    /// Calldata for a call on an existing contract. Instantiation has no
    /// calldata of its own: its arguments follow the bytecode.
    #[must_use]
    pub fn calldata(&self) -> Vec<u8> {
        match self {
            Self::Instantiate(args) => args.encode(),
            Self::Approve { spender, amount } => abi::encode_call(
                selectors::APPROVE,
                &[Token::Address(*spender), Token::Uint(*amount)],
            ),
            Self::JoinBet {
                option_index,
                amount,
            } => abi::encode_call(
                selectors::JOIN_BET,
                &[Token::Uint(u128::from(*option_index)), Token::Uint(*amount)],
            ),
            Self::ResolveBet {
                winner_option_index,
            } => abi::encode_call(
                selectors::RESOLVE_BET,
                &[Token::Uint(u128::from(*winner_option_index))],
            ),
            Self::ClaimWinnings => abi::encode_call(selectors::CLAIM_WINNINGS, &[]),
        }
    }
}

/// Per-call submission options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Reuse this sequence number instead of taking the next one. Used to
    /// replace a timed-out transaction so at most one of them can land.
    pub nonce: Option<u64>,
}

impl CallOptions {
    #[must_use]
    pub fn replacing(nonce: u64) -> Self {
        Self { nonce: Some(nonce) }
    }
}

/// A fully specified transaction, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub from: Address,
    /// `None` for instantiation.
    pub to: Option<Address>,
    pub call: ContractCall,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub nonce: u64,
}

/// A non-mutating accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadCall {
    /// `getBetDetails()` on a bet instance.
    BetDetails,
    /// `getParticipation(participant)` on a bet instance.
    Participation { participant: Address },
    /// `allowance(owner, spender)` on the asset.
    Allowance { owner: Address, spender: Address },
    /// `balanceOf(owner)` on the asset.
    BalanceOf { owner: Address },
}

/// Decoded result of a [`ReadCall`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadValue {
    BetDetails(BetSnapshot),
    Participation(Participation),
    Amount(u128),
}

impl ReadCall {
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::BetDetails => "getBetDetails",
            Self::Participation { .. } => "getParticipation",
            Self::Allowance { .. } => "allowance",
            Self::BalanceOf { .. } => "balanceOf",
        }
    }

    #[must_use]
    pub fn calldata(&self) -> Vec<u8> {
        match self {
            Self::BetDetails => abi::encode_call(selectors::GET_BET_DETAILS, &[]),
            Self::Participation { participant } => {
                abi::encode_call(selectors::GET_PARTICIPATION, &[Token::Address(*participant)])
            }
            Self::Allowance { owner, spender } => abi::encode_call(
                selectors::ALLOWANCE,
                &[Token::Address(*owner), Token::Address(*spender)],
            ),
            Self::BalanceOf { owner } => {
                abi::encode_call(selectors::BALANCE_OF, &[Token::Address(*owner)])
            }
        }
    }

    /// Decode the raw return data of this accessor.
    pub fn decode(&self, data: &[u8]) -> Result<ReadValue> {
        if data.is_empty() {
            return Err(SidebetError::CallReverted {
                reason: format!("{} returned no data (no contract at address?)", self.method()),
            });
        }
        let d = Decoder::new(data);
        match self {
            Self::BetDetails => {
                let code = d.uint_u64(3)?;
                let status = u8::try_from(code)
                    .ok()
                    .and_then(BetStatus::from_code)
                    .ok_or_else(|| SidebetError::AbiDecode(format!("unknown bet status {code}")))?;
                Ok(ReadValue::BetDetails(BetSnapshot {
                    title: d.string(0)?,
                    options: d.string_array(1)?,
                    total_amount: d.uint(2)?,
                    status,
                    winner_option_index: d.uint_u64(4)?,
                }))
            }
            Self::Participation { .. } => Ok(ReadValue::Participation(Participation {
                option_index: d.uint_u64(0)?,
                amount: d.uint(1)?,
                claimed: d.bool(2)?,
            })),
            Self::Allowance { .. } | Self::BalanceOf { .. } => Ok(ReadValue::Amount(d.uint(0)?)),
        }
    }
}

impl ReadValue {
    /// Encode as the contract would return it. Used by the simulated ledger.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::BetDetails(s) => abi::encode(&[
                Token::String(s.title.clone()),
                Token::StringArray(s.options.clone()),
                Token::Uint(s.total_amount),
                Token::Uint(u128::from(s.status.code())),
                Token::Uint(u128::from(s.winner_option_index)),
            ]),
            Self::Participation(p) => abi::encode(&[
                Token::Uint(u128::from(p.option_index)),
                Token::Uint(p.amount),
                Token::Bool(p.claimed),
            ]),
            Self::Amount(v) => abi::encode(&[Token::Uint(*v)]),
        }
    }
}
