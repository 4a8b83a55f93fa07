//! # sidebet-types
//!
//! Shared types, errors, and configuration for the **Sidebet** settlement engine.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`Address`], [`BetId`], [`UserHandle`], [`TxHash`], [`OperationId`]
//! - **Bet model**: [`Bet`], [`BetStatus`], [`BetSnapshot`], [`Participation`]
//! - **Receipts**: [`TxReceipt`], [`OperationReceipt`], [`Route`], [`Operation`]
//! - **Configuration**: [`EngineConfig`], [`LedgerConfig`], [`GasBudget`]
//! - **Errors**: [`SidebetError`] with `SB_ERR_` prefix codes
//! - **Units**: conversion between human amounts and the asset's smallest unit
//! - **Constants**: defaults and limits

pub mod bet;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod receipt;
pub mod units;

// Re-export all primary types at crate root for ergonomic imports:
//   use sidebet_types::{Bet, BetStatus, Address, SidebetError, ...};

pub use bet::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use receipt::*;

// Constants and unit helpers are accessed via their modules
// (`sidebet_types::constants::FOO`, `sidebet_types::units::to_base_units`).
