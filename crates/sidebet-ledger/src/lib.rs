//! # sidebet-ledger
//!
//! **Ledger Gateway**: the only part of Sidebet that speaks to the ledger.
//!
//! ## Architecture
//!
//! The gateway turns engine intents into ledger transactions and folds their
//! multi-stage lifecycle (submit → include → bury) into one awaited result:
//! 1. Pick the sender's next sequence number ([`NonceManager`])
//! 2. Attach an explicit gas limit and a bumped gas price
//! 3. Submit through a [`LedgerTransport`]
//! 4. Poll until the receipt is buried under the configured confirmation depth
//!
//! The gateway never retries a mutating call. Only the caller knows whether a
//! retry could double-apply a logical effect.
//!
//! ## Transports
//!
//! - [`JsonRpcTransport`]: EVM JSON-RPC over HTTP. Senders held in
//!   [`LocalKeys`] are signed in process; others go to the signer endpoint
//! - [`SimulatedLedger`]: in-process ledger executing the settlement contract,
//!   with fault injection for timeouts and outages

pub mod abi;
pub mod call;
pub mod gateway;
pub mod json_rpc;
pub mod nonce;
pub mod signing;
pub mod simulated;
pub mod transport;

pub use call::{CallOptions, ConstructorArgs, ContractCall, ReadCall, ReadValue, TxRequest};
pub use gateway::{Gateway, LedgerGateway};
pub use json_rpc::JsonRpcTransport;
pub use nonce::NonceManager;
pub use signing::{LocalKeys, SignedTx};
pub use simulated::{Fault, SimulatedLedger};
pub use transport::LedgerTransport;
