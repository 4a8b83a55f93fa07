//! # sidebet-engine
//!
//! **Bet Settlement Engine**: lifecycle orchestration over the ledger
//! gateway, with a local projection cache.
//!
//! ## Architecture
//!
//! [`SettlementEngine`] accepts create / join / resolve / claim requests and:
//! 1. Validates them against the cached [`Bet`](sidebet_types::Bet) projection
//! 2. Maps the requester's handle to a ledger address ([`IdentityResolver`])
//! 3. Routes to the ledger or to rehearsal ([`ModeSelector`])
//! 4. Applies the cache mutation once per operation ([`BetRegistry`],
//!    [`IdempotencyGuard`])
//!
//! ## Routes
//!
//! - **Ledger**: the cache moves only after the gateway reports the call
//!   confirmed, and stake totals are taken from the ledger. A call whose
//!   outcome is unknown is reconciled by reading the ledger before any retry.
//! - **Rehearsal**: on the expected network with the sentinel asset, joins
//!   and resolves touch the cache only. Creation still deploys.

pub mod engine;
pub mod idempotency;
pub mod identity;
pub mod mode;
pub mod registry;

pub use engine::SettlementEngine;
pub use idempotency::IdempotencyGuard;
pub use identity::{IdentityResolver, InMemoryIdentities};
pub use mode::{ModeSelector, RoutePolicy, select_route};
pub use registry::{BetRegistry, InMemoryRegistry};
