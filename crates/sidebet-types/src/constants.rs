//! System-wide constants for the Sidebet settlement engine.

/// Default chain id of the target network (Monad testnet).
pub const DEFAULT_CHAIN_ID: u64 = 10143;

/// Default JSON-RPC endpoint.
pub const DEFAULT_RPC_URL: &str = "https://testnet-rpc.monad.xyz";

/// Asset address that marks a rehearsal deployment. When the configured
/// settlement asset equals this value on the expected network, mutating
/// operations are applied to the cache only.
pub const DEFAULT_REHEARSAL_SENTINEL: &str = "0x3D2747e4D6F0Fe22cf3E6A336acca74bEed9abc5";

/// Conventional placeholder for the ledger's native asset. Joins against a
/// native-asset bet skip the allowance step.
pub const NATIVE_ASSET_PLACEHOLDER: &str = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE";

/// Decimals of the default settlement asset (USDC).
pub const DEFAULT_ASSET_DECIMALS: u32 = 6;

/// Confirmations required after inclusion before a call is treated as final.
pub const DEFAULT_CONFIRMATIONS: u64 = 2;

/// Default confirmation wait budget in milliseconds.
pub const DEFAULT_CONFIRMATION_TIMEOUT_MS: u64 = 120_000;

/// Default receipt polling interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Gas price multiplier applied to the node's quote, in percent.
pub const DEFAULT_GAS_PRICE_BUMP_PCT: u64 = 120;

/// Gas limit for instantiating a settlement contract.
pub const DEFAULT_DEPLOY_GAS: u64 = 3_000_000;

/// Gas limit for `approve` on the settlement asset.
pub const DEFAULT_APPROVE_GAS: u64 = 100_000;

/// Gas limit for `joinBet`.
pub const DEFAULT_JOIN_GAS: u64 = 300_000;

/// Gas limit for `resolveBet`.
pub const DEFAULT_RESOLVE_GAS: u64 = 200_000;

/// Gas limit for `claimWinnings`.
pub const DEFAULT_CLAIM_GAS: u64 = 200_000;

/// Minimum number of outcomes per bet.
pub const MIN_OPTIONS: usize = 2;

/// Maximum number of outcomes per bet.
pub const MAX_OPTIONS: usize = 32;

/// Maximum title length in bytes.
pub const MAX_TITLE_LEN: usize = 256;

/// Operation idempotency cache size (number of operation ids to remember).
pub const OPERATION_IDEMPOTENCY_CACHE_SIZE: usize = 100_000;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "Sidebet";
