//! Configuration types for the settlement engine and its ledger gateway.
//!
//! Configuration is read from `SIDEBET_*` environment variables. The loader
//! takes a lookup function so it can be exercised without touching the
//! process environment.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Address, Result, SidebetError, constants};

/// Gas limits per contract entry point. Always sent explicitly; the target
/// network is fee-volatile and under-estimation is rejected silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasBudget {
    pub deploy: u64,
    pub approve: u64,
    pub join: u64,
    pub resolve: u64,
    pub claim: u64,
}

impl Default for GasBudget {
    fn default() -> Self {
        Self {
            deploy: constants::DEFAULT_DEPLOY_GAS,
            approve: constants::DEFAULT_APPROVE_GAS,
            join: constants::DEFAULT_JOIN_GAS,
            resolve: constants::DEFAULT_RESOLVE_GAS,
            claim: constants::DEFAULT_CLAIM_GAS,
        }
    }
}

/// Everything the ledger gateway and mode selector need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint used for reads and receipts.
    pub rpc_url: String,
    /// Endpoint that signs and forwards `eth_sendTransaction`.
    /// Defaults to `rpc_url`.
    pub signer_url: Option<String>,
    /// Bearer credential presented to the signer endpoint.
    #[serde(skip_serializing)]
    pub signer_credential: Option<String>,
    /// Network id the deployment expects to be talking to.
    pub expected_chain_id: u64,
    /// Address of the fungible asset stakes are denominated in.
    pub settlement_asset: Address,
    /// Asset address that marks a rehearsal deployment.
    pub rehearsal_sentinel: Address,
    /// Compiled settlement contract artifact (`{"abi": .., "bytecode": ..}`).
    pub contract_artifact: Option<PathBuf>,
    /// Blocks required after inclusion, counting the inclusion block.
    pub confirmations: u64,
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
    /// Multiplier applied to the node's gas price quote, in percent.
    pub gas_price_bump_pct: u64,
    pub gas: GasBudget,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        let sentinel: Address = constants::DEFAULT_REHEARSAL_SENTINEL
            .parse()
            .unwrap_or(Address::ZERO);
        Self {
            rpc_url: constants::DEFAULT_RPC_URL.to_string(),
            signer_url: None,
            signer_credential: None,
            expected_chain_id: constants::DEFAULT_CHAIN_ID,
            settlement_asset: sentinel,
            rehearsal_sentinel: sentinel,
            contract_artifact: None,
            confirmations: constants::DEFAULT_CONFIRMATIONS,
            confirmation_timeout: Duration::from_millis(constants::DEFAULT_CONFIRMATION_TIMEOUT_MS),
            poll_interval: Duration::from_millis(constants::DEFAULT_POLL_INTERVAL_MS),
            gas_price_bump_pct: constants::DEFAULT_GAS_PRICE_BUMP_PCT,
            gas: GasBudget::default(),
        }
    }
}

impl LedgerConfig {
    /// The endpoint mutating calls are sent to.
    #[must_use]
    pub fn signer_endpoint(&self) -> &str {
        self.signer_url.as_deref().unwrap_or(&self.rpc_url)
    }

    /// Whether joins must grant an allowance before staking.
    #[must_use]
    pub fn asset_requires_approval(&self) -> bool {
        constants::NATIVE_ASSET_PLACEHOLDER
            .parse::<Address>()
            .map_or(true, |native| native != self.settlement_asset)
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub ledger: LedgerConfig,
    /// Decimals of the settlement asset, for human-facing amounts.
    pub asset_decimals: u32,
    /// How many operation ids the idempotency guard remembers.
    pub idempotency_cache_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig::default(),
            asset_decimals: constants::DEFAULT_ASSET_DECIMALS,
            idempotency_cache_size: constants::OPERATION_IDEMPOTENCY_CACHE_SIZE,
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| SidebetError::Configuration(format!("{key}={raw:?}: {e}")))
}

impl EngineConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let l = &mut cfg.ledger;

        if let Some(v) = lookup("SIDEBET_RPC_URL") {
            l.rpc_url = v;
        }
        if let Some(v) = lookup("SIDEBET_SIGNER_URL") {
            l.signer_url = Some(v);
        }
        if let Some(v) = lookup("SIDEBET_SIGNER_CREDENTIAL") {
            l.signer_credential = Some(v);
        }
        if let Some(v) = lookup("SIDEBET_CHAIN_ID") {
            l.expected_chain_id = parse_var("SIDEBET_CHAIN_ID", &v)?;
        }
        if let Some(v) = lookup("SIDEBET_SETTLEMENT_ASSET") {
            l.settlement_asset = parse_var("SIDEBET_SETTLEMENT_ASSET", &v)?;
        }
        if let Some(v) = lookup("SIDEBET_REHEARSAL_SENTINEL") {
            l.rehearsal_sentinel = parse_var("SIDEBET_REHEARSAL_SENTINEL", &v)?;
        }
        if let Some(v) = lookup("SIDEBET_CONTRACT_ARTIFACT") {
            l.contract_artifact = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("SIDEBET_CONFIRMATIONS") {
            l.confirmations = parse_var("SIDEBET_CONFIRMATIONS", &v)?;
        }
        if let Some(v) = lookup("SIDEBET_CONFIRMATION_TIMEOUT_MS") {
            l.confirmation_timeout =
                Duration::from_millis(parse_var("SIDEBET_CONFIRMATION_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = lookup("SIDEBET_POLL_INTERVAL_MS") {
            l.poll_interval = Duration::from_millis(parse_var("SIDEBET_POLL_INTERVAL_MS", &v)?);
        }
        if let Some(v) = lookup("SIDEBET_GAS_PRICE_BUMP_PCT") {
            l.gas_price_bump_pct = parse_var("SIDEBET_GAS_PRICE_BUMP_PCT", &v)?;
        }
        if let Some(v) = lookup("SIDEBET_JOIN_GAS") {
            l.gas.join = parse_var("SIDEBET_JOIN_GAS", &v)?;
        }
        if let Some(v) = lookup("SIDEBET_DEPLOY_GAS") {
            l.gas.deploy = parse_var("SIDEBET_DEPLOY_GAS", &v)?;
        }
        if let Some(v) = lookup("SIDEBET_ASSET_DECIMALS") {
            cfg.asset_decimals = parse_var("SIDEBET_ASSET_DECIMALS", &v)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings the gateway cannot operate with.
    pub fn validate(&self) -> Result<()> {
        let l = &self.ledger;
        if l.rpc_url.trim().is_empty() {
            return Err(SidebetError::Configuration("rpc_url is empty".into()));
        }
        if l.confirmations == 0 {
            return Err(SidebetError::Configuration(
                "confirmations must be at least 1".into(),
            ));
        }
        if l.confirmation_timeout.is_zero() || l.poll_interval.is_zero() {
            return Err(SidebetError::Configuration(
                "confirmation_timeout and poll_interval must be non-zero".into(),
            ));
        }
        if l.poll_interval > l.confirmation_timeout {
            return Err(SidebetError::Configuration(
                "poll_interval exceeds confirmation_timeout".into(),
            ));
        }
        let g = &l.gas;
        if [g.deploy, g.approve, g.join, g.resolve, g.claim].contains(&0) {
            return Err(SidebetError::Configuration(
                "gas limits must be non-zero".into(),
            ));
        }
        if l.gas_price_bump_pct < 100 {
            return Err(SidebetError::Configuration(
                "gas_price_bump_pct below 100 would underprice transactions".into(),
            ));
        }
        if self.asset_decimals > 28 {
            return Err(SidebetError::Configuration(
                "asset_decimals above 28 cannot be represented".into(),
            ));
        }
        if self.idempotency_cache_size == 0 {
            return Err(SidebetError::Configuration(
                "idempotency_cache_size must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = EngineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.ledger.expected_chain_id, 10143);
        assert_eq!(cfg.ledger.gas.join, 300_000);
        assert_eq!(cfg.asset_decimals, 6);
        // Defaults describe a rehearsal deployment.
        assert_eq!(cfg.ledger.settlement_asset, cfg.ledger.rehearsal_sentinel);
    }

    #[test]
    fn empty_lookup_gives_defaults() {
        let cfg = EngineConfig::from_lookup(|_| None).unwrap();
        assert_eq!(cfg.ledger.rpc_url, constants::DEFAULT_RPC_URL);
        assert_eq!(cfg.ledger.signer_endpoint(), constants::DEFAULT_RPC_URL);
    }

    #[test]
    fn lookup_overrides() {
        let cfg = EngineConfig::from_lookup(lookup_from(&[
            ("SIDEBET_RPC_URL", "http://localhost:8545"),
            ("SIDEBET_SIGNER_URL", "http://localhost:9000"),
            ("SIDEBET_CHAIN_ID", "31337"),
            (
                "SIDEBET_SETTLEMENT_ASSET",
                "0x1111111111111111111111111111111111111111",
            ),
            ("SIDEBET_CONFIRMATIONS", "3"),
            ("SIDEBET_CONFIRMATION_TIMEOUT_MS", "5000"),
            ("SIDEBET_POLL_INTERVAL_MS", "50"),
        ]))
        .unwrap();
        assert_eq!(cfg.ledger.rpc_url, "http://localhost:8545");
        assert_eq!(cfg.ledger.signer_endpoint(), "http://localhost:9000");
        assert_eq!(cfg.ledger.expected_chain_id, 31337);
        assert_eq!(cfg.ledger.confirmations, 3);
        assert_eq!(cfg.ledger.confirmation_timeout, Duration::from_secs(5));
        assert_ne!(cfg.ledger.settlement_asset, cfg.ledger.rehearsal_sentinel);
    }

    #[test]
    fn malformed_value_is_configuration_error() {
        let err = EngineConfig::from_lookup(lookup_from(&[("SIDEBET_CHAIN_ID", "monad")]))
            .unwrap_err();
        assert!(matches!(err, SidebetError::Configuration(_)), "{err:?}");
        assert!(err.to_string().contains("SIDEBET_CHAIN_ID"));
    }

    #[test]
    fn zero_confirmations_rejected() {
        let err = EngineConfig::from_lookup(lookup_from(&[("SIDEBET_CONFIRMATIONS", "0")]))
            .unwrap_err();
        assert!(matches!(err, SidebetError::Configuration(_)));
    }

    #[test]
    fn native_asset_skips_approval() {
        let mut cfg = LedgerConfig::default();
        assert!(cfg.asset_requires_approval());
        cfg.settlement_asset = constants::NATIVE_ASSET_PLACEHOLDER.parse().unwrap();
        assert!(!cfg.asset_requires_approval());
    }

    #[test]
    fn credential_not_serialized() {
        let mut cfg = EngineConfig::default();
        cfg.ledger.signer_credential = Some("secret-token".into());
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("secret-token"));
    }
}
