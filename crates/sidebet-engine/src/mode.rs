//! Mode selection: rehearse in the cache, or go to the ledger.

use std::sync::Arc;

use sidebet_ledger::LedgerGateway;
use sidebet_types::{Address, LedgerConfig, Route};

/// The configured values the routing decision compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePolicy {
    pub expected_network_id: u64,
    pub rehearsal_sentinel: Address,
}

impl RoutePolicy {
    #[must_use]
    pub fn from_config(config: &LedgerConfig) -> Self {
        Self {
            expected_network_id: config.expected_chain_id,
            rehearsal_sentinel: config.rehearsal_sentinel,
        }
    }
}

/// Rehearsal only when the ledger is the expected network AND the asset is
/// the rehearsal sentinel. An unknown network id routes to the ledger.
#[must_use]
pub fn select_route(
    observed_network_id: Option<u64>,
    asset: Address,
    policy: &RoutePolicy,
) -> Route {
    match observed_network_id {
        Some(id) if id == policy.expected_network_id && asset == policy.rehearsal_sentinel => {
            Route::Rehearsal
        }
        _ => Route::Ledger,
    }
}

/// Reads the network id on every call and applies [`select_route`].
pub struct ModeSelector {
    gateway: Arc<dyn LedgerGateway>,
    policy: RoutePolicy,
    asset: Address,
}

impl ModeSelector {
    pub fn new(gateway: Arc<dyn LedgerGateway>, config: &LedgerConfig) -> Self {
        Self {
            gateway,
            policy: RoutePolicy::from_config(config),
            asset: config.settlement_asset,
        }
    }

    pub async fn route(&self) -> Route {
        let observed = match self.gateway.network_id().await {
            Ok(id) => Some(id),
            Err(err) => {
                tracing::debug!(error = %err, "Network id unavailable; routing to ledger");
                None
            }
        };
        let route = select_route(observed, self.asset, &self.policy);
        tracing::debug!(?observed, %route, "Route selected");
        route
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RoutePolicy {
        RoutePolicy {
            expected_network_id: 10143,
            rehearsal_sentinel: Address::from_low_u8(0x5e),
        }
    }

    #[test]
    fn truth_table() {
        let p = policy();
        let sentinel = p.rehearsal_sentinel;
        let real = Address::from_low_u8(0xaa);

        assert_eq!(select_route(Some(10143), sentinel, &p), Route::Rehearsal);
        assert_eq!(select_route(Some(10143), real, &p), Route::Ledger);
        assert_eq!(select_route(Some(1), sentinel, &p), Route::Ledger);
        assert_eq!(select_route(Some(1), real, &p), Route::Ledger);
        assert_eq!(select_route(None, sentinel, &p), Route::Ledger);
        assert_eq!(select_route(None, real, &p), Route::Ledger);
    }

    #[test]
    fn policy_from_config() {
        let cfg = LedgerConfig::default();
        let p = RoutePolicy::from_config(&cfg);
        assert_eq!(p.expected_network_id, cfg.expected_chain_id);
        assert_eq!(
            select_route(Some(cfg.expected_chain_id), cfg.settlement_asset, &p),
            Route::Rehearsal,
            "defaults describe a rehearsal deployment"
        );
    }
}
