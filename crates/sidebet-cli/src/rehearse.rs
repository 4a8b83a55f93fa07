//! `sidebet rehearse`: the whole lifecycle against an in-process ledger.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use sidebet_engine::SettlementEngine;
use sidebet_ledger::{Gateway, LedgerGateway, SimulatedLedger};
use sidebet_types::{EngineConfig, Route, SidebetError, UserHandle, units};

/// Starting balance minted to each participant, in whole asset units.
const STARTING_BALANCE: i64 = 100;

/// Alice asks whether it rains tomorrow, Bob backs "yes" with 10, Carol backs
/// "no" with 5. Alice resolves "yes"; Bob's claim pays out, Carol's reverts.
pub async fn run(config: &EngineConfig) -> Result<Value> {
    let mut config = config.clone();
    config.ledger.confirmations = 1;
    config.ledger.poll_interval = Duration::from_millis(10);
    config.ledger.confirmation_timeout = Duration::from_secs(2);

    let asset = config.ledger.settlement_asset;
    let decimals = config.asset_decimals;
    let ledger = Arc::new(SimulatedLedger::new(config.ledger.expected_chain_id));
    let gateway: Arc<dyn LedgerGateway> =
        Arc::new(Gateway::new(Arc::clone(&ledger), config.ledger.clone()));
    let engine = SettlementEngine::in_memory(config, gateway);

    let alice = UserHandle::from("alice");
    let bob = UserHandle::from("bob");
    let carol = UserHandle::from("carol");

    let start = units::to_base_units(Decimal::from(STARTING_BALANCE), decimals)?;
    for who in [&bob, &carol] {
        let address = engine.identities().resolve(who)?;
        ledger.fund(asset, address, start);
    }

    let bet = engine
        .create(
            "Will it rain tomorrow?",
            vec!["yes".into(), "no".into()],
            &alice,
        )
        .await
        .context("creating the rehearsal bet")?;
    tracing::info!(bet_id = %bet.id, "Rehearsal bet deployed");

    let mut steps = Vec::new();
    for (who, option, amount) in [(&bob, 0, 10), (&carol, 1, 5)] {
        let stake = units::to_base_units(Decimal::from(amount), decimals)?;
        let receipt = engine
            .join(bet.id, option, stake, who)
            .await
            .with_context(|| format!("{who} joining option {option}"))?;
        steps.push(json!({ "step": format!("{who} joins option {option}"), "receipt": receipt }));
    }

    let receipt = engine
        .resolve(bet.id, 0, &alice)
        .await
        .context("resolving the rehearsal bet")?;
    steps.push(json!({ "step": "alice resolves option 0", "receipt": receipt }));

    let receipt = engine
        .claim(bet.id, &bob)
        .await
        .context("winning claim")?;
    steps.push(json!({ "step": "bob claims", "receipt": receipt }));

    match engine.claim(bet.id, &carol).await {
        Err(err @ SidebetError::ClaimFailed { .. }) => {
            steps.push(json!({ "step": "carol claims", "rejected": err.to_string() }));
        }
        Err(err) => return Err(err).context("losing claim"),
        Ok(receipt) if receipt.route == Route::Rehearsal => {
            steps.push(json!({ "step": "carol claims", "receipt": receipt }));
        }
        Ok(_) => bail!("a losing claim was paid out"),
    }

    let mut balances = serde_json::Map::new();
    for who in [&bob, &carol] {
        let address = engine.identities().resolve(who)?;
        let held = units::from_base_units(ledger.balance_of(asset, address), decimals);
        balances.insert(who.to_string(), json!(held));
    }

    let bet = engine.lookup(bet.id).await?;
    Ok(json!({
        "bet": bet,
        "steps": steps,
        "balances": balances,
        "submissions": ledger.submission_count(),
    }))
}
