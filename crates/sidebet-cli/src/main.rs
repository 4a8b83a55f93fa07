//! `sidebet`: drive the settlement engine from the command line.
//!
//! Configuration comes from `SIDEBET_*` environment variables (a `.env` file
//! is honored). Every command prints pretty JSON on stdout; logs go to
//! stderr.
//!
//! Usage:
//!   sidebet --user alice create "Will it rain tomorrow?" yes no
//!   sidebet --user bob join 0x… --option 0 --amount 10
//!   sidebet --user alice resolve 0x… --winner 0
//!   sidebet --user bob claim 0x…
//!   sidebet --user carol --address 0x… join 0x… --option 1 --amount 5
//!   sidebet rehearse
//!
//! Handles are remembered between runs in the identity book
//! (`--identities`). A handle seen for the first time gets a fresh key,
//! kept in the book and used to sign its transactions locally; fund that
//! address before it joins. `--address` instead binds the handle to a
//! wallet the signer endpoint holds.

mod identity_book;
mod rehearse;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use sidebet_engine::{IdentityResolver, InMemoryIdentities, InMemoryRegistry, SettlementEngine};
use sidebet_ledger::{Gateway, JsonRpcTransport, LedgerGateway};
use sidebet_types::{Address, Bet, BetId, EngineConfig, UserHandle, constants, units};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sidebet", version = constants::VERSION)]
#[command(about = "Create, join, resolve and claim ledger-settled bets")]
struct Cli {
    /// Requester handle (chat user id or name)
    #[arg(long, global = true, env = "SIDEBET_USER")]
    user: Option<String>,

    /// Wallet the requester already controls; bound to --user before the command runs
    #[arg(long, global = true)]
    address: Option<Address>,

    /// Identity book: handles, their addresses and locally held keys
    #[arg(
        long,
        global = true,
        env = "SIDEBET_IDENTITIES",
        default_value = "sidebet-identities.json"
    )]
    identities: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploy a new bet
    Create {
        title: String,
        /// Outcome labels, in index order
        #[arg(required = true, num_args = 2..)]
        options: Vec<String>,
    },
    /// Stake on one outcome
    Join {
        bet: BetId,
        #[arg(long)]
        option: usize,
        /// Human amount in the settlement asset (e.g. 10.5)
        #[arg(long)]
        amount: Decimal,
    },
    /// Declare the winning outcome (creator only)
    Resolve {
        bet: BetId,
        #[arg(long)]
        winner: usize,
    },
    /// Collect winnings from a resolved bet
    Claim { bet: BetId },
    /// Print the bet as the ledger reports it
    Show { bet: BetId },
    /// Print the requester's position in a bet
    Participation { bet: BetId },
    /// Run the full lifecycle against an in-process simulated ledger
    Rehearse,
}

/// A bet with human-readable amounts.
#[derive(Serialize)]
struct BetView {
    #[serde(flatten)]
    bet: Bet,
    total: Option<Decimal>,
    winner: Option<String>,
}

impl BetView {
    fn new(bet: Bet, decimals: u32) -> Self {
        Self {
            total: units::from_base_units(bet.total_amount, decimals),
            winner: bet.winner_label().map(str::to_string),
            bet,
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("rendering output")?
    );
    Ok(())
}

/// Engine over the configured JSON-RPC ledger, signing locally for every
/// key in the identity book. Nothing is dialed until the first request.
fn connect(config: &EngineConfig, identities: &Arc<InMemoryIdentities>) -> Result<SettlementEngine> {
    let transport = JsonRpcTransport::new(&config.ledger)
        .context("building JSON-RPC transport")?
        .with_keys(Arc::clone(identities.keys()));
    let gateway: Arc<dyn LedgerGateway> =
        Arc::new(Gateway::new(transport, config.ledger.clone()));
    let registry = Arc::new(InMemoryRegistry::new(config.idempotency_cache_size));
    let resolver: Arc<dyn IdentityResolver> = Arc::<InMemoryIdentities>::clone(identities);
    Ok(SettlementEngine::new(config.clone(), gateway, registry, resolver))
}

fn requester(cli: &Cli, engine: &SettlementEngine) -> Result<UserHandle> {
    let handle = UserHandle::new(cli.user.clone().context("--user is required")?);
    if let Some(address) = cli.address {
        engine
            .identities()
            .associate(&handle, address)
            .with_context(|| format!("binding {handle} to {address}"))?;
    }
    Ok(handle)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = EngineConfig::from_env().context("loading SIDEBET_* configuration")?;
    if matches!(cli.command, Command::Rehearse) {
        return print(&rehearse::run(&config).await?);
    }

    let identities = Arc::new(identity_book::load(&cli.identities)?);
    let engine = connect(&config, &identities)?;
    let outcome = run(&cli, &engine, config.asset_decimals).await;
    // identities minted by a failed command are kept too
    identity_book::save(&cli.identities, &identities)?;
    outcome
}

async fn run(cli: &Cli, engine: &SettlementEngine, decimals: u32) -> Result<()> {
    match &cli.command {
        Command::Create { title, options } => {
            let user = requester(cli, engine)?;
            let bet = engine
                .create(title, options.clone(), &user)
                .await
                .context("create failed")?;
            print(&BetView::new(bet, decimals))
        }
        Command::Join {
            bet,
            option,
            amount,
        } => {
            let user = requester(cli, engine)?;
            let stake = units::to_base_units(*amount, decimals)?;
            let receipt = engine
                .join(*bet, *option, stake, &user)
                .await
                .context("join failed")?;
            print(&receipt)
        }
        Command::Resolve { bet, winner } => {
            let user = requester(cli, engine)?;
            let receipt = engine
                .resolve(*bet, *winner, &user)
                .await
                .context("resolve failed")?;
            print(&receipt)
        }
        Command::Claim { bet } => {
            let user = requester(cli, engine)?;
            let receipt = engine
                .claim(*bet, &user)
                .await
                .context("claim failed")?;
            print(&receipt)
        }
        Command::Show { bet } => {
            let bet = engine.lookup(*bet).await.context("lookup failed")?;
            print(&BetView::new(bet, decimals))
        }
        Command::Participation { bet } => {
            let user = requester(cli, engine)?;
            let position = engine
                .participation(*bet, &user)
                .await
                .context("participation read failed")?;
            print(&position)
        }
        Command::Rehearse => print(&rehearse::run(engine.config()).await?),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_join() {
        let cli = Cli::try_parse_from([
            "sidebet",
            "--user",
            "bob",
            "join",
            "0x00000000000000000000000000000000000000aa",
            "--option",
            "1",
            "--amount",
            "10.5",
        ])
        .unwrap();
        assert_eq!(cli.user.as_deref(), Some("bob"));
        match cli.command {
            Command::Join { option, amount, .. } => {
                assert_eq!(option, 1);
                assert_eq!(amount, Decimal::new(105, 1));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn identity_book_location() {
        let cli = Cli::try_parse_from([
            "sidebet",
            "show",
            "0x00000000000000000000000000000000000000aa",
        ])
        .unwrap();
        assert_eq!(cli.identities, PathBuf::from("sidebet-identities.json"));

        let cli = Cli::try_parse_from([
            "sidebet",
            "claim",
            "0x00000000000000000000000000000000000000aa",
            "--identities",
            "/tmp/book.json",
        ])
        .unwrap();
        assert_eq!(cli.identities, PathBuf::from("/tmp/book.json"));
    }

    /// A handle resolved in one run is the same key-backed address in the
    /// next, so the creator can still resolve its bet.
    #[test]
    fn creator_is_stable_across_runs() {
        let book = std::env::temp_dir().join(format!(
            "sidebet-cli-{}.json",
            sidebet_types::OperationId::new().0
        ));
        let config = EngineConfig::default();
        let alice = UserHandle::from("alice");

        let first = Arc::new(identity_book::load(&book).unwrap());
        let engine = connect(&config, &first).unwrap();
        let created_as = engine.identities().resolve(&alice).unwrap();
        identity_book::save(&book, &first).unwrap();

        let second = Arc::new(identity_book::load(&book).unwrap());
        let engine = connect(&config, &second).unwrap();
        assert_eq!(requester_address(&engine, &alice), created_as);
        assert!(second.keys().holds(&created_as), "can still sign as the creator");
        std::fs::remove_file(&book).unwrap();
    }

    fn requester_address(engine: &SettlementEngine, handle: &UserHandle) -> Address {
        engine.identities().lookup(handle).unwrap()
    }

    #[test]
    fn create_needs_two_options() {
        assert!(Cli::try_parse_from(["sidebet", "create", "Solo", "only"]).is_err());
        assert!(Cli::try_parse_from(["sidebet", "create", "Duo", "a", "b"]).is_ok());
    }

    #[tokio::test]
    async fn rehearsal_pays_the_winner() {
        let config = EngineConfig {
            ledger: sidebet_types::LedgerConfig {
                settlement_asset: "0x00000000000000000000000000000000000000aa".parse().unwrap(),
                ..Default::default()
            },
            ..EngineConfig::default()
        };
        let report = rehearse::run(&config).await.unwrap();

        assert_eq!(report["bet"]["status"], "Resolved");
        assert_eq!(report["bet"]["total_amount"], serde_json::json!(15_000_000u128));
        assert_eq!(report["balances"]["bob"], "105");
        assert_eq!(report["balances"]["carol"], "95");
        assert!(report["steps"][4]["rejected"].is_string());
    }
}
