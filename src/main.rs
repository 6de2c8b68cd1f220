//! Oracle Mining Client CLI
//!
//! Commands: `mine`, `dataserver`, `stake`, `transfer`, `approve`,
//! `balance`, `dispute`. Configuration comes from a JSON file plus the
//! `NODE_URL` and `ETH_PRIVATE_KEY` environment variables.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy_primitives::U256;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use oracle_mining_client::chain::{Chain, ContractClient};
use oracle_mining_client::config::Config;
use oracle_mining_client::crypto;
use oracle_mining_client::db::{keys, DataProxy, LocalProxy, RemoteProxy, Store};
use oracle_mining_client::error::{Error, Result};
use oracle_mining_client::hashers;
use oracle_mining_client::mining::submitter::GateConfig;
use oracle_mining_client::mining::{MinerDeps, MiningGroup, MiningManager, WorkSource};
use oracle_mining_client::ops;
use oracle_mining_client::server::DataServerOps;
use oracle_mining_client::util;

/// Poll step of the shutdown grace loop
const STOP_POLL: Duration = Duration::from_millis(500);

/// Grace loop ticks before a slow-shutdown warning
const STOP_WARN_TICKS: u32 = 60;

#[derive(Parser, Debug)]
#[command(
    name = "oracle-mining-client",
    about = "Mining client for a decentralized price-oracle network",
    version
)]
struct Cli {
    /// Path to the primary JSON config file
    #[arg(long, global = true, default_value = "configs/config.json")]
    config: PathBuf,

    /// The level of log messages
    #[arg(long = "logLevel", global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mine for oracle rewards
    Mine {
        /// Connect to a remote data server instead of hosting one
        #[arg(long, short)]
        remote: bool,
    },
    /// Start an independent data server
    Dataserver,
    /// Staking operations
    Stake {
        #[command(subcommand)]
        op: StakeOp,
    },
    /// Send tokens to an address
    Transfer {
        /// Amount to transfer, e.g. "2.5"
        amount: String,
        /// Recipient public address
        address: String,
    },
    /// Approve a token allowance for an address
    Approve {
        /// Amount to approve
        amount: String,
        /// Spender public address
        address: String,
    },
    /// Check the balance of an address
    Balance {
        /// Address to check; defaults to the configured miner address
        address: Option<String>,
    },
    /// Dispute operations
    Dispute {
        #[command(subcommand)]
        op: DisputeOp,
    },
}

#[derive(Subcommand, Debug)]
enum StakeOp {
    /// Deposit the staking amount
    Deposit,
    /// Withdraw a previously requested stake
    Withdraw,
    /// Request to withdraw the stake
    Request,
    /// Show the current staking status
    Status,
}

#[derive(Subcommand, Debug)]
enum DisputeOp {
    /// Vote on an active dispute
    Vote {
        /// Dispute id
        dispute_id: u64,
        /// Whether you support the dispute (true|false)
        support: bool,
    },
    /// Start a new dispute
    New {
        /// Request id of the disputed value
        request_id: u64,
        /// Timestamp of the disputed value
        timestamp: u64,
        /// Miner slot to dispute (0-4)
        miner_index: u64,
    },
    /// Show existing disputes
    Show,
}

fn exit_on_error<T>(result: Result<T>, operation: &str) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            eprintln!("{operation} failed: {err}");
            std::process::exit(-1);
        }
    }
}

async fn connect_chain(cfg: &Config) -> Result<ContractClient> {
    let node_url = cfg.node_url()?;
    let signer = cfg.private_key()?;
    let contract = crypto::parse_address(&cfg.contract_address)?;
    ContractClient::connect(
        &node_url,
        cfg.eth_timeout(),
        contract,
        signer,
        cfg.gas_multiplier,
        cfg.gas_max,
    )
    .await
}

fn gate_config(cfg: &Config) -> GateConfig {
    GateConfig {
        profit_threshold: cfg.mine.profit_threshold,
        min_submit_period: cfg.mine.min_submit_period.get(),
        check_interval: cfg.mine.mining_interrupt_check_interval.get(),
        gas_multiplier: cfg.gas_multiplier,
        gas_max_gwei: cfg.gas_max,
    }
}

async fn read_dispute_status(proxy: &dyn DataProxy) -> Result<U256> {
    let raw = proxy
        .get(keys::DISPUTE_STATUS)
        .await?
        .ok_or_else(|| Error::invalid_state("dispute status not tracked yet"))?;
    let text = String::from_utf8_lossy(&raw);
    let trimmed = text.trim().trim_start_matches("0x");
    U256::from_str_radix(trimmed, 16)
        .map_err(|e| Error::invalid_state(format!("bad dispute status \"{text}\": {e}")))
}

/// Wait for the tracked running flags to clear, warning when shutdown drags
async fn stop_grace_loop(checks: &[(&str, Box<dyn Fn() -> bool + Send + Sync>)]) {
    let start = Instant::now();
    let mut ticks = 0u32;
    loop {
        ticks += 1;
        if checks.iter().all(|(_, stopped)| stopped()) {
            break;
        }
        if ticks > STOP_WARN_TICKS {
            warn!(waited = ?start.elapsed(), "taking longer than expected to stop operations");
        }
        tokio::time::sleep(STOP_POLL).await;
    }
    info!("main shutdown complete");
}

async fn mine(cfg: Config, remote: bool) {
    let chain = Arc::new(exit_on_error(
        connect_chain(&cfg).await,
        "connecting to chain node",
    ));
    let syncing = exit_on_error(chain.is_syncing().await, "checking node sync state");
    if syncing {
        exit_on_error::<()>(
            Err(Error::chain("chain node is still syncing with the network")),
            "checking node sync state",
        );
    }
    let address = exit_on_error(cfg.address(), "reading public address");
    let cancel = CancellationToken::new();

    let mut data_server: Option<Arc<DataServerOps>> = None;
    let proxy: Arc<dyn DataProxy> = if remote {
        let signer = exit_on_error(cfg.private_key(), "reading private key");
        Arc::new(exit_on_error(
            RemoteProxy::new(signer, &cfg.mine.remote_db_host, cfg.mine.remote_db_port),
            "opening remote data proxy",
        ))
    } else {
        let store = Arc::new(exit_on_error(
            Store::wipe_and_open(&cfg.db_file),
            "initializing database",
        ));
        let ds = Arc::new(exit_on_error(
            DataServerOps::new(&cfg, store.clone(), chain.clone() as Arc<dyn Chain>),
            "creating data server",
        ));
        exit_on_error(ds.start().await, "starting data server");
        ds.ready().await;
        data_server = Some(Arc::clone(&ds));
        Arc::new(LocalProxy::new(store, address))
    };

    // Refuse to mine unless the address is staked and undisputed.
    let status = exit_on_error(read_dispute_status(proxy.as_ref()).await, "checking miner");
    if status != U256::from(1u64) {
        exit_on_error::<()>(Err(Error::NotEligible), "checking miner");
    }

    let hasher_set = exit_on_error(hashers::setup_hashers(&cfg), "setting up hashers");
    let group = exit_on_error(MiningGroup::new(hasher_set), "creating mining group");
    let (source, work_rx) = WorkSource::new(Arc::clone(&proxy), address, cfg.mine.heartbeat.get());
    let deps = MinerDeps {
        proxy: Arc::clone(&proxy),
        chain: chain.clone() as Arc<dyn Chain>,
        address,
        gate: gate_config(&cfg),
    };
    let manager = MiningManager::new(deps, group, work_rx, cancel.child_token());
    let miner_running = manager.running_handle();

    tokio::spawn(source.run(cancel.child_token()));
    let mut manager_handle = tokio::spawn(manager.run());

    // Run until the operator interrupts or the manager dies on its own.
    let mut manager_result: Option<Result<()>> = None;
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            exit_on_error(signal.map_err(Error::from), "waiting for interrupt");
            info!("interrupt received, shutting down");
        }
        joined = &mut manager_handle => {
            manager_result = Some(join_result(joined));
        }
    }
    cancel.cancel();
    if let Some(ds) = data_server.clone() {
        tokio::spawn(async move { ds.stop().await });
    }

    let ds_check = data_server.clone();
    let checks: Vec<(&str, Box<dyn Fn() -> bool + Send + Sync>)> = vec![
        (
            "miner",
            Box::new(move || !miner_running.load(std::sync::atomic::Ordering::SeqCst)),
        ),
        (
            "dataServer",
            Box::new(move || ds_check.as_ref().map(|d| !d.is_running()).unwrap_or(true)),
        ),
    ];
    stop_grace_loop(&checks).await;

    let result = match manager_result {
        Some(result) => result,
        None => join_result(manager_handle.await),
    };
    exit_on_error(result, "mining");
}

fn join_result(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    match joined {
        Ok(result) => result,
        Err(err) => Err(Error::invalid_state(format!("mining manager panicked: {err}"))),
    }
}

async fn dataserver(cfg: Config) {
    let chain = Arc::new(exit_on_error(
        connect_chain(&cfg).await,
        "connecting to chain node",
    ));
    let store = Arc::new(exit_on_error(
        Store::wipe_and_open(&cfg.db_file),
        "initializing database",
    ));
    let ds = Arc::new(exit_on_error(
        DataServerOps::new(&cfg, store, chain as Arc<dyn Chain>),
        "creating data server",
    ));
    exit_on_error(ds.start().await, "starting data server");
    ds.ready().await;
    info!("data server ready");

    exit_on_error(
        tokio::signal::ctrl_c().await.map_err(Error::from),
        "waiting for interrupt",
    );
    info!("interrupt received, shutting down");
    let stopper = Arc::clone(&ds);
    tokio::spawn(async move { stopper.stop().await });

    let checks: Vec<(&str, Box<dyn Fn() -> bool + Send + Sync>)> = vec![(
        "dataServer",
        Box::new(move || !ds.is_running()),
    )];
    stop_grace_loop(&checks).await;
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let cfg = exit_on_error(Config::from_file(&cli.config), "parsing config file");
    util::init_logging(&cli.log_level, &cfg.logger);
    exit_on_error(cfg.load_env(), "loading environment");
    exit_on_error(cfg.validate_env(), "validating environment");

    match cli.command {
        Command::Mine { remote } => mine(cfg, remote).await,
        Command::Dataserver => dataserver(cfg).await,
        Command::Stake { op } => {
            let chain = exit_on_error(connect_chain(&cfg).await, "connecting to chain node");
            match op {
                StakeOp::Deposit => exit_on_error(ops::deposit(&chain).await, "stake deposit"),
                StakeOp::Withdraw => exit_on_error(ops::withdraw(&chain).await, "stake withdraw"),
                StakeOp::Request => {
                    exit_on_error(ops::request_withdraw(&chain).await, "stake request")
                }
                StakeOp::Status => {
                    let address = exit_on_error(cfg.address(), "reading public address");
                    exit_on_error(ops::show_status(&chain, address).await, "stake status")
                }
            }
        }
        Command::Transfer { amount, address } => {
            let chain = exit_on_error(connect_chain(&cfg).await, "connecting to chain node");
            let to = exit_on_error(crypto::parse_address(&address), "parsing address");
            let amount = exit_on_error(ops::parse_token_amount(&amount), "parsing amount");
            exit_on_error(ops::transfer(&chain, to, amount).await, "transfer");
        }
        Command::Approve { amount, address } => {
            let chain = exit_on_error(connect_chain(&cfg).await, "connecting to chain node");
            let spender = exit_on_error(crypto::parse_address(&address), "parsing address");
            let amount = exit_on_error(ops::parse_token_amount(&amount), "parsing amount");
            exit_on_error(ops::approve(&chain, spender, amount).await, "approve");
        }
        Command::Balance { address } => {
            let chain = exit_on_error(connect_chain(&cfg).await, "connecting to chain node");
            let target = match address {
                Some(raw) => exit_on_error(crypto::parse_address(&raw), "parsing address"),
                None => exit_on_error(cfg.address(), "reading public address"),
            };
            exit_on_error(ops::balance(&chain, target).await, "checking balance");
        }
        Command::Dispute { op } => {
            let chain = exit_on_error(connect_chain(&cfg).await, "connecting to chain node");
            match op {
                DisputeOp::Vote {
                    dispute_id,
                    support,
                } => exit_on_error(ops::vote(&chain, dispute_id, support).await, "vote"),
                DisputeOp::New {
                    request_id,
                    timestamp,
                    miner_index,
                } => exit_on_error(
                    ops::new_dispute(&chain, request_id, timestamp, miner_index).await,
                    "new dispute",
                ),
                DisputeOp::Show => exit_on_error(ops::show_disputes(&chain).await, "show disputes"),
            }
        }
    }
}
