// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transaction orchestrator service and operator commands

use std::path::PathBuf;

use clap::Parser;
use log::{debug, info, warn, LevelFilter};
use serde::Serialize;

use cardvault_orchestrator::{
    ops::{self, BalanceRequest, PrepareTransactionRequest, SignAndSendRequest, TransactionStatusRequest},
    HttpNode, JsonFileStore, Orchestrator, OrchestratorConfig, TxStatus,
};

/// Default transaction table location when not configured
const DEFAULT_STORE: &str = "transactions.json";

/// Transaction orchestrator
#[derive(Clone, PartialEq, Debug, Parser)]
struct Options {
    /// Configuration file
    #[clap(long, env = "CARDVAULT_CONFIG")]
    config: PathBuf,

    /// Node JSON-RPC endpoint (overrides configuration)
    #[clap(long, env = "CARDVAULT_NODE_URL")]
    node: Option<String>,

    /// Transaction table file (overrides configuration)
    #[clap(long)]
    store: Option<PathBuf>,

    /// Subcommand to execute
    #[clap(subcommand)]
    cmd: Actions,

    /// Log level
    #[clap(long, default_value = "info")]
    log_level: LevelFilter,
}

#[derive(Clone, PartialEq, Debug, Parser)]
#[non_exhaustive]
enum Actions {
    /// Run the receipt sweeper until interrupted
    Serve,

    /// Fetch the balance of an account
    Balance {
        /// `0x` prefixed account address
        address: String,
    },

    /// Prepare a value transfer, returning the message hash to be signed
    Prepare {
        #[clap(long)]
        from: String,

        #[clap(long)]
        to: String,

        /// Value in wei
        #[clap(long)]
        value: String,
    },

    /// Submit a signature for a prepared transaction and broadcast it
    SignAndSend {
        /// Message hash returned by `prepare`
        #[clap(long)]
        message_hash: String,

        /// Hex encoded 65-byte `r || s || v` signature
        #[clap(long)]
        signature: String,

        /// Wait for the transaction to settle
        #[clap(long)]
        wait: bool,
    },

    /// Fetch transaction status by ID or message hash
    Status {
        /// Transaction ID or `0x` prefixed message hash
        id: TransactionStatusRequest,

        /// Check for a receipt before reporting
        #[clap(long)]
        refresh: bool,
    },
}

type Service = Orchestrator<HttpNode, JsonFileStore>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Options::parse();

    // Setup logging
    let mut c = simplelog::ConfigBuilder::new();
    c.add_filter_allow_str("cardvault");

    simplelog::SimpleLogger::init(args.log_level, c.build())?;

    // Load configuration, applying command line overrides
    let mut cfg = OrchestratorConfig::load(&args.config)?;
    if let Some(n) = &args.node {
        cfg.node_rpc_url = n.clone();
    }
    if let Some(s) = &args.store {
        cfg.store_path = Some(s.clone());
    }
    debug!("Using configuration: {:?}", cfg);

    let node = HttpNode::new(&cfg.node_rpc_url, cfg.rpc_timeout())?;

    let path = cfg
        .store_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE));
    let store = JsonFileStore::open(&path).await?;

    let o = Orchestrator::new(node, store, cfg);

    execute(&o, args.cmd).await
}

async fn execute(o: &Service, cmd: Actions) -> anyhow::Result<()> {
    match cmd {
        Actions::Serve => {
            info!(
                "Serving chain {} via {}",
                o.config().chain_id,
                o.config().node_rpc_url
            );

            let sweeper = o.spawn_sweeper();

            tokio::signal::ctrl_c().await?;

            o.shutdown();
            sweeper.await?;
        }
        Actions::Balance { address } => {
            let r = ops::get_balance(o, &BalanceRequest { address }).await?;

            output(&r)?;
        }
        Actions::Prepare { from, to, value } => {
            let req = PrepareTransactionRequest {
                from_address: from,
                to_address: to,
                value,
            };

            let r = ops::prepare_transaction(o, &req).await?;

            output(&r)?;
        }
        Actions::SignAndSend {
            message_hash,
            signature,
            wait,
        } => {
            let req = SignAndSendRequest {
                message_hash,
                signature,
            };

            let r = ops::sign_and_send_transaction(o, &req).await?;

            if wait {
                let s = wait_settled(o, r.transaction_id).await?;
                info!("transaction {} {}", r.transaction_id, s);
            }

            output(&r)?;
        }
        Actions::Status { id, refresh } => {
            if refresh {
                let r = ops::get_transaction_status(o, &id).await?;
                if let Err(e) = o.refresh(r.transaction_id).await {
                    warn!("Receipt check failed: {}", e);
                }
            }

            let r = ops::get_transaction_status(o, &id).await?;

            output(&r)?;
        }
    }

    Ok(())
}

/// Poll for a receipt at the configured cadence
async fn wait_settled(o: &Service, id: u64) -> anyhow::Result<TxStatus> {
    let tick = o.config().confirm_tick();

    for _ in 0..o.config().confirm_max_attempts {
        tokio::time::sleep(tick).await;

        match o.refresh(id).await {
            Ok(TxStatus::Submitted) => (),
            Ok(s) => return Ok(s),
            Err(e) if e.is_retryable() => warn!("Receipt check failed: {}", e),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(TxStatus::Submitted)
}

/// Write a response to stdout as JSON
fn output(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
