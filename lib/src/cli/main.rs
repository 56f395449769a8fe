// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Command line utility for interacting with the vault applet and custodied accounts

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;
use log::{debug, info, LevelFilter};
use serde::Serialize;

use cardvault::{
    config::VaultConfig, normalize::record_key, BlobStore, CardHandle, Custodian,
    GenericHandle, GenericTransport, LocalAuthorizer, MpcRunner, ShareVault, Transport,
};

mod helpers;
use helpers::*;

/// Vault command line utility
#[derive(Clone, PartialEq, Debug, Parser)]
struct Options {
    /// Card transport
    #[clap(long, value_enum, default_value = "pcsc", env = "CARDVAULT_TARGET")]
    target: Target,

    /// Simulator address for TCP transport
    #[clap(long, default_value = "127.0.0.1:1237", env = "CARDVAULT_SIM_ADDR")]
    sim_addr: SocketAddr,

    /// Configuration file
    #[clap(long, env = "CARDVAULT_CONFIG")]
    config: Option<PathBuf>,

    /// Reader name filter (overrides configuration)
    #[clap(long)]
    reader: Option<String>,

    /// Authorisation key file, hex encoded P-256 scalar (overrides configuration)
    #[clap(long, env = "CARDVAULT_AUTH_KEY")]
    auth_key: Option<PathBuf>,

    /// MPC binary (overrides configuration)
    #[clap(long)]
    mpc_binary: Option<PathBuf>,

    /// Share blob directory (overrides configuration)
    #[clap(long)]
    blob_dir: Option<PathBuf>,

    /// Card APDU timeout in seconds (overrides configuration)
    #[clap(long)]
    card_timeout: Option<u64>,

    /// Subcommand to execute
    #[clap(subcommand)]
    cmd: Actions,

    /// Enable verbose logging
    #[clap(long, default_value = "info")]
    log_level: LevelFilter,
}

/// Card connection target
#[derive(Copy, Clone, PartialEq, Debug, clap::ValueEnum, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[non_exhaustive]
enum Target {
    /// PC/SC smart card reader
    Pcsc,
    /// TCP connection to cardvault-sim
    Tcp,
}

#[derive(Clone, PartialEq, Debug, Parser)]
#[non_exhaustive]
enum Actions {
    /// List available PC/SC readers
    Readers,

    /// Fetch card production life cycle data
    Cplc,

    /// Store a raw 32-byte message for (user, address)
    Store {
        #[clap(long)]
        user: String,

        #[clap(long)]
        address: String,

        /// Hex encoded 32-byte message
        #[clap(long)]
        message: HexData<32>,
    },

    /// Read the raw message for (user, address)
    Read {
        #[clap(long)]
        user: String,

        #[clap(long)]
        address: String,

        /// DER signature, signed with the authorisation key if omitted
        #[clap(long)]
        signature: Option<HexVec>,
    },

    /// Delete the record for (user, address)
    Delete {
        #[clap(long)]
        user: String,

        #[clap(long)]
        address: String,

        /// DER signature, signed with the authorisation key if omitted
        #[clap(long)]
        signature: Option<HexVec>,
    },

    /// Create an account via MPC keygen, wrapping the share to the card
    CreateAccount {
        #[clap(long)]
        user: String,

        #[clap(long, default_value = "2")]
        threshold: u16,

        #[clap(long, default_value = "3")]
        parties: u16,

        #[clap(long)]
        index: u16,

        /// Write account information to a `.json` file
        #[clap(long)]
        output: Option<PathBuf>,
    },

    /// Sign a 32-byte message hash with a custodied account
    SignMessage {
        #[clap(long)]
        user: String,

        #[clap(long)]
        address: String,

        /// Comma separated signing party indices
        #[clap(long, value_delimiter = ',')]
        parties: Vec<u16>,

        /// Hex encoded 32-byte message hash
        #[clap(long)]
        hash: HexData<32>,
    },

    /// Delete a custodied account, destroying the wrapping key and share blob
    DeleteAccount {
        #[clap(long)]
        user: String,

        #[clap(long)]
        address: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Options::parse();

    // Setup logging
    simplelog::SimpleLogger::init(args.log_level, simplelog::Config::default())?;

    // Load configuration, applying command line overrides
    let cfg = resolve_config(&args)?;
    debug!("Using configuration: {:?}", cfg);

    // Handle reader listing prior to connecting
    if args.cmd == Actions::Readers {
        return list_readers();
    }

    // Connect to card
    debug!("Using transport: {}", args.target);
    let t: GenericTransport = match args.target {
        #[cfg(feature = "transport_pcsc")]
        Target::Pcsc => {
            cardvault::transport::PcscTransport::connect(cfg.card_reader_match.as_deref())?.into()
        }
        #[cfg(feature = "transport_tcp")]
        Target::Tcp => cardvault::transport::TcpTransport::connect(args.sim_addr)
            .await?
            .into(),
        #[allow(unreachable_patterns)]
        _ => return Err(anyhow::anyhow!("Transport {} unavailable", args.target)),
    };

    let card = GenericHandle::new(t).with_timeout(cfg.card_timeout());

    // Execute command
    execute(card, cfg, args.cmd).await?;

    Ok(())
}

/// Load configuration file (if provided) and apply command line overrides
fn resolve_config(args: &Options) -> anyhow::Result<VaultConfig> {
    let mut cfg = match &args.config {
        Some(p) => VaultConfig::load(p)?,
        None => VaultConfig::default(),
    };

    if let Some(r) = &args.reader {
        cfg.card_reader_match = Some(r.clone());
    }
    if let Some(k) = &args.auth_key {
        cfg.auth_key_path = Some(k.clone());
    }
    if let Some(b) = &args.mpc_binary {
        cfg.mpc_binary_path = b.clone();
    }
    if let Some(d) = &args.blob_dir {
        cfg.blob_dir = d.clone();
    }
    if let Some(t) = args.card_timeout {
        cfg.card_timeout_seconds = t;
    }

    Ok(cfg)
}

#[cfg(feature = "transport_pcsc")]
fn list_readers() -> anyhow::Result<()> {
    let readers = cardvault::transport::PcscTransport::list_readers()?;

    info!("Readers:");
    for (i, r) in readers.iter().enumerate() {
        info!("  {}: {}", i, r);
    }

    Ok(())
}

#[cfg(not(feature = "transport_pcsc"))]
fn list_readers() -> anyhow::Result<()> {
    Err(anyhow::anyhow!("PC/SC transport unavailable"))
}

/// Load the configured authorisation key
fn authorizer(cfg: &VaultConfig) -> anyhow::Result<LocalAuthorizer> {
    let p = cfg
        .auth_key_path
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("authorisation key required (--auth-key)"))?;

    Ok(LocalAuthorizer::load(p)?)
}

/// Resolve an explicit signature or sign with the configured authorisation key
fn signature_for(
    cfg: &VaultConfig,
    user: &str,
    address: &str,
    signature: Option<HexVec>,
) -> anyhow::Result<Vec<u8>> {
    match signature {
        Some(s) => Ok(s.0),
        None => {
            let key = record_key(user, address)?;
            Ok(authorizer(cfg)?.sign(&key.auth_message())?)
        }
    }
}

/// Execute a command with the provided card handle
async fn execute<T: Transport + 'static>(
    card: CardHandle<T>,
    cfg: VaultConfig,
    cmd: Actions,
) -> anyhow::Result<()> {
    debug!("Executing command: {:?}", cmd);

    match cmd {
        Actions::Cplc => {
            let c = card.cplc().await?;

            info!("CPLC: {}", hex::encode(c));
        }
        Actions::Store {
            user,
            address,
            message,
        } => {
            let r = card.store(&user, &address, message.as_ref()).await?;

            info!("stored record (slot: {}, total: {})", r.slot, r.total);
        }
        Actions::Read {
            user,
            address,
            signature,
        } => {
            let sig = signature_for(&cfg, &user, &address, signature)?;

            let m = card.read(&user, &address, &sig).await?;

            info!("message: {}", hex::encode(&m[..]));
        }
        Actions::Delete {
            user,
            address,
            signature,
        } => {
            let sig = signature_for(&cfg, &user, &address, signature)?;

            let r = card.delete(&user, &address, &sig).await?;

            info!("deleted record (slot: {}, total: {})", r.slot, r.total);
        }
        Actions::CreateAccount {
            user,
            threshold,
            parties,
            index,
            output,
        } => {
            let c = custodian(card, &cfg)?;

            let a = c.create_account(&user, threshold, parties, index).await?;

            info!("created account: {}", a.address);

            if let Some(o) = output {
                write_output(&o, &a).await?;
            }
        }
        Actions::SignMessage {
            user,
            address,
            parties,
            hash,
        } => {
            let c = custodian(card, &cfg)?;

            let sig = c
                .sign_message(&user, &address, &parties, hash.as_ref())
                .await?;

            info!("signature: 0x{}", hex::encode(sig));
        }
        Actions::DeleteAccount { user, address } => {
            let c = custodian(card, &cfg)?;

            c.delete_account(&user, &address).await?;

            info!("deleted account: {}", address);
        }
        Actions::Readers => list_readers()?,
    }

    Ok(())
}

/// Build a custodian from configuration
fn custodian<T: Transport + 'static>(
    card: CardHandle<T>,
    cfg: &VaultConfig,
) -> anyhow::Result<Custodian<T, LocalAuthorizer>> {
    let mut mpc = MpcRunner::new(&cfg.mpc_binary_path)
        .with_timeout(Duration::from_secs(cfg.mpc_timeout_seconds));
    if let Some(m) = &cfg.mpc_manager_address {
        mpc = mpc.with_manager(m);
    }

    Ok(Custodian::new(
        ShareVault::new(card),
        mpc,
        BlobStore::new(&cfg.blob_dir)?,
        authorizer(cfg)?,
    ))
}

/// Helper to write `.json` output files
async fn write_output(path: &PathBuf, value: &impl Serialize) -> anyhow::Result<()> {
    debug!("Writing output to '{}'", path.display());

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => {
            let s = serde_json::to_string_pretty(value)?;
            tokio::fs::write(path, s).await?;
        }
        _ => return Err(anyhow::anyhow!("unsupported output file format")),
    }

    Ok(())
}
