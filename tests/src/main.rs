// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::net::SocketAddr;

use clap::{clap_derive::ArgEnum, Parser};
use log::{debug, info, LevelFilter};
use strum::{Display, EnumString, EnumVariantNames};

use cardvault::{LocalAuthorizer, Transport};

/// Test CLI arguments
#[derive(Clone, Debug, Parser)]
pub struct Opts {
    #[clap(subcommand)]
    pub test: Tests,

    /// Target for test execution
    #[clap(long, value_enum, default_value = "tcp", env)]
    pub target: Target,

    /// Simulator address for TCP targets
    #[clap(long, default_value = "127.0.0.1:1237", env)]
    pub sim_addr: SocketAddr,

    /// Reader name filter for PC/SC targets
    #[clap(long, env)]
    pub reader: Option<String>,

    /// Hex encoded P-256 authorisation key
    /// (public key must be installed on the target)
    #[clap(long, env, value_parser=auth_from_str)]
    pub auth_key: LocalAuthorizer,

    /// Log level
    #[clap(long, default_value = "debug", env)]
    pub log_level: LevelFilter,

    /// Enable logging for transports
    #[clap(long)]
    pub log_transports: bool,
}

pub fn auth_from_str(s: &str) -> anyhow::Result<LocalAuthorizer> {
    let a = LocalAuthorizer::from_hex(s)?;
    Ok(a)
}

/// Test modes
#[derive(Clone, PartialEq, Debug, Parser, Display, EnumString, EnumVariantNames)]
pub enum Tests {
    /// Test record overwrite
    Overwrite,
    /// Test reads and deletes of removed records
    DeleteTwice,
    /// Test authorisation signature checks
    Signatures,
    /// Test input validation
    InvalidInputs,
    /// Test slot exhaustion and reuse (requires an empty card)
    Capacity,
    /// Test share wrapping and unwrapping
    WrapUnwrap,
    /// Run all tests except capacity
    All,
}

/// Test target connection
#[derive(Clone, PartialEq, Debug, ArgEnum, Display, EnumString, EnumVariantNames)]
#[strum(serialize_all = "snake_case")]
#[non_exhaustive]
pub enum Target {
    /// PC/SC connection for physical cards
    Pcsc,
    /// TCP connection for the card simulator
    Tcp,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load command line options
    let opts = Opts::parse();

    // Setup logging
    let mut c = simplelog::ConfigBuilder::new();
    if !opts.log_transports {
        c.add_filter_ignore_str("cardvault::transport");
    }

    let _ = simplelog::SimpleLogger::init(opts.log_level, c.build());

    debug!("target: {}, sim: {}", opts.target, opts.sim_addr);

    info!("Running test '{}' via {}", opts.test, opts.target);

    // Connect to target and execute test
    match opts.target {
        #[cfg(feature = "transport_tcp")]
        Target::Tcp => {
            let t = cardvault::transport::TcpTransport::connect(opts.sim_addr).await?;

            execute(t, &opts).await?;
        }
        #[cfg(feature = "transport_pcsc")]
        Target::Pcsc => {
            let readers = cardvault::transport::PcscTransport::list_readers()?;
            debug!("Found readers: {:?}", readers);

            let t = cardvault::transport::PcscTransport::connect(opts.reader.as_deref())?;

            execute(t, &opts).await?;
        }
        #[cfg(any(not(feature = "transport_tcp"), not(feature = "transport_pcsc")))]
        _ => {
            return Err(anyhow::anyhow!(
                "transport: {} feature not enabled",
                opts.target
            ));
        }
    };

    log::info!("Test OK!");

    Ok(())
}

/// Execute a test with the provided transport
async fn execute<T: Transport + 'static>(target: T, opts: &Opts) -> anyhow::Result<()> {
    use cardvault_tests::*;

    let auth = &opts.auth_key;
    let t = std::sync::Arc::new(target);

    match opts.test {
        Tests::Overwrite => card::overwrite(t, auth).await?,
        Tests::DeleteTwice => card::delete_twice(t, auth).await?,
        Tests::Signatures => card::signature_rejection(t, auth).await?,
        Tests::InvalidInputs => card::invalid_inputs(t).await?,
        Tests::Capacity => card::capacity(t, auth).await?,
        Tests::WrapUnwrap => {
            vault::wrap_unwrap(t.clone(), auth).await?;
            vault::cross_record(t, auth).await?;
        }
        Tests::All => {
            card::invalid_inputs(t.clone()).await?;
            card::overwrite(t.clone(), auth).await?;
            card::delete_twice(t.clone(), auth).await?;
            card::signature_rejection(t.clone(), auth).await?;
            vault::wrap_unwrap(t.clone(), auth).await?;
            vault::cross_record(t, auth).await?;
        }
    }

    Ok(())
}
