// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use log::{debug, info, LevelFilter};
use p256::ecdsa::VerifyingKey;
use tokio::net::TcpListener;

use cardvault_sim::*;

/// Vault card simulator
///
/// This runs the vault applet engine in software, serving length-prefixed
/// APDU frames over TCP for use with `cardvault-cli --target tcp` and
/// `cardvault-tests`.
#[derive(Clone, Debug, PartialEq, Parser)]
pub struct Args {
    /// Listen address
    #[clap(long, default_value = "127.0.0.1", env = "SIM_ADDR")]
    addr: IpAddr,

    /// Listen port
    #[clap(long, default_value = "1237", env = "SIM_PORT")]
    port: u16,

    /// Authorisation public key (hex encoded SEC1),
    /// defaults to the compiled-in applet key
    #[clap(long, env = "SIM_AUTH_KEY")]
    auth_key: Option<String>,

    /// Log level
    #[clap(long, default_value = "debug")]
    log_level: LevelFilter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging
    let mut c = simplelog::ConfigBuilder::new();
    c.add_filter_allow_str("cardvault");

    let _ = simplelog::SimpleLogger::init(args.log_level, c.build());

    // Setup simulated card
    let card = match &args.auth_key {
        Some(k) => {
            let b = hex::decode(k.trim_start_matches("0x"))?;
            let vk = VerifyingKey::from_sec1_bytes(&b)
                .map_err(|e| anyhow::anyhow!("invalid auth key: {e}"))?;
            SimCard::new(vk)
        }
        None => SimCard::with_default_key()?,
    };

    let addr = SocketAddr::new(args.addr, args.port);
    let listener = TcpListener::bind(addr).await?;

    info!("Launching simulator...");

    // Serve until exit signal
    tokio::select!(
        r = serve(card.clone(), listener) => {
            r?;
        }
        // Exit on ctrl + c
        _ = tokio::signal::ctrl_c() => {
            let s = card.stats();
            debug!("Exit! ({} / {} records in use)", s.total, s.capacity);
        },
    );

    Ok(())
}
