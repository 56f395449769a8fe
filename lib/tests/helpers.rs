// Copyright (c) 2022-2023 The MobileCoin Foundation

#![allow(unused)]

use std::{
    net::{Ipv4Addr, SocketAddr},
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use log::{debug, LevelFilter};
use portpicker::pick_unused_port;
use simplelog::SimpleLogger;
use tokio::net::TcpListener;

use cardvault::{transport::TcpTransport, GenericTransport, LocalAuthorizer};
use cardvault_sim::{serve, SimCard};

// Setup a simulator instance and TCP transport, trusting a fresh authorisation key
pub async fn setup() -> (SimCard, Arc<GenericTransport>, LocalAuthorizer) {
    // Setup logging
    let log_level = match std::env::var("LOG_LEVEL").map(|v| LevelFilter::from_str(&v)) {
        Ok(Ok(l)) => l,
        _ => LevelFilter::Debug,
    };

    let _ = SimpleLogger::init(log_level, simplelog::Config::default());

    // Find open port
    let port = pick_unused_port().unwrap();
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), port);

    // Start simulator
    let auth = LocalAuthorizer::random();
    let card = SimCard::new(auth.verifying_key());

    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::task::spawn(serve(card.clone(), listener));

    debug!("Simulator listening on {}", addr);

    // Connect via TCP transport
    let t = TcpTransport::connect(addr).await.unwrap();

    (card, Arc::new(t.into()), auth)
}

/// Poll until the simulated card holds `total` records
pub async fn wait_total(card: &SimCard, total: u8) -> bool {
    for _ in 0..50 {
        if card.stats().total == total {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    false
}
