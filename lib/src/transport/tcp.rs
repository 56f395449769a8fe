// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::{net::SocketAddr, time::Duration};

use async_trait::async_trait;
use log::debug;
use tokio::{net::TcpStream, sync::Mutex};

use super::{read_frame, write_frame, Transport, TransportError};

/// Default `cardvault-sim` listening port
pub const DEFAULT_SIM_PORT: u16 = 1237;

/// TCP transport for the card simulator
pub struct TcpTransport {
    addr: SocketAddr,
    s: Mutex<TcpStream>,
}

impl TcpTransport {
    /// Connect to a simulator at the provided address
    pub async fn connect(addr: SocketAddr) -> Result<Self, TransportError> {
        debug!("Connecting to simulator at {}", addr);

        let s = TcpStream::connect(addr).await?;
        s.set_nodelay(true)?;

        Ok(Self {
            addr,
            s: Mutex::new(s),
        })
    }

    /// Fetch the simulator address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn exchange(
        &self,
        command: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let mut s = self.s.lock().await;

        let f = async {
            write_frame(&mut *s, command).await?;
            read_frame(&mut *s).await
        };

        match tokio::time::timeout(timeout, f).await {
            Ok(r) => r,
            Err(_) => Err(TransportError::Timeout),
        }
    }
}
