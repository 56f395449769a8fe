// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Card transport abstraction
//!
//! Transports exchange raw command / response APDU bytes, all framing and
//! status handling lives in [CardHandle][crate::CardHandle].

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use strum::Display;

#[cfg(feature = "transport_pcsc")]
mod reader;
#[cfg(feature = "transport_pcsc")]
pub use reader::PcscTransport;

#[cfg(feature = "transport_tcp")]
mod tcp;
#[cfg(feature = "transport_tcp")]
pub use tcp::{TcpTransport, DEFAULT_SIM_PORT};

mod frame;
pub use frame::{read_frame, write_frame, MAX_FRAME_LEN};

/// Raw APDU exchange, implemented for supported card transports
#[async_trait]
pub trait Transport: Send + Sync {
    /// Exchange a command APDU for a response APDU (including status word)
    async fn exchange(&self, command: &[u8], timeout: Duration)
        -> Result<Vec<u8>, TransportError>;
}

/// Card transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timeout waiting for card")]
    Timeout,

    #[error("no matching card reader found")]
    NoReader,

    #[error("PC/SC error: {0}")]
    Pcsc(String),

    #[error("transport closed")]
    Closed,

    #[error("invalid frame length: {0}")]
    InvalidLength(usize),
}

/// Select a reader by case-insensitive substring match,
/// falling back to the first available reader
pub fn select_reader<'a>(readers: &'a [String], filter: Option<&str>) -> Option<&'a String> {
    if let Some(f) = filter.filter(|f| !f.is_empty()) {
        let f = f.to_lowercase();
        if let Some(r) = readers.iter().find(|r| r.to_lowercase().contains(&f)) {
            return Some(r);
        }
    }

    readers.first()
}

#[async_trait]
impl<T: Transport> Transport for Arc<T> {
    async fn exchange(
        &self,
        command: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        self.as_ref().exchange(command, timeout).await
    }
}

/// Generic card transport (abstract over transport types)
#[derive(Display)]
#[non_exhaustive]
pub enum GenericTransport {
    #[cfg(feature = "transport_pcsc")]
    Pcsc(PcscTransport),
    #[cfg(feature = "transport_tcp")]
    Tcp(TcpTransport),
}

/// Convert a PC/SC transport into a generic transport
#[cfg(feature = "transport_pcsc")]
impl From<PcscTransport> for GenericTransport {
    fn from(t: PcscTransport) -> Self {
        Self::Pcsc(t)
    }
}

/// Convert a TCP transport into a generic transport
#[cfg(feature = "transport_tcp")]
impl From<TcpTransport> for GenericTransport {
    fn from(t: TcpTransport) -> Self {
        Self::Tcp(t)
    }
}

/// Implementation of [Transport] for [GenericTransport], dispatching to the inner transport
#[async_trait]
impl Transport for GenericTransport {
    #[allow(unused_variables)]
    async fn exchange(
        &self,
        command: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        match self {
            #[cfg(feature = "transport_pcsc")]
            Self::Pcsc(t) => t.exchange(command, timeout).await,
            #[cfg(feature = "transport_tcp")]
            Self::Tcp(t) => t.exchange(command, timeout).await,
            #[cfg(not(any(feature = "transport_pcsc", feature = "transport_tcp")))]
            _ => Err(TransportError::Closed),
        }
    }
}
