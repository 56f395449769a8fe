// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Software vault card simulator
//!
//! [SimCard] wraps the applet [Engine] with the card-manager behaviour a
//! physical card provides (applet SELECT and CPLC `GET DATA`), for use
//! in-process as a [Transport] or served over TCP via [serve].

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use encdec::Encode;
use log::{debug, error, info, warn};
use p256::ecdsa::VerifyingKey;
use tokio::net::{TcpListener, TcpStream};

use cardvault::transport::{read_frame, write_frame, Transport, TransportError};
use cardvault_apdu::{
    cplc::{CplcResp, CPLC_TAG},
    frame::parse_command,
    select::{SELECT_P1_BY_NAME, VAULT_AID},
    status::StatusWord,
    Instruction,
};
use cardvault_core::engine::{Engine, Error as EngineError, Stats, MAX_RESP_LEN};

/// Fixed CPLC data reported by the simulator
pub const SIM_CPLC: [u8; 42] = [
    0x47, 0x90, 0x50, 0x40, 0x47, 0x91, 0x81, 0x02, 0x31, 0x00, 0x83, 0x58, 0x00, 0x11, 0x68, 0x91,
    0x45, 0x81, 0x48, 0x12, 0x83, 0x65, 0x00, 0x00, 0x00, 0x00, 0x01, 0x2F, 0x31, 0x30, 0x31, 0x31,
    0x36, 0x38, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Simulated vault card
#[derive(Clone)]
pub struct SimCard {
    state: Arc<Mutex<SimState>>,
}

struct SimState {
    engine: Engine,
    selected: bool,
}

impl SimCard {
    /// Create a simulated card trusting the provided authorisation key
    pub fn new(auth: VerifyingKey) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                engine: Engine::new(auth),
                selected: false,
            })),
        }
    }

    /// Create a simulated card using the compiled-in authorisation key
    pub fn with_default_key() -> Result<Self, EngineError> {
        let engine = Engine::with_default_key()?;

        Ok(Self {
            state: Arc::new(Mutex::new(SimState {
                engine,
                selected: false,
            })),
        })
    }

    /// Fetch record table statistics
    pub fn stats(&self) -> Stats {
        self.lock().engine.stats()
    }

    /// Deselect the applet, as on card removal
    pub fn reset(&self) {
        self.lock().selected = false;
    }

    /// Process a command APDU, returning the response APDU
    pub fn process(&self, cmd: &[u8]) -> Vec<u8> {
        let mut s = self.lock();

        let (header, data) = match parse_command(cmd) {
            Ok(v) => v,
            Err(_) => return status(StatusWord::WrongLength),
        };

        // Applet selection
        if header.ins == Instruction::Select as u8 && header.p1 == SELECT_P1_BY_NAME {
            s.selected = data == VAULT_AID;

            debug!("select {} (ok: {})", hex::encode(data), s.selected);

            return match s.selected {
                true => status(StatusWord::Ok),
                false => status(StatusWord::FileNotFound),
            };
        }

        // CPLC is served by the card manager, independent of selection
        if header.ins == Instruction::GetData as u8 && [header.p1, header.p2] == CPLC_TAG {
            let mut buff = [0u8; 64];
            let n = match (CplcResp { data: &SIM_CPLC }).encode(&mut buff) {
                Ok(n) => n,
                Err(_) => return status(StatusWord::Unknown),
            };

            let mut r = buff[..n].to_vec();
            r.extend_from_slice(&StatusWord::Ok.to_bytes());
            return r;
        }

        if !s.selected {
            return status(StatusWord::ConditionsNotSatisfied);
        }

        let mut resp = [0u8; MAX_RESP_LEN];
        let n = s.engine.process_apdu(cmd, &mut resp);

        resp[..n].to_vec()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // Engine state is only mutated by complete APDUs
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn status(sw: StatusWord) -> Vec<u8> {
    sw.to_bytes().to_vec()
}

/// In-process exchange with a simulated card
#[async_trait]
impl Transport for SimCard {
    async fn exchange(
        &self,
        command: &[u8],
        _timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        Ok(self.process(command))
    }
}

/// Serve a simulated card over TCP, using length-prefixed APDU frames
pub async fn serve(card: SimCard, listener: TcpListener) -> anyhow::Result<()> {
    info!("Simulator listening on {}", listener.local_addr()?);

    loop {
        let (s, peer) = listener.accept().await?;
        s.set_nodelay(true)?;

        debug!("Client connected: {}", peer);

        let card = card.clone();
        tokio::task::spawn(async move {
            match handle_client(card, s, peer).await {
                Ok(_) | Err(TransportError::Closed) => debug!("Client disconnected: {}", peer),
                Err(e) => warn!("Client {} error: {}", peer, e),
            }
        });
    }
}

async fn handle_client(card: SimCard, mut s: TcpStream, peer: SocketAddr) -> Result<(), TransportError> {
    loop {
        let cmd = read_frame(&mut s).await?;

        let resp = card.process(&cmd);
        if resp.len() < 2 {
            error!("Empty response for {}", peer);
        }

        write_frame(&mut s, &resp).await?;
    }
}
