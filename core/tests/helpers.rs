// Copyright (c) 2022-2023 The MobileCoin Foundation

#![allow(unused)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use log::{debug, trace, LevelFilter};

use cardvault::{transport::TransportError, LocalAuthorizer, Transport};
use cardvault_core::{
    apdu::{frame::parse_command, status::StatusWord, Instruction},
    engine::{Engine, Stats, MAX_RESP_LEN},
};

/// In-process transport driving an [Engine] directly
#[derive(Clone)]
pub struct TestEngine {
    pub engine: Arc<Mutex<Engine>>,
}

impl TestEngine {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
        }
    }

    pub fn stats(&self) -> Stats {
        self.engine.lock().unwrap().stats()
    }

    /// Process a raw command APDU
    pub fn apdu(&self, cmd: &[u8]) -> Vec<u8> {
        let mut resp = [0u8; MAX_RESP_LEN];

        let mut e = self.engine.lock().unwrap();
        let n = e.process_apdu(cmd, &mut resp);

        assert!(n >= 2, "missing status word for: {cmd:02x?}");

        resp[..n].to_vec()
    }
}

#[async_trait]
impl Transport for TestEngine {
    async fn exchange(
        &self,
        command: &[u8],
        _timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        trace!("cmd: {:02x?}", command);

        // Applet selection is handled by the card manager
        if command.len() > 1 && command[1] == Instruction::Select as u8 {
            debug!("select");
            return Ok(StatusWord::Ok.to_bytes().to_vec());
        }

        let r = self.apdu(command);

        trace!("resp: {:02x?}", r);

        Ok(r)
    }
}

/// Setup logging and an engine trusting a fresh authorisation key
pub fn setup() -> (TestEngine, LocalAuthorizer) {
    let log_level = match std::env::var("LOG_LEVEL").map(|v| v.parse::<LevelFilter>()) {
        Ok(Ok(l)) => l,
        _ => LevelFilter::Debug,
    };

    let _ = simplelog::SimpleLogger::init(log_level, simplelog::Config::default());

    let auth = LocalAuthorizer::random();
    let engine = Engine::new(auth.verifying_key());

    (TestEngine::new(engine), auth)
}
