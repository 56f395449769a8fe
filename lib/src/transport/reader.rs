// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::{
    ffi::CString,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use log::{debug, warn};
use pcsc::{Card, Context, Protocols, Scope, ShareMode, MAX_BUFFER_SIZE};

use super::{select_reader, Transport, TransportError};

/// PC/SC smart card reader transport
pub struct PcscTransport {
    reader: String,
    card: Arc<Mutex<Card>>,
}

impl From<pcsc::Error> for TransportError {
    fn from(e: pcsc::Error) -> Self {
        match e {
            pcsc::Error::NoReadersAvailable | pcsc::Error::UnknownReader => {
                TransportError::NoReader
            }
            pcsc::Error::Timeout => TransportError::Timeout,
            _ => TransportError::Pcsc(e.to_string()),
        }
    }
}

impl PcscTransport {
    /// List available PC/SC readers
    pub fn list_readers() -> Result<Vec<String>, TransportError> {
        let ctx = Context::establish(Scope::User)?;

        let readers = match ctx.list_readers_owned() {
            Ok(r) => r,
            Err(pcsc::Error::NoReadersAvailable) => vec![],
            Err(e) => return Err(e.into()),
        };

        Ok(readers
            .iter()
            .map(|r| r.to_string_lossy().to_string())
            .collect())
    }

    /// Connect to the first reader matching `filter` (or the first available reader)
    pub fn connect(filter: Option<&str>) -> Result<Self, TransportError> {
        let ctx = Context::establish(Scope::User)?;

        let readers = Self::list_readers()?;
        debug!("Found {} readers: {:?}", readers.len(), readers);

        let reader = select_reader(&readers, filter)
            .ok_or(TransportError::NoReader)?
            .clone();

        if let Some(f) = filter {
            if !reader.to_lowercase().contains(&f.to_lowercase()) {
                warn!("No reader matching '{}', using '{}'", f, reader);
            }
        }

        let name = CString::new(reader.clone()).map_err(|_| TransportError::NoReader)?;
        let card = ctx.connect(&name, ShareMode::Shared, Protocols::ANY)?;

        debug!("Connected to reader: {}", reader);

        Ok(Self {
            reader,
            card: Arc::new(Mutex::new(card)),
        })
    }

    /// Fetch the connected reader name
    pub fn reader(&self) -> &str {
        &self.reader
    }
}

#[async_trait]
impl Transport for PcscTransport {
    async fn exchange(
        &self,
        command: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let card = self.card.clone();
        let command = command.to_vec();

        // PC/SC calls block, run these off the async executor
        let f = tokio::task::spawn_blocking(move || {
            let card = card.lock().map_err(|_| TransportError::Closed)?;

            let mut buff = [0u8; MAX_BUFFER_SIZE];
            let resp = card.transmit(&command, &mut buff)?;

            Ok(resp.to_vec())
        });

        match tokio::time::timeout(timeout, f).await {
            Ok(Ok(r)) => r,
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::Timeout),
        }
    }
}
