// Copyright (c) 2022-2023 The MobileCoin Foundation

//! The [Engine] implements the vault applet.
//!
//! This handles [Event] inputs and returns [Output] responses to the caller,
//! see [apdu][crate::apdu] for APDU protocol / encoding specifications.

use cardvault_apdu::{
    frame::parse_command,
    record::{RecordKey, MESSAGE_LEN},
    status::StatusWord,
    VAULT_APDU_CLA,
};

mod authority;
pub use authority::{Authority, DEFAULT_AUTH_KEY};

mod event;
pub use event::Event;

mod output;
pub use output::Output;

mod error;
pub use error::Error;

mod table;
pub use table::{Table, NUM_SLOTS};

use p256::ecdsa::VerifyingKey;

/// Minimum response buffer length for [Engine::process_apdu]
pub const MAX_RESP_LEN: usize = MESSAGE_LEN + 2;

/// Record table statistics
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Stats {
    /// Records currently in use
    pub total: u8,
    /// Table capacity
    pub capacity: u8,
}

/// [Engine] provides hardware-independent support for vault applet operations
///
/// The engine is single threaded, callers must serialise events (as the card
/// does, one APDU at a time).
pub struct Engine<A: Authority = VerifyingKey> {
    table: Table,
    auth: A,
}

impl Engine<VerifyingKey> {
    /// Create an engine using the compiled-in authorisation key
    pub fn with_default_key() -> Result<Self, Error> {
        let vk = VerifyingKey::from_sec1_bytes(&DEFAULT_AUTH_KEY).map_err(|_| Error::InvalidKey)?;
        Ok(Self::new(vk))
    }
}

impl<A: Authority> Engine<A> {
    /// Create a new engine instance with the provided authorisation key
    pub fn new(auth: A) -> Self {
        Self {
            table: Table::new(),
            auth,
        }
    }

    /// Fetch record table statistics
    pub fn stats(&self) -> Stats {
        Stats {
            total: self.table.total(),
            capacity: NUM_SLOTS as u8,
        }
    }

    /// Handle incoming events
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn update(&mut self, evt: &Event) -> Result<Output, Error> {
        #[cfg(feature = "log")]
        log::debug!("event: {:02x?}", evt);

        match evt {
            Event::Store { key, message } => {
                let (slot, total) = self.table.store(key, message)?;

                Ok(Output::Slot { slot, total })
            }
            Event::Read { key, signature } => {
                self.authorise(key, signature)?;

                let message = self.table.read(key)?;

                Ok(Output::Message { message })
            }
            Event::Delete { key, signature } => {
                self.authorise(key, signature)?;

                let (slot, total) = self.table.delete(key)?;

                Ok(Output::Slot { slot, total })
            }
        }
    }

    /// Process a raw command APDU, writing the response (data and status word)
    /// to `resp` and returning the response length.
    ///
    /// `resp` must be at least [MAX_RESP_LEN] bytes.
    pub fn process_apdu(&mut self, cmd: &[u8], resp: &mut [u8]) -> usize {
        if resp.len() < MAX_RESP_LEN {
            return 0;
        }

        let (n, sw) = match self.handle_apdu(cmd, resp) {
            Ok(n) => (n, StatusWord::Ok),
            Err(e) => {
                #[cfg(feature = "log")]
                log::debug!("command failed: {:?}", e);

                (0, e.status())
            }
        };

        resp[n..][..2].copy_from_slice(&sw.to_bytes());

        n + 2
    }

    fn handle_apdu(&mut self, cmd: &[u8], resp: &mut [u8]) -> Result<usize, Error> {
        let (header, data) = parse_command(cmd)?;

        if header.cla != VAULT_APDU_CLA {
            return Err(Error::UnknownClass);
        }

        let evt = Event::parse(header.ins, data)?;

        let output = self.update(&evt)?;

        output
            .encode(&mut resp[..MAX_RESP_LEN - 2])
            .map_err(|_| Error::EncodingFailed)
    }

    /// Verify an authorisation signature over `user_hash || address`
    fn authorise(&self, key: &RecordKey, signature: &[u8]) -> Result<(), Error> {
        match self.auth.verify(&key.auth_message(), signature) {
            true => Ok(()),
            false => Err(Error::SignatureInvalid),
        }
    }
}
