// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Handle for connected vault cards
//!
//! This provides typed vault operations and is generic over [Transport],
//! all APDU framing and status word handling lives here.

use std::{sync::Arc, time::Duration};

use encdec::{Decode, DecodeOwned, Encode};
use log::debug;
use once_cell::sync::OnceCell;
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use cardvault_apdu::{
    frame::{encode_command, split_response, ApduHeader, HEADER_LEN, MAX_DATA_LEN},
    prelude::*,
    record::MESSAGE_LEN,
};

use crate::{
    normalize::{check_message, check_signature, record_key},
    transport::Transport,
    Error,
};

/// Default APDU request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Vault handle for a connected card [Transport].
///
/// Card access is serialised through a single mutex, the applet is selected
/// lazily on first use and again following any transport error or
/// `6985` (conditions not satisfied) response.
pub struct CardHandle<T: Transport> {
    /// Transport and selection state
    state: Arc<Mutex<CardState<T>>>,
    /// Cached CPLC data
    cplc: Arc<OnceCell<Vec<u8>>>,
    /// Timeout for APDU requests
    request_timeout: Duration,
}

struct CardState<T> {
    t: T,
    selected: bool,
}

/// Result of STORE / DELETE operations
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct SlotInfo {
    /// Slot index for the affected record
    pub slot: u8,
    /// Records in use following the operation
    pub total: u8,
}

/// Create a [CardHandle] wrapper from a type implementing [Transport]
impl<T: Transport> From<T> for CardHandle<T> {
    fn from(t: T) -> Self {
        Self {
            state: Arc::new(Mutex::new(CardState { t, selected: false })),
            cplc: Arc::new(OnceCell::new()),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl<T: Transport> Clone for CardHandle<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            cplc: self.cplc.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

impl<T: Transport> CardHandle<T> {
    /// Set the APDU request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Helper to fetch APDU request timeout
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Select the vault applet
    pub async fn select(&self) -> Result<(), Error> {
        let mut s = self.state.lock().await;
        self.select_locked(&mut s).await
    }

    /// Fetch card production life cycle data, cached following the first
    /// successful request
    pub async fn cplc(&self) -> Result<Vec<u8>, Error> {
        if let Some(c) = self.cplc.get() {
            return Ok(c.clone());
        }

        debug!("Requesting CPLC data");

        let resp = self.request(&CplcReq, false).await?;
        let (cplc, _) = CplcResp::decode(&resp)?;

        let c = self.cplc.get_or_init(|| cplc.data.to_vec());

        Ok(c.clone())
    }

    /// Store (or overwrite) a message for a normalised record key
    pub async fn store_key(&self, key: &RecordKey, message: &[u8]) -> Result<SlotInfo, Error> {
        let message = check_message(message)?;

        debug!("Storing record for address: {}", hex::encode(key.address));

        let req = Zeroizing::new(StoreReq::new(*key, *message));
        let resp = self.request(&*req, true).await?;

        let (r, _) = SlotResp::decode_owned(&resp)?;

        debug!("Stored record at slot {} (total: {})", r.slot, r.total);

        Ok(SlotInfo {
            slot: r.slot,
            total: r.total,
        })
    }

    /// Read the message for a normalised record key
    pub async fn read_key(
        &self,
        key: &RecordKey,
        signature: &[u8],
    ) -> Result<Zeroizing<[u8; MESSAGE_LEN]>, Error> {
        check_signature(signature)?;

        debug!("Reading record for address: {}", hex::encode(key.address));

        let resp = self.request(&ReadReq::new(*key, signature), true).await?;

        let (r, _) = MessageResp::decode_owned(&resp)?;

        Ok(Zeroizing::new(r.message))
    }

    /// Delete the record for a normalised record key
    pub async fn delete_key(&self, key: &RecordKey, signature: &[u8]) -> Result<SlotInfo, Error> {
        check_signature(signature)?;

        debug!("Deleting record for address: {}", hex::encode(key.address));

        let resp = self.request(&DeleteReq::new(*key, signature), true).await?;

        let (r, _) = SlotResp::decode_owned(&resp)?;

        debug!("Deleted record at slot {} (total: {})", r.slot, r.total);

        Ok(SlotInfo {
            slot: r.slot,
            total: r.total,
        })
    }

    /// Store a message for `(user, address)`
    pub async fn store(&self, user: &str, address: &str, message: &[u8]) -> Result<SlotInfo, Error> {
        let key = record_key(user, address)?;
        self.store_key(&key, message).await
    }

    /// Read the message for `(user, address)`
    pub async fn read(
        &self,
        user: &str,
        address: &str,
        signature: &[u8],
    ) -> Result<Zeroizing<[u8; MESSAGE_LEN]>, Error> {
        let key = record_key(user, address)?;
        self.read_key(&key, signature).await
    }

    /// Delete the record for `(user, address)`
    pub async fn delete(
        &self,
        user: &str,
        address: &str,
        signature: &[u8],
    ) -> Result<SlotInfo, Error> {
        let key = record_key(user, address)?;
        self.delete_key(&key, signature).await
    }

    /// Issue a request APDU, returning response data on success
    async fn request<A>(&self, req: &A, select: bool) -> Result<Zeroizing<Vec<u8>>, Error>
    where
        A: ApduStatic + Encode<Error = ApduError>,
    {
        let mut buff = Zeroizing::new([0u8; HEADER_LEN + 2 + MAX_DATA_LEN]);
        let n = encode_command(req, &mut buff[..])?;

        let mut s = self.state.lock().await;

        if select && !s.selected {
            self.select_locked(&mut s).await?;
        }

        debug!("Request: {:02x?}", ApduHeader::of::<A>());

        self.exchange_locked(&mut s, &buff[..n]).await
    }

    async fn select_locked(&self, s: &mut CardState<T>) -> Result<(), Error> {
        let mut buff = [0u8; HEADER_LEN + 1 + 16];
        let n = encode_command(&SelectReq::vault(), &mut buff)?;

        debug!("Selecting applet: {:02x?}", VAULT_AID);

        self.exchange_locked(s, &buff[..n]).await?;
        s.selected = true;

        Ok(())
    }

    async fn exchange_locked(
        &self,
        s: &mut CardState<T>,
        cmd: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, Error> {
        let resp = match s.t.exchange(cmd, self.request_timeout).await {
            Ok(r) => Zeroizing::new(r),
            Err(e) => {
                // Card may have been reset, re-select on next request
                s.selected = false;
                return Err(e.into());
            }
        };

        let (data, sw) = split_response(&resp).map_err(|_| Error::UnexpectedResponse)?;

        match sw {
            Ok(StatusWord::Ok) => Ok(Zeroizing::new(data.to_vec())),
            Ok(sw) => {
                debug!("Request failed: {} ({:04x})", sw, u16::from(sw));

                // Applet deselected, re-select on next request
                if sw == StatusWord::ConditionsNotSatisfied {
                    s.selected = false;
                }

                Err(Error::Status(sw))
            }
            Err(v) => Err(Error::UnknownStatus(v)),
        }
    }
}
