// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Record keys and STORE APDUs

use encdec::{DecodeOwned, Encode};
use zeroize::Zeroize;

use crate::{helpers::arr, ApduError, ApduStatic, Instruction, VAULT_APDU_CLA};

/// Normalised user name hash length (SHA-256)
pub const USER_HASH_LEN: usize = 32;

/// Account address length
pub const ADDRESS_LEN: usize = 20;

/// Stored message (wrapping key) length
pub const MESSAGE_LEN: usize = 32;

/// Length of the message covered by authorisation signatures
pub const AUTH_MSG_LEN: usize = USER_HASH_LEN + ADDRESS_LEN;

/// External record identifier, `user_hash || address`
///
/// ## Encoding
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                      USER_HASH (32 bytes)                     /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                       ADDRESS (20 bytes)                      /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct RecordKey {
    /// SHA-256 of the user name
    pub user_hash: [u8; USER_HASH_LEN],
    /// Raw account address
    pub address: [u8; ADDRESS_LEN],
}

impl RecordKey {
    /// Create a new record key
    pub fn new(user_hash: [u8; USER_HASH_LEN], address: [u8; ADDRESS_LEN]) -> Self {
        Self { user_hash, address }
    }

    /// Message covered by read / delete authorisation signatures
    pub fn auth_message(&self) -> [u8; AUTH_MSG_LEN] {
        let mut m = [0u8; AUTH_MSG_LEN];
        m[..USER_HASH_LEN].copy_from_slice(&self.user_hash);
        m[USER_HASH_LEN..].copy_from_slice(&self.address);
        m
    }
}

impl Encode for RecordKey {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(AUTH_MSG_LEN)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let mut index = 0;

        index += arr::enc(&self.user_hash, &mut buff[index..])?;
        index += arr::enc(&self.address, &mut buff[index..])?;

        Ok(index)
    }
}

impl DecodeOwned for RecordKey {
    type Output = Self;

    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        let mut index = 0;

        let (user_hash, n) = arr::dec::<USER_HASH_LEN>(&buff[index..])?;
        index += n;

        let (address, n) = arr::dec::<ADDRESS_LEN>(&buff[index..])?;
        index += n;

        Ok((Self { user_hash, address }, index))
    }
}

/// Store record request APDU, writes or overwrites the message
/// associated with a [RecordKey]
///
/// ## Encoding
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                      USER_HASH (32 bytes)                     /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                       ADDRESS (20 bytes)                      /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                       MESSAGE (32 bytes)                      /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The payload must be exactly 84 bytes.
#[derive(Clone, PartialEq, Debug)]
pub struct StoreReq {
    pub key: RecordKey,
    pub message: [u8; MESSAGE_LEN],
}

impl StoreReq {
    /// Encoded STORE payload length
    pub const LEN: usize = AUTH_MSG_LEN + MESSAGE_LEN;

    pub fn new(key: RecordKey, message: [u8; MESSAGE_LEN]) -> Self {
        Self { key, message }
    }
}

impl ApduStatic for StoreReq {
    const CLA: u8 = VAULT_APDU_CLA;
    const INS: u8 = Instruction::Store as u8;
}

impl Encode for StoreReq {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(Self::LEN)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let mut index = 0;

        index += self.key.encode(&mut buff[index..])?;
        index += arr::enc(&self.message, &mut buff[index..])?;

        Ok(index)
    }
}

impl DecodeOwned for StoreReq {
    type Output = Self;

    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        if buff.len() != Self::LEN {
            return Err(ApduError::InvalidLength);
        }

        let (key, mut index) = RecordKey::decode_owned(buff)?;

        let (message, n) = arr::dec::<MESSAGE_LEN>(&buff[index..])?;
        index += n;

        Ok((Self { key, message }, index))
    }
}

impl Zeroize for StoreReq {
    fn zeroize(&mut self) {
        self.message.zeroize();
    }
}

/// Slot response APDU, returned by STORE and DELETE
///
/// ## Encoding
///
/// ```text
///  0                   1
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     SLOT      |     TOTAL     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct SlotResp {
    /// Index of the affected slot
    pub slot: u8,
    /// Number of records in use following the operation
    pub total: u8,
}

impl SlotResp {
    pub fn new(slot: u8, total: u8) -> Self {
        Self { slot, total }
    }
}

impl Encode for SlotResp {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(2)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        if buff.len() < 2 {
            return Err(ApduError::InvalidLength);
        }

        buff[0] = self.slot;
        buff[1] = self.total;

        Ok(2)
    }
}

impl DecodeOwned for SlotResp {
    type Output = Self;

    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        if buff.len() != 2 {
            return Err(ApduError::InvalidLength);
        }

        Ok((Self::new(buff[0], buff[1]), 2))
    }
}
