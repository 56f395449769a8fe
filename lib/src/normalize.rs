// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Input normalisation, applied before any card operation

use sha2::{Digest, Sha256};

use cardvault_apdu::record::{RecordKey, ADDRESS_LEN, MESSAGE_LEN, USER_HASH_LEN};

use crate::Error;

/// Minimum DER ECDSA P-256 signature length accepted by the driver
pub const AUTH_SIG_MIN_LEN: usize = 70;

/// Maximum DER ECDSA P-256 signature length accepted by the driver
pub const AUTH_SIG_MAX_LEN: usize = 72;

/// Hash a user name to a fixed-length record identifier
pub fn hash_user(name: &str) -> [u8; USER_HASH_LEN] {
    Sha256::digest(name.as_bytes()).into()
}

/// Parse a hex encoded account address, with optional `0x` prefix
pub fn parse_address(s: &str) -> Result<[u8; ADDRESS_LEN], Error> {
    let h = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);

    let b = hex::decode(h).map_err(|e| Error::InvalidInput(format!("address: {e}")))?;

    b.try_into().map_err(|b: Vec<u8>| {
        Error::InvalidInput(format!(
            "address length {} (expected {})",
            b.len(),
            ADDRESS_LEN
        ))
    })
}

/// Check a stored message is exactly [MESSAGE_LEN] bytes
pub fn check_message(m: &[u8]) -> Result<&[u8; MESSAGE_LEN], Error> {
    m.try_into().map_err(|_| {
        Error::InvalidInput(format!(
            "message length {} (expected {})",
            m.len(),
            MESSAGE_LEN
        ))
    })
}

/// Check an authorisation signature is a plausible DER ECDSA P-256 encoding length
pub fn check_signature(s: &[u8]) -> Result<(), Error> {
    match s.len() {
        AUTH_SIG_MIN_LEN..=AUTH_SIG_MAX_LEN => Ok(()),
        n => Err(Error::InvalidInput(format!(
            "signature length {n} (expected {AUTH_SIG_MIN_LEN}..={AUTH_SIG_MAX_LEN})"
        ))),
    }
}

/// Build a record key from a user name and hex address
pub fn record_key(user: &str, address: &str) -> Result<RecordKey, Error> {
    Ok(RecordKey::new(hash_user(user), parse_address(address)?))
}
