// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Protocol / APDU definitions for the secrets vault applet
//!
//! This module provides a protocol specification and reference implementation for communication
//! with the vault applet, a fixed-capacity key-value store keyed by `(user_hash, address)`
//! holding one 32-byte secret per record.
//!
//! Commands follow ISO 7816-4 short APDU framing: `CLA INS P1 P2 [Lc DATA] [Le]`,
//! with responses `DATA SW1 SW2`. All vault commands use class [VAULT_APDU_CLA] with
//! `P1 = P2 = 0x00`, see [Instruction] for the instruction set and [status::StatusWord]
//! for response codes.
//!
//! Payloads are fixed-width binary fields in transmission order, there are no
//! length prefixes other than the APDU `Lc` byte, so object lengths are implied
//! by (and checked against) the APDU data length.
//!
//! Reads and deletes carry a DER encoded ECDSA P-256 / SHA-256 signature over the
//! 52-byte `user_hash || address` tuple (see [record::RecordKey::auth_message]),
//! there is no session state on the card.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod cplc;
pub mod frame;
pub mod prelude;
pub mod record;
pub mod select;
pub mod signed;
pub mod status;

mod helpers;

/// Vault APDU Class
pub const VAULT_APDU_CLA: u8 = 0x80;

/// Vault APDU instruction codes
#[derive(Copy, Clone, Debug, PartialEq, Eq, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum Instruction {
    /// Store (or overwrite) a record
    Store = 0x10,

    /// Read a record (signature authorised)
    Read = 0x20,

    /// Delete a record (signature authorised)
    Delete = 0x30,

    /// GET DATA, used to fetch card production life cycle (CPLC) data
    GetData = 0xCA,

    /// ISO SELECT by application identifier
    Select = 0xA4,
}

/// Static APDU header information, implemented for all request objects
pub trait ApduStatic {
    /// APDU class
    const CLA: u8;

    /// APDU instruction
    const INS: u8;

    /// First instruction parameter
    const P1: u8 = 0x00;

    /// Second instruction parameter
    const P2: u8 = 0x00;

    /// Append an `Le` byte (requesting response data) to commands
    /// with no body
    const RESP_LE: bool = false;
}

/// APDU encoding / decoding errors
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
pub enum ApduError {
    /// Buffer or payload length invalid
    #[cfg_attr(feature = "thiserror", error("invalid APDU length"))]
    InvalidLength,

    /// Payload contents invalid
    #[cfg_attr(feature = "thiserror", error("invalid APDU encoding"))]
    InvalidEncoding,

    /// Unrecognised instruction
    #[cfg_attr(feature = "thiserror", error("unsupported instruction: 0x{0:02x}"))]
    UnknownInstruction(u8),

    /// Unrecognised class
    #[cfg_attr(feature = "thiserror", error("unsupported class: 0x{0:02x}"))]
    UnknownClass(u8),
}

impl From<encdec::Error> for ApduError {
    #[allow(unreachable_patterns)]
    fn from(e: encdec::Error) -> Self {
        match e {
            encdec::Error::Length => ApduError::InvalidLength,
            _ => ApduError::InvalidEncoding,
        }
    }
}
