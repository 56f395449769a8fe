// Copyright (c) 2022-2023 The MobileCoin Foundation

//! ISO 7816 status words returned by the card

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum::Display;

/// Status words used by the vault applet and card OS
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive, Display)]
#[repr(u16)]
pub enum StatusWord {
    /// Command completed successfully
    Ok = 0x9000,

    /// Command data length invalid
    WrongLength = 0x6700,

    /// Authorisation signature failed verification
    SignatureInvalid = 0x6982,

    /// Command not permitted in the current card state (applet not selected)
    ConditionsNotSatisfied = 0x6985,

    /// Application (AID) not found on SELECT
    FileNotFound = 0x6A82,

    /// No record matching the provided key
    RecordNotFound = 0x6A83,

    /// Record table full
    NotEnoughSpace = 0x6A84,

    /// Instruction not supported
    InsNotSupported = 0x6D00,

    /// Class not supported
    ClaNotSupported = 0x6E00,

    /// Unspecified failure
    Unknown = 0x6F00,
}

impl StatusWord {
    /// Encode status word to `[SW1, SW2]`
    pub fn to_bytes(self) -> [u8; 2] {
        let v: u16 = self.into();
        v.to_be_bytes()
    }

    /// Decode status word from `SW1, SW2`, returning the raw value if unrecognised
    pub fn from_bytes(sw1: u8, sw2: u8) -> Result<Self, u16> {
        let v = u16::from_be_bytes([sw1, sw2]);
        Self::try_from(v).map_err(|_| v)
    }

    /// Check whether this is a success status
    pub fn is_ok(&self) -> bool {
        *self == StatusWord::Ok
    }
}
