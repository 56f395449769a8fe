// Copyright (c) 2022-2023 The MobileCoin Foundation

use cardvault_apdu::{status::StatusWord, ApduError};

/// [Engine][super::Engine] errors
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
#[repr(u8)]
pub enum Error {
    /// Invalid argument length
    #[cfg_attr(feature = "thiserror", error("Invalid argument length"))]
    InvalidLength = 0x00,

    /// No record matching the provided key
    #[cfg_attr(feature = "thiserror", error("Record not found"))]
    NotFound = 0x01,

    /// Record table full
    #[cfg_attr(feature = "thiserror", error("Record table full"))]
    Full = 0x02,

    /// Authorisation signature invalid
    #[cfg_attr(feature = "thiserror", error("Signature invalid"))]
    SignatureInvalid = 0x03,

    /// Unsupported instruction
    #[cfg_attr(feature = "thiserror", error("Unsupported instruction"))]
    UnknownInstruction = 0x04,

    /// Unsupported class
    #[cfg_attr(feature = "thiserror", error("Unsupported class"))]
    UnknownClass = 0x05,

    /// Message encoding failed
    #[cfg_attr(feature = "thiserror", error("message encoding failed"))]
    EncodingFailed = 0x06,

    /// Invalid authorisation key
    #[cfg_attr(feature = "thiserror", error("invalid authorisation key"))]
    InvalidKey = 0x07,
}

impl Error {
    /// Map an engine error to the status word returned by the card
    pub fn status(&self) -> StatusWord {
        match self {
            Error::InvalidLength => StatusWord::WrongLength,
            Error::NotFound => StatusWord::RecordNotFound,
            Error::Full => StatusWord::NotEnoughSpace,
            Error::SignatureInvalid => StatusWord::SignatureInvalid,
            Error::UnknownInstruction => StatusWord::InsNotSupported,
            Error::UnknownClass => StatusWord::ClaNotSupported,
            Error::EncodingFailed | Error::InvalidKey => StatusWord::Unknown,
        }
    }
}

impl From<ApduError> for Error {
    fn from(e: ApduError) -> Self {
        match e {
            ApduError::InvalidLength => Error::InvalidLength,
            ApduError::InvalidEncoding => Error::EncodingFailed,
            ApduError::UnknownInstruction(_) => Error::UnknownInstruction,
            ApduError::UnknownClass(_) => Error::UnknownClass,
        }
    }
}
