// Copyright (c) 2022-2023 The MobileCoin Foundation

use cardvault_apdu::{status::StatusWord, ApduError};
use serde::{Deserialize, Serialize};

use crate::transport::TransportError;

/// Top level error taxonomy, shared by all vault and orchestrator operations
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Length, hex parse or address format errors
    InvalidInput,
    /// Card signature failure, or a transaction signature that does not recover the sender
    Unauthorized,
    /// No such record, blob or transaction
    NotFound,
    /// In-flight transaction or account binding already exists
    Conflict,
    /// Card storage full
    ResourceExhausted,
    /// Timeouts and IO errors, may be retried
    Transient,
    /// Unreachable node or corrupted persisted state
    Fatal,
    /// Malformed APDU or unparseable MPC output
    ProtocolError,
}

impl ErrorKind {
    /// Check whether an operation failing with this kind may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

impl From<StatusWord> for ErrorKind {
    fn from(sw: StatusWord) -> Self {
        match sw {
            StatusWord::RecordNotFound => ErrorKind::NotFound,
            StatusWord::NotEnoughSpace => ErrorKind::ResourceExhausted,
            StatusWord::SignatureInvalid => ErrorKind::Unauthorized,
            StatusWord::WrongLength => ErrorKind::InvalidInput,
            _ => ErrorKind::ProtocolError,
        }
    }
}

/// Vault API error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller supplied invalid input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Card returned an error status
    #[error("card status: {0}")]
    Status(StatusWord),

    /// Card returned an unrecognised status word
    #[error("unknown card status: {0:04x}")]
    UnknownStatus(u16),

    /// Card transport error
    #[error("transport error: {0}")]
    Transport(TransportError),

    /// Timeout waiting for card response
    #[error("timeout waiting for card response")]
    RequestTimeout,

    /// APDU encoding / decoding error
    #[error("APDU error: {0}")]
    Apdu(ApduError),

    /// Card response did not match the request
    #[error("unexpected APDU response")]
    UnexpectedResponse,

    /// Persisted blob could not be decrypted or decompressed
    #[error("corrupted blob: {0}")]
    Corrupted(&'static str),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// MPC binary failed or produced unparseable output
    #[error("MPC error: {0}")]
    Mpc(String),

    /// MPC binary did not complete in time
    #[error("timeout waiting for MPC binary")]
    MpcTimeout,

    /// Binding already exists
    #[error("conflict: {0}")]
    Conflict(String),

    /// Binding does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Authorisation signing failed
    #[error("signer error: {0}")]
    Signer(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Map an error to the shared [ErrorKind] taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) | Error::Config(_) => ErrorKind::InvalidInput,
            Error::Status(sw) => ErrorKind::from(*sw),
            Error::UnknownStatus(_) | Error::Apdu(_) | Error::UnexpectedResponse => {
                ErrorKind::ProtocolError
            }
            Error::Transport(_) | Error::RequestTimeout | Error::Io(_) | Error::MpcTimeout => {
                ErrorKind::Transient
            }
            Error::Corrupted(_) => ErrorKind::Fatal,
            Error::Mpc(_) => ErrorKind::ProtocolError,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Signer(_) => ErrorKind::Unauthorized,
        }
    }

    /// Check whether the failed operation may be retried
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl From<ApduError> for Error {
    fn from(e: ApduError) -> Self {
        Error::Apdu(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout => Error::RequestTimeout,
            _ => Error::Transport(e),
        }
    }
}
