// Copyright (c) 2022-2023 The MobileCoin Foundation

use ethers_core::types::Address;

use cardvault::ErrorKind;

use crate::{eip155::Eip155Error, node::RpcError, types::TxId, TxStatus};

/// Orchestrator error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller supplied invalid input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Signature does not recover the transaction sender
    #[error("signature recovers {recovered:?}, expected {expected:?}")]
    InvalidSignature { expected: Address, recovered: Address },

    /// No matching transaction
    #[error("transaction not found: {0}")]
    NotFound(String),

    /// Sender already has an in-flight transaction
    #[error("transaction {id} already in progress for {from:?}")]
    InProgress { from: Address, id: TxId },

    /// Transaction was not in the expected state
    #[error("transaction {id} is {actual}, expected {expected}")]
    StatusMismatch {
        id: TxId,
        expected: TxStatus,
        actual: TxStatus,
    },

    /// Node RPC failure
    #[error("node error: {0}")]
    Rpc(#[from] RpcError),

    /// Transaction encoding failure
    #[error("transaction encoding: {0}")]
    Eip155(#[from] Eip155Error),

    /// Transaction store failure or corrupted persisted state
    #[error("store error: {0}")]
    Store(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Driver or normalisation failure, keeping its kind
    #[error(transparent)]
    Vault(#[from] cardvault::Error),
}

impl Error {
    /// Map an error to the shared [ErrorKind] taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) | Error::Config(_) => ErrorKind::InvalidInput,
            Error::InvalidSignature { .. } => ErrorKind::Unauthorized,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InProgress { .. } | Error::StatusMismatch { .. } => ErrorKind::Conflict,
            Error::Rpc(e) => e.kind(),
            Error::Eip155(e) => match e {
                Eip155Error::SignatureLength(_) | Eip155Error::RecoveryByte(_) => {
                    ErrorKind::InvalidInput
                }
                Eip155Error::Unrecoverable => ErrorKind::Unauthorized,
                Eip155Error::Rlp(_) | Eip155Error::NotReplayProtected(_) => {
                    ErrorKind::ProtocolError
                }
            },
            Error::Store(_) => ErrorKind::Fatal,
            Error::Vault(e) => e.kind(),
        }
    }

    /// Check whether the failed operation may be retried
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn kinds() {
        let tests = [
            (
                Error::InvalidSignature {
                    expected: Address::zero(),
                    recovered: Address::repeat_byte(1),
                },
                ErrorKind::Unauthorized,
            ),
            (
                Error::InProgress {
                    from: Address::zero(),
                    id: 1,
                },
                ErrorKind::Conflict,
            ),
            (Error::Rpc(RpcError::Timeout), ErrorKind::Transient),
            (
                Error::Rpc(RpcError::Rejected {
                    code: -32000,
                    message: "nonce too low".to_string(),
                }),
                ErrorKind::Fatal,
            ),
            (
                Error::Eip155(Eip155Error::SignatureLength(64)),
                ErrorKind::InvalidInput,
            ),
            (Error::Store("truncated".to_string()), ErrorKind::Fatal),
            (
                Error::from(cardvault::normalize::parse_address("0x1234").unwrap_err()),
                ErrorKind::InvalidInput,
            ),
            (
                Error::from(cardvault::Error::Corrupted("tag mismatch")),
                ErrorKind::Fatal,
            ),
            (Error::from(cardvault::Error::MpcTimeout), ErrorKind::Transient),
        ];

        for (e, kind) in tests {
            assert_eq!(e.kind(), kind, "{e}");
        }

        assert!(Error::Rpc(RpcError::Transport("reset".to_string())).is_retryable());
        assert!(!Error::NotFound("1".to_string()).is_retryable());
    }
}
