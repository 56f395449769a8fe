// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Operator request / response layer
//!
//! Typed requests for checking balances, preparing, signing and sending,
//! and checking transactions. Failures are reported as an [ApiError] carrying the
//! shared error taxonomy and a retry hint.

use std::str::FromStr;

use ethers_core::{
    types::{H256, U256},
    utils::format_ether,
};
use serde::{Deserialize, Serialize};

use cardvault::ErrorKind;

use crate::{
    manager::Orchestrator,
    node::Node,
    store::TxStore,
    types::{Transaction, TxId, TxStatus},
    Error,
};

/// Operator facing error
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let kind = e.kind();

        Self {
            kind,
            message: e.to_string(),
            retryable: kind.is_retryable(),
        }
    }
}

/// Fetch the balance of an account
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRequest {
    /// Account, `0x` prefixed hex
    pub address: String,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub address: String,
    /// Balance in wei, decimal
    pub balance: String,
    /// Balance in ether with 18 decimal places
    pub balance_ether: String,
}

/// Prepare a value transfer for signing
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareTransactionRequest {
    /// Sender, `0x` prefixed hex
    pub from_address: String,
    /// Recipient, `0x` prefixed hex
    pub to_address: String,
    /// Value in wei, decimal
    pub value: String,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareTransactionResponse {
    pub transaction_id: TxId,
    /// Hash to be signed, hex without prefix
    pub message_hash: String,
    pub nonce: U256,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub chain_id: u64,
}

/// Sign and broadcast a prepared transaction
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignAndSendRequest {
    /// Message hash returned on prepare
    pub message_hash: String,
    /// 65 byte `r || s || v` signature, hex
    pub signature: String,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignAndSendResponse {
    pub transaction_id: TxId,
    /// `0x` prefixed transaction hash
    pub tx_hash: String,
    pub status: TxStatus,
}

/// Fetch transaction status by ID or message hash
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatusRequest {
    #[serde(default)]
    pub transaction_id: Option<TxId>,
    #[serde(default)]
    pub message_hash: Option<String>,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatusResponse {
    pub transaction_id: TxId,
    pub status: TxStatus,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub block_number: Option<u64>,
    pub retry_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl From<&Transaction> for TransactionStatusResponse {
    fn from(t: &Transaction) -> Self {
        Self {
            transaction_id: t.id,
            status: t.status,
            tx_hash: t.tx_hash.map(|h| format!("{h:?}")),
            block_number: t.block_number,
            retry_count: t.retry_count,
            last_error: t.last_error.clone(),
        }
    }
}

/// Parse a 32 byte hash, with or without `0x` prefix
fn parse_hash(s: &str) -> Result<H256, Error> {
    let b = hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| Error::InvalidInput(format!("message hash: {e}")))?;

    if b.len() != 32 {
        return Err(Error::InvalidInput(format!(
            "message hash length {}, expected 32 bytes",
            b.len()
        )));
    }

    Ok(H256::from_slice(&b))
}

/// Parse a decimal wei value
fn parse_value(s: &str) -> Result<U256, Error> {
    U256::from_dec_str(s.trim()).map_err(|e| Error::InvalidInput(format!("value '{s}': {e}")))
}

/// Fetch the latest balance of an account
pub async fn get_balance<N: Node, S: TxStore>(
    o: &Orchestrator<N, S>,
    req: &BalanceRequest,
) -> Result<BalanceResponse, ApiError> {
    let b = o.balance(&req.address).await?;

    Ok(BalanceResponse {
        address: req.address.clone(),
        balance: b.to_string(),
        balance_ether: format_ether(b),
    })
}

/// Create a pending transaction and return the hash to be signed
pub async fn prepare_transaction<N: Node, S: TxStore>(
    o: &Orchestrator<N, S>,
    req: &PrepareTransactionRequest,
) -> Result<PrepareTransactionResponse, ApiError> {
    let value = parse_value(&req.value)?;

    let t = o.create(&req.from_address, &req.to_address, value).await?;

    Ok(PrepareTransactionResponse {
        transaction_id: t.id,
        message_hash: hex::encode(t.message_hash),
        nonce: t.nonce,
        gas_price: t.gas_price,
        gas_limit: t.gas_limit,
        chain_id: t.chain_id,
    })
}

/// Verify a signature against a prepared transaction and broadcast it
pub async fn sign_and_send_transaction<N: Node, S: TxStore>(
    o: &Orchestrator<N, S>,
    req: &SignAndSendRequest,
) -> Result<SignAndSendResponse, ApiError> {
    let hash = parse_hash(&req.message_hash)?;
    let sig = hex::decode(req.signature.trim_start_matches("0x"))
        .map_err(|e| Error::InvalidInput(format!("signature: {e}")))?;

    let t = o.by_message_hash(&hash).await?;
    let t = o.sign_and_send(t.id, &sig).await?;

    let tx_hash = t
        .tx_hash
        .ok_or_else(|| Error::Store(format!("transaction {} missing hash", t.id)))?;

    Ok(SignAndSendResponse {
        transaction_id: t.id,
        tx_hash: format!("{tx_hash:?}"),
        status: t.status,
    })
}

/// Fetch the current state of a transaction
pub async fn get_transaction_status<N: Node, S: TxStore>(
    o: &Orchestrator<N, S>,
    req: &TransactionStatusRequest,
) -> Result<TransactionStatusResponse, ApiError> {
    let t = match (req.transaction_id, req.message_hash.as_deref()) {
        (Some(id), None) => o.get(id).await?,
        (None, Some(h)) => o.by_message_hash(&parse_hash(h)?).await?,
        _ => {
            return Err(Error::InvalidInput(
                "exactly one of transaction id or message hash required".to_string(),
            )
            .into())
        }
    };

    Ok(TransactionStatusResponse::from(&t))
}

impl FromStr for TransactionStatusRequest {
    type Err = ApiError;

    /// Parse a transaction ID or `0x` prefixed message hash
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(id) = s.parse::<TxId>() {
            return Ok(Self {
                transaction_id: Some(id),
                message_hash: None,
            });
        }

        parse_hash(s)?;

        Ok(Self {
            transaction_id: None,
            message_hash: Some(s.to_string()),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn api_errors() {
        let e = ApiError::from(Error::Rpc(crate::node::RpcError::Timeout));
        assert_eq!(e.kind, ErrorKind::Transient);
        assert!(e.retryable);

        let e = ApiError::from(Error::InProgress {
            from: Default::default(),
            id: 3,
        });
        assert_eq!(e.kind, ErrorKind::Conflict);
        assert!(!e.retryable);

        let j = serde_json::to_value(&e).unwrap();
        assert_eq!(j["kind"], "conflict");
        assert_eq!(j["retryable"], false);
    }

    #[test]
    fn parse_inputs() {
        assert_eq!(
            parse_value("1000000000000000").unwrap(),
            U256::exp10(15)
        );
        assert!(parse_value("1e15").is_err());
        assert!(parse_value("-1").is_err());

        let h = format!("0x{}", "ab".repeat(32));
        assert_eq!(parse_hash(&h).unwrap(), H256::repeat_byte(0xab));
        assert_eq!(parse_hash(&h[2..]).unwrap(), H256::repeat_byte(0xab));
        assert!(parse_hash("abcd").is_err());

        let r = TransactionStatusRequest::from_str("12").unwrap();
        assert_eq!(r.transaction_id, Some(12));

        let r = TransactionStatusRequest::from_str(&h).unwrap();
        assert_eq!(r.message_hash.as_deref(), Some(h.as_str()));

        assert!(TransactionStatusRequest::from_str("0x12").is_err());
    }

    #[test]
    fn request_names() {
        let r: SignAndSendRequest = serde_json::from_str(
            r#"{"messageHash": "00", "signature": "11"}"#,
        )
        .unwrap();
        assert_eq!(r.message_hash, "00");
    }
}
