// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Ethereum node access
//!
//! [Node] abstracts the JSON-RPC calls used by the orchestrator,
//! [HttpNode] implements these over HTTP.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use ethers_core::types::{Address, Bytes, H256, U256, U64};
use log::{debug, trace};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};

use cardvault::ErrorKind;

use crate::types::Receipt;

/// Node RPC errors
#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum RpcError {
    /// Request timed out
    #[error("request timed out")]
    Timeout,

    /// Connection or HTTP level failure
    #[error("transport: {0}")]
    Transport(String),

    /// Node could not be reached
    #[error("node unreachable: {0}")]
    Unreachable(String),

    /// Node returned a JSON-RPC error
    #[error("rejected ({code}): {message}")]
    Rejected { code: i64, message: String },

    /// Response could not be decoded
    #[error("decode: {0}")]
    Decode(String),
}

impl RpcError {
    /// Map an RPC error to the shared [ErrorKind] taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            RpcError::Timeout | RpcError::Transport(_) => ErrorKind::Transient,
            RpcError::Unreachable(_) | RpcError::Rejected { .. } => ErrorKind::Fatal,
            RpcError::Decode(_) => ErrorKind::ProtocolError,
        }
    }

    /// Check whether a rejection indicates the transaction is already known
    /// to the node, as on resubmission after a lost response
    pub fn is_already_known(&self) -> bool {
        match self {
            RpcError::Rejected { message, .. } => {
                let m = message.to_lowercase();
                m.contains("already known") || m.contains("already imported")
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RpcError::Timeout
        } else if e.is_connect() {
            RpcError::Unreachable(e.to_string())
        } else if e.is_decode() {
            RpcError::Decode(e.to_string())
        } else {
            RpcError::Transport(e.to_string())
        }
    }
}

/// Ethereum node interface
#[async_trait]
pub trait Node: Send + Sync + 'static {
    /// Fetch the pending-bucket nonce for an address
    async fn pending_nonce(&self, address: Address) -> Result<U256, RpcError>;

    /// Fetch the latest balance for an address, in wei
    async fn balance(&self, address: Address) -> Result<U256, RpcError>;

    /// Fetch the suggested gas price
    async fn gas_price(&self) -> Result<U256, RpcError>;

    /// Broadcast a signed transaction, returning the transaction hash
    async fn send_raw(&self, raw: &Bytes) -> Result<H256, RpcError>;

    /// Fetch the receipt for a transaction, `None` while not yet included
    async fn receipt(&self, hash: H256) -> Result<Option<Receipt>, RpcError>;
}

/// JSON-RPC 2.0 node client over HTTP
pub struct HttpNode {
    url: String,
    client: reqwest::Client,
    id: AtomicU64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    #[serde(default)]
    status: Option<U64>,
    #[serde(default)]
    block_number: Option<U64>,
    #[serde(default)]
    block_hash: Option<H256>,
}

impl HttpNode {
    /// Create a client for the node at `url` with the provided request timeout
    pub fn new(url: &str, timeout: Duration) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        Ok(Self {
            url: url.to_string(),
            client,
            id: AtomicU64::new(1),
        })
    }

    /// Issue a JSON-RPC call, returning `None` for a null result
    async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<R>, RpcError> {
        let id = self.id.fetch_add(1, Ordering::Relaxed);

        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        trace!("rpc {} request: {}", id, payload);

        let resp = self.client.post(&self.url).json(&payload).send().await?;

        if !resp.status().is_success() {
            return Err(RpcError::Transport(format!("HTTP {}", resp.status())));
        }

        let body: Value = resp.json().await?;

        trace!("rpc {} response: {}", id, body);

        if let Some(e) = body.get("error").filter(|e| !e.is_null()) {
            let code = e.get("code").and_then(Value::as_i64).unwrap_or_default();
            let message = e
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            debug!("rpc {} {} rejected: {} {}", id, method, code, message);

            return Err(RpcError::Rejected { code, message });
        }

        match body.get("result") {
            None | Some(Value::Null) => Ok(None),
            Some(v) => serde_json::from_value(v.clone())
                .map(Some)
                .map_err(|e| RpcError::Decode(format!("{method}: {e}"))),
        }
    }

    /// Issue a JSON-RPC call where a null result is an error
    async fn call_required<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<R, RpcError> {
        self.call(method, params)
            .await?
            .ok_or_else(|| RpcError::Decode(format!("{method}: missing result")))
    }
}

#[async_trait]
impl Node for HttpNode {
    async fn pending_nonce(&self, address: Address) -> Result<U256, RpcError> {
        self.call_required("eth_getTransactionCount", json!([address, "pending"]))
            .await
    }

    async fn balance(&self, address: Address) -> Result<U256, RpcError> {
        self.call_required("eth_getBalance", json!([address, "latest"]))
            .await
    }

    async fn gas_price(&self) -> Result<U256, RpcError> {
        self.call_required("eth_gasPrice", json!([])).await
    }

    async fn send_raw(&self, raw: &Bytes) -> Result<H256, RpcError> {
        self.call_required("eth_sendRawTransaction", json!([raw]))
            .await
    }

    async fn receipt(&self, hash: H256) -> Result<Option<Receipt>, RpcError> {
        let r: Option<RawReceipt> = self
            .call("eth_getTransactionReceipt", json!([hash]))
            .await?;

        r.map(parse_receipt).transpose()
    }
}

/// Convert a raw receipt, rejecting receipts without inclusion details
fn parse_receipt(r: RawReceipt) -> Result<Receipt, RpcError> {
    match (r.status, r.block_number, r.block_hash) {
        (Some(status), Some(block_number), Some(block_hash)) => Ok(Receipt {
            status: status.as_u64(),
            block_number: block_number.as_u64(),
            block_hash,
        }),
        _ => Err(RpcError::Decode("incomplete receipt".to_string())),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn receipts() {
        let r: RawReceipt = serde_json::from_value(json!({
            "transactionHash": format!("0x{}", "ab".repeat(32)),
            "blockNumber": "0x1b4",
            "blockHash": format!("0x{}", "cd".repeat(32)),
            "status": "0x1",
            "logs": [],
        }))
        .unwrap();

        let r = parse_receipt(r).unwrap();
        assert_eq!(r.status, 1);
        assert_eq!(r.block_number, 436);
        assert_eq!(r.block_hash, H256::repeat_byte(0xcd));

        // Pre-byzantium receipts carry no status
        let r: RawReceipt = serde_json::from_value(json!({
            "blockNumber": "0x1",
            "blockHash": format!("0x{}", "cd".repeat(32)),
        }))
        .unwrap();
        assert!(matches!(parse_receipt(r), Err(RpcError::Decode(_))));
    }

    #[test]
    fn already_known() {
        let e = RpcError::Rejected {
            code: -32000,
            message: "ALREADY known".to_string(),
        };
        assert!(e.is_already_known());

        let e = RpcError::Rejected {
            code: -32000,
            message: "nonce too low".to_string(),
        };
        assert!(!e.is_already_known());
        assert_eq!(e.kind(), ErrorKind::Fatal);
    }

    #[tokio::test]
    async fn unreachable_node() {
        // Nothing listens on the discard port
        let n = HttpNode::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();

        let e = n.gas_price().await.unwrap_err();
        assert!(
            matches!(
                e,
                RpcError::Unreachable(_) | RpcError::Transport(_) | RpcError::Timeout
            ),
            "{e}"
        );
    }
}
