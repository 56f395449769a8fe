// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transaction records

use chrono::{DateTime, Utc};
use ethers_core::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Store assigned transaction identifier
pub type TxId = u64;

/// Transaction lifecycle status
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    /// Created, awaiting signature
    Pending,
    /// Signature verified, awaiting broadcast
    Signed,
    /// Accepted by the node, awaiting receipt
    Submitted,
    /// Included with a successful receipt
    Confirmed,
    /// Rejected or reverted
    Failed,
}

impl TxStatus {
    /// Confirmed and failed transactions never change
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Confirmed | TxStatus::Failed)
    }

    /// Pending, signed and submitted transactions occupy their sender
    pub fn is_in_flight(&self) -> bool {
        !self.is_terminal()
    }
}

/// Value transfer transaction, owned by the orchestrator
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,

    pub from: Address,
    pub to: Address,
    pub value: U256,

    pub nonce: U256,
    pub gas_limit: U256,
    pub gas_price: U256,
    pub chain_id: u64,

    /// EIP-155 signing payload
    pub unsigned_tx: Bytes,
    /// Keccak256 of `unsigned_tx`
    pub message_hash: H256,

    /// `r || s || v` signature, as supplied
    #[serde(default)]
    pub signature: Option<Bytes>,
    /// Signed RLP for broadcast
    #[serde(default)]
    pub signed_tx: Option<Bytes>,
    #[serde(default)]
    pub tx_hash: Option<H256>,

    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub block_hash: Option<H256>,

    pub status: TxStatus,

    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Receipt fields used to settle submitted transactions
#[derive(Clone, PartialEq, Debug)]
pub struct Receipt {
    /// Execution status, `1` on success
    pub status: u64,
    pub block_number: u64,
    pub block_hash: H256,
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn status_names() {
        assert_eq!(TxStatus::Submitted.to_string(), "submitted");
        assert_eq!(TxStatus::from_str("confirmed").unwrap(), TxStatus::Confirmed);

        assert_eq!(
            serde_json::to_string(&TxStatus::Pending).unwrap(),
            r#""pending""#
        );
    }

    #[test]
    fn terminal_states() {
        for s in [TxStatus::Pending, TxStatus::Signed, TxStatus::Submitted] {
            assert!(s.is_in_flight(), "{s}");
        }
        for s in [TxStatus::Confirmed, TxStatus::Failed] {
            assert!(s.is_terminal(), "{s}");
        }
    }
}
