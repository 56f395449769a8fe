// Copyright (c) 2022-2023 The MobileCoin Foundation

#![allow(unused)]

use std::{
    collections::HashMap,
    str::FromStr,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use ethers_core::{
    types::{Address, Bytes, H256, U256},
    utils::keccak256,
};
use k256::{ecdsa::SigningKey, PublicKey};
use log::{debug, LevelFilter};
use simplelog::SimpleLogger;

use cardvault::mpc::public_key_address;
use cardvault_orchestrator::{
    Node, Orchestrator, OrchestratorConfig, Receipt, RpcError, TxId, TxStatus, TxStore,
};

/// Pending nonce reported by [MockNode]
pub const NONCE: u64 = 7;

/// Gas price reported by [MockNode], 20 gwei
pub const GAS_PRICE: u64 = 20_000_000_000;

/// Balance reported by [MockNode] for every account, 1.5 ether
pub const BALANCE: u64 = 1_500_000_000_000_000_000;

/// Recipient used by tests
pub const TO: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

/// Scripted node, accepting transactions and returning configured receipts
#[derive(Default)]
pub struct MockNode {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    sent: Vec<Bytes>,
    send_failure: Option<RpcError>,
    receipts: HashMap<H256, Receipt>,
    receipt_failure: Option<RpcError>,
    receipt_failures: HashMap<H256, RpcError>,
    receipt_checks: usize,
}

impl MockNode {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Fail subsequent broadcasts with the provided error
    pub fn fail_send(&self, e: Option<RpcError>) {
        self.lock().send_failure = e;
    }

    /// Fail subsequent receipt checks with the provided error
    pub fn fail_receipts(&self, e: Option<RpcError>) {
        self.lock().receipt_failure = e;
    }

    /// Fail receipt checks for a single transaction with the provided error
    pub fn fail_receipt(&self, hash: H256, e: RpcError) {
        self.lock().receipt_failures.insert(hash, e);
    }

    /// Include a transaction with the provided execution status
    pub fn include(&self, hash: H256, status: u64, block_number: u64) {
        self.lock().receipts.insert(
            hash,
            Receipt {
                status,
                block_number,
                block_hash: H256::from_low_u64_be(block_number),
            },
        );
    }

    /// Transactions accepted by the node
    pub fn sent(&self) -> Vec<Bytes> {
        self.lock().sent.clone()
    }

    /// Number of receipt checks received
    pub fn receipt_checks(&self) -> usize {
        self.lock().receipt_checks
    }
}

#[async_trait]
impl Node for MockNode {
    async fn pending_nonce(&self, _address: Address) -> Result<U256, RpcError> {
        Ok(U256::from(NONCE))
    }

    async fn balance(&self, _address: Address) -> Result<U256, RpcError> {
        Ok(U256::from(BALANCE))
    }

    async fn gas_price(&self) -> Result<U256, RpcError> {
        Ok(U256::from(GAS_PRICE))
    }

    async fn send_raw(&self, raw: &Bytes) -> Result<H256, RpcError> {
        let mut s = self.lock();

        if let Some(e) = s.send_failure.clone() {
            return Err(e);
        }

        s.sent.push(raw.clone());

        Ok(H256::from(keccak256(raw)))
    }

    async fn receipt(&self, hash: H256) -> Result<Option<Receipt>, RpcError> {
        let mut s = self.lock();
        s.receipt_checks += 1;

        if let Some(e) = s.receipt_failure.clone() {
            return Err(e);
        }
        if let Some(e) = s.receipt_failures.get(&hash) {
            return Err(e.clone());
        }

        Ok(s.receipts.get(&hash).cloned())
    }
}

/// Initialise logging, honouring `LOG_LEVEL`
pub fn init_logging() {
    let log_level = match std::env::var("LOG_LEVEL").map(|v| LevelFilter::from_str(&v)) {
        Ok(Ok(l)) => l,
        _ => LevelFilter::Debug,
    };

    let _ = SimpleLogger::init(log_level, simplelog::Config::default());
}

/// Test configuration, chain 1 with default timings
pub fn config() -> OrchestratorConfig {
    OrchestratorConfig::new(1, "http://127.0.0.1:8545")
}

/// Setup an orchestrator over a [MockNode] and the provided store
pub fn setup<S: TxStore>(store: S, cfg: OrchestratorConfig) -> Orchestrator<MockNode, S> {
    init_logging();

    Orchestrator::new(MockNode::new(), store, cfg)
}

/// Sender key
pub fn sender() -> SigningKey {
    SigningKey::from_slice(&[0x46; 32]).unwrap()
}

/// Key unrelated to any sender
pub fn other_key() -> SigningKey {
    SigningKey::from_slice(&[0x11; 32]).unwrap()
}

/// `0x` prefixed address for a key
pub fn address_of(key: &SigningKey) -> String {
    let pk = PublicKey::from(key.verifying_key());
    format!("0x{}", hex::encode(public_key_address(&pk)))
}

/// Sign a message hash, returning `r || s || v` with `v = recid + 27`
pub fn sign(key: &SigningKey, hash: &H256) -> Vec<u8> {
    let (s, r) = key.sign_prehash_recoverable(hash.as_bytes()).unwrap();

    let mut b = s.to_bytes().to_vec();
    b.push(r.to_byte() + 27);
    b
}

/// Poll (in paused time) until a transaction reaches a status
pub async fn wait_status<S: TxStore>(
    o: &Orchestrator<MockNode, S>,
    id: TxId,
    status: TxStatus,
    limit: Duration,
) -> bool {
    let step = Duration::from_secs(1);
    let mut waited = Duration::ZERO;

    while waited < limit {
        if o.status(id).await.unwrap() == status {
            return true;
        }

        tokio::time::sleep(step).await;
        waited += step;
    }

    debug!("transaction {} not {} after {:?}", id, status, limit);

    false
}
