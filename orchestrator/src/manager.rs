// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transaction state machine
//!
//! ```text
//! create -> Pending -> sign -> Signed -> submit -> Submitted -> Confirmed
//!                                           \                \-> Failed
//!                                            \-> Failed (node rejected)
//! ```
//!
//! The [Orchestrator] is the only writer of transaction rows. Submitted
//! transactions are settled by a per-transaction monitor, with a global
//! sweeper picking up transactions whose monitor was cancelled, ran out
//! of attempts, or was lost with a previous process.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use chrono::Utc;
use ethers_core::types::{Address, Bytes, H256, U256};
use log::{debug, error, info, warn};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use cardvault::normalize::parse_address;

use crate::{
    config::OrchestratorConfig,
    eip155::{self, UnsignedTx},
    node::{Node, RpcError},
    store::TxStore,
    types::{Transaction, TxId, TxStatus},
    Error,
};

/// Receipt message recorded for reverted transactions
pub const EXECUTION_REVERTED: &str = "execution reverted";

/// Transaction orchestrator, cheap to clone and shared with background tasks
pub struct Orchestrator<N: Node, S: TxStore> {
    inner: Arc<Inner<N, S>>,
}

impl<N: Node, S: TxStore> Clone for Orchestrator<N, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<N, S> {
    node: N,
    store: S,
    cfg: OrchestratorConfig,

    /// Parent token for all background tasks
    cancel: CancellationToken,
    monitors: Mutex<HashMap<TxId, Monitor>>,
    monitor_seq: AtomicU64,
}

struct Monitor {
    seq: u64,
    cancel: CancellationToken,
}

impl<N: Node, S: TxStore> Orchestrator<N, S> {
    pub fn new(node: N, store: S, cfg: OrchestratorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                node,
                store,
                cfg,
                cancel: CancellationToken::new(),
                monitors: Mutex::new(HashMap::new()),
                monitor_seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn node(&self) -> &N {
        &self.inner.node
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.cfg
    }

    /// Create a pending value transfer from `from` to `to`
    pub async fn create(&self, from: &str, to: &str, value: U256) -> Result<Transaction, Error> {
        let from = Address::from(parse_address(from)?);
        let to = Address::from(parse_address(to)?);

        // Early exit before node calls, the insert re-checks atomically
        if let Some(t) = self.inner.store.in_flight(&from).await? {
            return Err(Error::InProgress { from, id: t.id });
        }

        let nonce = self.inner.node.pending_nonce(from).await?;
        let gas_price = self.inner.node.gas_price().await?;

        let cfg = &self.inner.cfg;
        let unsigned = eip155::build_unsigned(
            to,
            value,
            nonce,
            U256::from(cfg.default_gas_limit),
            gas_price,
            cfg.chain_id,
        );

        let tx = Transaction {
            id: 0,
            from,
            to,
            value,
            nonce,
            gas_limit: unsigned.gas_limit,
            gas_price,
            chain_id: cfg.chain_id,
            unsigned_tx: unsigned.rlp(),
            message_hash: unsigned.sighash(),
            signature: None,
            signed_tx: None,
            tx_hash: None,
            block_number: None,
            block_hash: None,
            status: TxStatus::Pending,
            created_at: Utc::now(),
            submitted_at: None,
            confirmed_at: None,
            last_checked_at: None,
            retry_count: 0,
            last_error: None,
        };

        let tx = self.inner.store.insert(tx).await?;

        info!(
            "Created transaction {} from {:?} (nonce: {}, gas price: {})",
            tx.id, tx.from, tx.nonce, tx.gas_price
        );

        Ok(tx)
    }

    /// Attach a signature to a pending transaction.
    ///
    /// The signature must recover the transaction sender, otherwise the
    /// transaction stays pending and may be signed again.
    pub async fn sign(&self, id: TxId, signature: &[u8]) -> Result<Transaction, Error> {
        let tx = self.get(id).await?;
        expect_status(&tx, TxStatus::Pending)?;

        let raw = eip155::attach_signature(&unsigned(&tx), signature)?;
        let (_, recovered) = eip155::recover_signer(&raw)?;

        if recovered != tx.from {
            warn!(
                "Transaction {} signature recovers {:?}, expected {:?}",
                id, recovered, tx.from
            );
            return Err(Error::InvalidSignature {
                expected: tx.from,
                recovered,
            });
        }

        let signature = Bytes::from(signature.to_vec());
        let tx = self
            .inner
            .store
            .transition(id, TxStatus::Pending, TxStatus::Signed, move |t| {
                t.signature = Some(signature);
                t.signed_tx = Some(raw);
            })
            .await?;

        info!("Signed transaction {}", id);

        Ok(tx)
    }

    /// Broadcast a signed transaction and start its monitor.
    ///
    /// Network failures leave the transaction signed for a later retry,
    /// node rejections park it as failed.
    pub async fn submit(&self, id: TxId) -> Result<Transaction, Error> {
        let tx = self.get(id).await?;
        expect_status(&tx, TxStatus::Signed)?;

        let raw = tx
            .signed_tx
            .clone()
            .ok_or_else(|| Error::Store(format!("transaction {id} missing signed payload")))?;
        let local = eip155::tx_hash(&raw);

        let hash = match self.inner.node.send_raw(&raw).await {
            Ok(h) => {
                if h != local {
                    warn!("Node returned hash {:?} for {:?}", h, local);
                }
                h
            }
            Err(e) if e.is_already_known() => {
                info!("Transaction {} already known to node", id);
                local
            }
            Err(e @ RpcError::Rejected { .. }) => {
                warn!("Transaction {} rejected: {}", id, e);

                let msg = e.to_string();
                self.inner
                    .store
                    .transition(id, TxStatus::Signed, TxStatus::Failed, move |t| {
                        t.last_error = Some(msg);
                    })
                    .await?;

                return Err(e.into());
            }
            Err(e) => {
                warn!("Transaction {} broadcast failed: {}", id, e);
                return Err(e.into());
            }
        };

        let tx = self
            .inner
            .store
            .transition(id, TxStatus::Signed, TxStatus::Submitted, move |t| {
                t.tx_hash = Some(hash);
                t.submitted_at = Some(Utc::now());
                t.last_error = None;
            })
            .await?;

        info!("Submitted transaction {} ({:?})", id, hash);

        self.spawn_monitor(id);

        Ok(tx)
    }

    /// Sign and broadcast a transaction.
    ///
    /// Retrying with the same signature after a failed broadcast resumes
    /// from the signed state.
    pub async fn sign_and_send(&self, id: TxId, signature: &[u8]) -> Result<Transaction, Error> {
        let tx = self.get(id).await?;

        let resume = tx.status == TxStatus::Signed
            && matches!(&tx.signature, Some(s) if s.to_vec() == signature);

        if !resume {
            self.sign(id, signature).await?;
        }

        self.submit(id).await
    }

    /// Fetch the latest balance of an account, in wei
    pub async fn balance(&self, address: &str) -> Result<U256, Error> {
        let address = Address::from(parse_address(address)?);

        let b = self.inner.node.balance(address).await?;
        debug!("Balance of {:?}: {} wei", address, b);

        Ok(b)
    }

    /// Fetch a transaction by ID
    pub async fn get(&self, id: TxId) -> Result<Transaction, Error> {
        self.inner
            .store
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("id {id}")))
    }

    /// Fetch the status of a transaction
    pub async fn status(&self, id: TxId) -> Result<TxStatus, Error> {
        self.get(id).await.map(|t| t.status)
    }

    /// Fetch a transaction by signing message hash
    pub async fn by_message_hash(&self, hash: &H256) -> Result<Transaction, Error> {
        self.inner
            .store
            .by_message_hash(hash)
            .await?
            .ok_or_else(|| Error::NotFound(format!("message hash {hash:?}")))
    }

    /// Check for a receipt once, settling the transaction where available.
    ///
    /// Returns the resulting status. Transactions not in the submitted
    /// state are returned unchanged.
    pub async fn refresh(&self, id: TxId) -> Result<TxStatus, Error> {
        let tx = self.get(id).await?;
        if tx.status != TxStatus::Submitted {
            return Ok(tx.status);
        }

        let hash = tx
            .tx_hash
            .ok_or_else(|| Error::Store(format!("transaction {id} missing hash")))?;

        let store = &self.inner.store;
        let now = Utc::now();

        let r = match self.inner.node.receipt(hash).await {
            Ok(Some(r)) if r.status == 1 => {
                info!("Transaction {} confirmed in block {}", id, r.block_number);

                store
                    .transition(id, TxStatus::Submitted, TxStatus::Confirmed, move |t| {
                        t.block_number = Some(r.block_number);
                        t.block_hash = Some(r.block_hash);
                        t.confirmed_at = Some(now);
                        t.last_checked_at = Some(now);
                        t.last_error = None;
                    })
                    .await
            }
            Ok(Some(r)) => {
                warn!("Transaction {} reverted in block {}", id, r.block_number);

                store
                    .transition(id, TxStatus::Submitted, TxStatus::Failed, move |t| {
                        t.block_number = Some(r.block_number);
                        t.block_hash = Some(r.block_hash);
                        t.confirmed_at = Some(now);
                        t.last_checked_at = Some(now);
                        t.last_error = Some(EXECUTION_REVERTED.to_string());
                    })
                    .await
            }
            Ok(None) => {
                debug!("Transaction {} awaiting receipt", id);

                store
                    .transition(id, TxStatus::Submitted, TxStatus::Submitted, move |t| {
                        t.retry_count += 1;
                        t.last_checked_at = Some(now);
                    })
                    .await
            }
            Err(e) => {
                let msg = e.to_string();
                let r = store
                    .transition(id, TxStatus::Submitted, TxStatus::Submitted, move |t| {
                        t.retry_count += 1;
                        t.last_checked_at = Some(now);
                        t.last_error = Some(msg);
                    })
                    .await;

                // Settled elsewhere in the meantime
                if let Err(Error::StatusMismatch { actual, .. }) = r {
                    return Ok(actual);
                }
                r?;

                return Err(e.into());
            }
        };

        match r {
            Ok(t) => Ok(t.status),
            Err(Error::StatusMismatch { actual, .. }) => Ok(actual),
            Err(e) => Err(e),
        }
    }

    /// Spawn a receipt monitor for a submitted transaction, replacing any
    /// existing monitor
    pub fn spawn_monitor(&self, id: TxId) -> JoinHandle<()> {
        let cancel = self.inner.cancel.child_token();
        let seq = self.inner.monitor_seq.fetch_add(1, Ordering::Relaxed);

        let prev = self.monitors().insert(
            id,
            Monitor {
                seq,
                cancel: cancel.clone(),
            },
        );
        if let Some(p) = prev {
            p.cancel.cancel();
        }

        let o = self.clone();
        tokio::spawn(async move {
            o.monitor(id, &cancel).await;

            let mut m = o.monitors();
            if m.get(&id).map(|m| m.seq) == Some(seq) {
                m.remove(&id);
            }
        })
    }

    /// Cancel the monitor for a transaction, leaving it for the sweeper
    pub fn cancel_monitor(&self, id: TxId) -> bool {
        match self.monitors().remove(&id) {
            Some(m) => {
                m.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Check whether a live monitor exists for a transaction
    pub fn has_monitor(&self, id: TxId) -> bool {
        self.monitors()
            .get(&id)
            .map(|m| !m.cancel.is_cancelled())
            .unwrap_or(false)
    }

    async fn monitor(&self, id: TxId, cancel: &CancellationToken) {
        let tick = self.inner.cfg.confirm_tick();
        let attempts = self.inner.cfg.confirm_max_attempts;

        debug!("Monitoring transaction {} ({} x {:?})", id, attempts, tick);

        for n in 1..=attempts {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Monitor for transaction {} cancelled", id);
                    return;
                }
                _ = tokio::time::sleep(tick) => (),
            }

            match self.refresh(id).await {
                Ok(TxStatus::Submitted) => (),
                Ok(s) => {
                    debug!("Monitor for transaction {} done ({})", id, s);
                    return;
                }
                Err(e) => warn!("Transaction {} receipt check {} failed: {}", id, n, e),
            }
        }

        info!(
            "Transaction {} unsettled after {} checks, leaving for sweeper",
            id, attempts
        );
    }

    /// Refresh submitted transactions without a live monitor, returning
    /// the number checked.
    ///
    /// A failed receipt check is recorded on its row and does not stop
    /// the remaining rows from being checked.
    pub async fn sweep(&self) -> Result<usize, Error> {
        let submitted = self.inner.store.list_by_status(TxStatus::Submitted).await?;

        let mut n = 0;
        for t in submitted.iter().filter(|t| !self.has_monitor(t.id)) {
            n += 1;

            match self.refresh(t.id).await {
                Ok(s) => debug!("Sweep transaction {}: {}", t.id, s),
                Err(e) if e.is_retryable() => {
                    warn!("Sweep transaction {} failed: {}", t.id, e)
                }
                Err(e) => error!("Sweep transaction {} failed: {}", t.id, e),
            }
        }

        Ok(n)
    }

    /// Spawn the periodic sweeper, the first sweep runs immediately
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let cancel = self.inner.cancel.child_token();
        let o = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(o.inner.cfg.sweep_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => (),
                }

                match o.sweep().await {
                    Ok(0) => (),
                    Ok(n) => debug!("Swept {} transactions", n),
                    Err(e) => error!("Sweep failed: {}", e),
                }
            }

            debug!("Sweeper exit");
        })
    }

    /// Cancel all background tasks.
    ///
    /// Transaction state is left as-is, submitted transactions are
    /// re-adopted by the sweeper on next start.
    pub fn shutdown(&self) {
        info!("Shutting down orchestrator");

        self.inner.cancel.cancel();
        self.monitors().clear();
    }

    fn monitors(&self) -> MutexGuard<'_, HashMap<TxId, Monitor>> {
        // Map entries are replaced whole
        self.inner.monitors.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn expect_status(tx: &Transaction, expected: TxStatus) -> Result<(), Error> {
    match tx.status == expected {
        true => Ok(()),
        false => Err(Error::StatusMismatch {
            id: tx.id,
            expected,
            actual: tx.status,
        }),
    }
}

/// Rebuild the unsigned transaction from stored fields
fn unsigned(tx: &Transaction) -> UnsignedTx {
    eip155::build_unsigned(
        tx.to,
        tx.value,
        tx.nonce,
        tx.gas_limit,
        tx.gas_price,
        tx.chain_id,
    )
}
