// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transaction stores
//!
//! Every update is gated on the expected current status, and inserts
//! enforce at most one in-flight transaction per sender.

use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use ethers_core::types::{Address, H256};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::{
    types::{Transaction, TxId, TxStatus},
    Error,
};

/// Transaction table
#[async_trait]
pub trait TxStore: Send + Sync + 'static {
    /// Insert a new transaction, assigning its ID.
    ///
    /// Fails with [Error::InProgress] where the sender already has an
    /// in-flight transaction.
    async fn insert(&self, tx: Transaction) -> Result<Transaction, Error>;

    /// Fetch a transaction by ID
    async fn get(&self, id: TxId) -> Result<Option<Transaction>, Error>;

    /// Fetch a transaction by signing message hash, preferring the
    /// in-flight row and otherwise the newest
    async fn by_message_hash(&self, hash: &H256) -> Result<Option<Transaction>, Error>;

    /// Fetch the in-flight transaction for a sender
    async fn in_flight(&self, from: &Address) -> Result<Option<Transaction>, Error>;

    /// List transactions with the provided status, in ID order
    async fn list_by_status(&self, status: TxStatus) -> Result<Vec<Transaction>, Error>;

    /// Move a transaction from `expected` to `next`, applying `f` to the
    /// stored row.
    ///
    /// Fails with [Error::StatusMismatch] leaving the row unchanged where
    /// the current status is not `expected`.
    async fn transition<F>(
        &self,
        id: TxId,
        expected: TxStatus,
        next: TxStatus,
        f: F,
    ) -> Result<Transaction, Error>
    where
        F: FnOnce(&mut Transaction) + Send;
}

/// Table state shared by store implementations
#[derive(Clone, Default, Debug, Serialize, Deserialize)]
struct Table {
    next_id: TxId,
    transactions: BTreeMap<TxId, Transaction>,
}

impl Table {
    fn insert(&mut self, mut tx: Transaction) -> Result<Transaction, Error> {
        if let Some(t) = self.in_flight(&tx.from) {
            return Err(Error::InProgress {
                from: tx.from,
                id: t.id,
            });
        }

        self.next_id = self.next_id.max(1);

        tx.id = self.next_id;
        self.next_id += 1;

        self.transactions.insert(tx.id, tx.clone());

        Ok(tx)
    }

    fn in_flight(&self, from: &Address) -> Option<&Transaction> {
        self.transactions
            .values()
            .find(|t| &t.from == from && t.status.is_in_flight())
    }

    /// Rows preparing the same transfer share a message hash, the in-flight
    /// row wins, otherwise the newest
    fn by_message_hash(&self, hash: &H256) -> Option<&Transaction> {
        let mut newest = None;

        for t in self
            .transactions
            .values()
            .rev()
            .filter(|t| &t.message_hash == hash)
        {
            if t.status.is_in_flight() {
                return Some(t);
            }
            newest = newest.or(Some(t));
        }

        newest
    }

    fn list_by_status(&self, status: TxStatus) -> Vec<Transaction> {
        self.transactions
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect()
    }

    fn transition<F>(
        &mut self,
        id: TxId,
        expected: TxStatus,
        next: TxStatus,
        f: F,
    ) -> Result<Transaction, Error>
    where
        F: FnOnce(&mut Transaction),
    {
        let t = self
            .transactions
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("id {id}")))?;

        if t.status != expected {
            return Err(Error::StatusMismatch {
                id,
                expected,
                actual: t.status,
            });
        }

        f(t);
        t.id = id;
        t.status = next;

        if expected != next {
            debug!("transaction {}: {} -> {}", id, expected, next);
        }

        Ok(t.clone())
    }
}

/// In-memory transaction store
#[derive(Default)]
pub struct MemoryStore {
    table: Mutex<Table>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        // Table updates are applied whole or not at all
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TxStore for MemoryStore {
    async fn insert(&self, tx: Transaction) -> Result<Transaction, Error> {
        self.lock().insert(tx)
    }

    async fn get(&self, id: TxId) -> Result<Option<Transaction>, Error> {
        Ok(self.lock().transactions.get(&id).cloned())
    }

    async fn by_message_hash(&self, hash: &H256) -> Result<Option<Transaction>, Error> {
        Ok(self.lock().by_message_hash(hash).cloned())
    }

    async fn in_flight(&self, from: &Address) -> Result<Option<Transaction>, Error> {
        Ok(self.lock().in_flight(from).cloned())
    }

    async fn list_by_status(&self, status: TxStatus) -> Result<Vec<Transaction>, Error> {
        Ok(self.lock().list_by_status(status))
    }

    async fn transition<F>(
        &self,
        id: TxId,
        expected: TxStatus,
        next: TxStatus,
        f: F,
    ) -> Result<Transaction, Error>
    where
        F: FnOnce(&mut Transaction) + Send,
    {
        self.lock().transition(id, expected, next, f)
    }
}

/// JSON file backed transaction store.
///
/// The whole table is rewritten on every update, via a temporary file
/// and rename so a crash leaves either the previous or the new snapshot.
/// Updates are applied to a copy of the table and only become visible
/// once persisted.
pub struct JsonFileStore {
    path: PathBuf,
    table: tokio::sync::Mutex<Table>,
}

impl JsonFileStore {
    /// Open a store at `path`, loading any existing snapshot
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        let table = match tokio::fs::read(&path).await {
            Ok(b) => {
                let t: Table = serde_json::from_slice(&b)
                    .map_err(|e| Error::Store(format!("{}: {e}", path.display())))?;

                info!(
                    "Loaded {} transactions from {}",
                    t.transactions.len(),
                    path.display()
                );

                t
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Table::default(),
            Err(e) => return Err(Error::Store(format!("{}: {e}", path.display()))),
        };

        Ok(Self {
            path,
            table: tokio::sync::Mutex::new(table),
        })
    }

    /// Snapshot file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply an update to a copy of the table, persist it, then publish it
    async fn update<R>(
        &self,
        f: impl FnOnce(&mut Table) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let mut table = self.table.lock().await;

        let mut next = table.clone();
        let r = f(&mut next)?;

        write_snapshot(&self.path, &next).await?;
        *table = next;

        Ok(r)
    }
}

async fn write_snapshot(path: &Path, table: &Table) -> Result<(), Error> {
    let b = serde_json::to_vec_pretty(table).map_err(|e| Error::Store(e.to_string()))?;
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut f = NamedTempFile::new_in(dir)?;
        f.write_all(&b)?;
        f.as_file().sync_all()?;
        f.persist(&path).map_err(|e| e.error)?;

        Ok(())
    })
    .await
    .map_err(|e| Error::Store(e.to_string()))?
    .map_err(|e| Error::Store(format!("snapshot write: {e}")))
}

#[async_trait]
impl TxStore for JsonFileStore {
    async fn insert(&self, tx: Transaction) -> Result<Transaction, Error> {
        self.update(|t| t.insert(tx)).await
    }

    async fn get(&self, id: TxId) -> Result<Option<Transaction>, Error> {
        Ok(self.table.lock().await.transactions.get(&id).cloned())
    }

    async fn by_message_hash(&self, hash: &H256) -> Result<Option<Transaction>, Error> {
        Ok(self.table.lock().await.by_message_hash(hash).cloned())
    }

    async fn in_flight(&self, from: &Address) -> Result<Option<Transaction>, Error> {
        Ok(self.table.lock().await.in_flight(from).cloned())
    }

    async fn list_by_status(&self, status: TxStatus) -> Result<Vec<Transaction>, Error> {
        Ok(self.table.lock().await.list_by_status(status))
    }

    async fn transition<F>(
        &self,
        id: TxId,
        expected: TxStatus,
        next: TxStatus,
        f: F,
    ) -> Result<Transaction, Error>
    where
        F: FnOnce(&mut Transaction) + Send,
    {
        self.update(|t| t.transition(id, expected, next, f)).await
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use ethers_core::types::{Bytes, U256};

    use super::*;

    fn tx(from: u8) -> Transaction {
        Transaction {
            id: 0,
            from: Address::repeat_byte(from),
            to: Address::repeat_byte(0xbb),
            value: U256::from(1_000),
            nonce: U256::from(7),
            gas_limit: U256::from(21_000),
            gas_price: U256::from(20_000_000_000u64),
            chain_id: 1,
            unsigned_tx: Bytes::from(vec![0xc0]),
            message_hash: H256::repeat_byte(from),
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
        }
    }

    #[tokio::test]
    async fn one_in_flight_per_sender() {
        let s = MemoryStore::new();

        let a = s.insert(tx(0xaa)).await.unwrap();
        assert_eq!(a.id, 1);

        let e = s.insert(tx(0xaa)).await.unwrap_err();
        assert!(matches!(e, Error::InProgress { id: 1, .. }), "{e}");

        // Other senders are independent
        let b = s.insert(tx(0xcc)).await.unwrap();
        assert_eq!(b.id, 2);

        // Terminal transactions release the sender
        s.transition(a.id, TxStatus::Pending, TxStatus::Failed, |t| {
            t.last_error = Some("rejected".to_string())
        })
        .await
        .unwrap();

        let c = s.insert(tx(0xaa)).await.unwrap();
        assert_eq!(c.id, 3);
    }

    #[tokio::test]
    async fn compare_and_set() {
        let s = MemoryStore::new();
        let a = s.insert(tx(0xaa)).await.unwrap();

        let e = s
            .transition(a.id, TxStatus::Signed, TxStatus::Submitted, |t| {
                t.retry_count = 9
            })
            .await
            .unwrap_err();

        assert!(
            matches!(
                e,
                Error::StatusMismatch {
                    actual: TxStatus::Pending,
                    ..
                }
            ),
            "{e}"
        );

        // Rejected updates are not applied
        let t = s.get(a.id).await.unwrap().unwrap();
        assert_eq!(t.retry_count, 0);
        assert_eq!(t.status, TxStatus::Pending);

        let e = s
            .transition(99, TxStatus::Pending, TxStatus::Signed, |_| ())
            .await
            .unwrap_err();
        assert!(matches!(e, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn lookups() {
        let s = MemoryStore::new();
        s.insert(tx(0xaa)).await.unwrap();
        let b = s.insert(tx(0xcc)).await.unwrap();

        s.transition(b.id, TxStatus::Pending, TxStatus::Signed, |_| ())
            .await
            .unwrap();

        let t = s.by_message_hash(&H256::repeat_byte(0xcc)).await.unwrap();
        assert_eq!(t.map(|t| t.id), Some(b.id));

        assert!(s
            .by_message_hash(&H256::repeat_byte(0x01))
            .await
            .unwrap()
            .is_none());

        let signed = s.list_by_status(TxStatus::Signed).await.unwrap();
        assert_eq!(signed.len(), 1);
        assert_eq!(signed[0].id, b.id);

        let f = s.in_flight(&Address::repeat_byte(0xaa)).await.unwrap();
        assert_eq!(f.map(|t| t.status), Some(TxStatus::Pending));
    }

    #[tokio::test]
    async fn repeated_message_hash() {
        let s = MemoryStore::new();

        // Failed and re-prepared transfers share a hash
        let a = s.insert(tx(0xaa)).await.unwrap();
        s.transition(a.id, TxStatus::Pending, TxStatus::Failed, |_| ())
            .await
            .unwrap();
        let b = s.insert(tx(0xaa)).await.unwrap();

        let t = s.by_message_hash(&H256::repeat_byte(0xaa)).await.unwrap();
        assert_eq!(t.map(|t| t.id), Some(b.id));

        // With every row terminal the newest is returned
        s.transition(b.id, TxStatus::Pending, TxStatus::Failed, |_| ())
            .await
            .unwrap();
        let c = s.insert(tx(0xaa)).await.unwrap();
        s.transition(c.id, TxStatus::Pending, TxStatus::Failed, |_| ())
            .await
            .unwrap();

        let t = s.by_message_hash(&H256::repeat_byte(0xaa)).await.unwrap();
        assert_eq!(t.map(|t| t.id), Some(c.id));
    }

    #[tokio::test]
    async fn json_reload() {
        let d = tempfile::tempdir().unwrap();
        let p = d.path().join("transactions.json");

        {
            let s = JsonFileStore::open(&p).await.unwrap();
            let a = s.insert(tx(0xaa)).await.unwrap();
            s.insert(tx(0xcc)).await.unwrap();

            s.transition(a.id, TxStatus::Pending, TxStatus::Signed, |t| {
                t.signed_tx = Some(Bytes::from(vec![0x01, 0x02]))
            })
            .await
            .unwrap();
        }

        let s = JsonFileStore::open(&p).await.unwrap();

        let a = s.get(1).await.unwrap().unwrap();
        assert_eq!(a.status, TxStatus::Signed);
        assert_eq!(a.signed_tx, Some(Bytes::from(vec![0x01, 0x02])));
        assert_eq!(a.value, U256::from(1_000));

        // IDs continue after reload
        s.transition(2, TxStatus::Pending, TxStatus::Failed, |_| ())
            .await
            .unwrap();
        let c = s.insert(tx(0xcc)).await.unwrap();
        assert_eq!(c.id, 3);

        // The in-flight check covers reloaded rows
        assert!(s.insert(tx(0xaa)).await.is_err());
    }

    #[tokio::test]
    async fn json_corrupted() {
        let d = tempfile::tempdir().unwrap();
        let p = d.path().join("transactions.json");
        std::fs::write(&p, b"{\"next_id\": 3, \"transac").unwrap();

        let e = JsonFileStore::open(&p).await.err().unwrap();
        assert_eq!(e.kind(), cardvault::ErrorKind::Fatal);
    }
}
