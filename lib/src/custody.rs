// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Account custody flows
//!
//! A [Custodian] binds MPC key shares to `(user, address)` accounts, with the
//! encrypted share blob held in a [BlobStore] and the wrapping key on the card.

use std::{
    io::{ErrorKind as IoErrorKind, Write},
    path::{Path, PathBuf},
};

use log::{debug, error, info, warn};
use tempfile::NamedTempFile;

use cardvault_apdu::record::RecordKey;

use crate::{
    auth::Authorizer,
    handle::CardHandle,
    mpc::{checksum_address, share_address, MpcRunner, ETH_SIG_LEN},
    normalize::{hash_user, record_key},
    transport::Transport,
    vault::ShareVault,
    Error,
};

/// Blob file extension
const BLOB_EXT: &str = "blob";

/// File backed store for encrypted share blobs, one file per `(user, address)`
#[derive(Clone, Debug)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    /// Open (creating if required) a blob store in `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        Ok(Self { dir })
    }

    /// Fetch the store directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Compute the blob path for a record key
    pub fn path(&self, key: &RecordKey) -> PathBuf {
        self.dir.join(format!(
            "{}_{}.{}",
            hex::encode(key.user_hash),
            hex::encode(key.address),
            BLOB_EXT
        ))
    }

    /// Check whether a blob exists for a record key
    pub async fn contains(&self, key: &RecordKey) -> bool {
        tokio::fs::metadata(self.path(key)).await.is_ok()
    }

    /// Persist a blob, failing with [Error::Conflict] where one already exists
    pub async fn put(&self, key: &RecordKey, blob: &[u8]) -> Result<(), Error> {
        let (dir, path, blob) = (self.dir.clone(), self.path(key), blob.to_vec());

        tokio::task::spawn_blocking(move || -> Result<(), Error> {
            let mut f = NamedTempFile::new_in(&dir)?;
            f.write_all(&blob)?;
            f.as_file().sync_all()?;

            match f.persist_noclobber(&path) {
                Ok(_) => Ok(()),
                Err(e) if e.error.kind() == IoErrorKind::AlreadyExists => Err(Error::Conflict(
                    format!("blob exists: {}", path.display()),
                )),
                Err(e) => Err(Error::Io(e.error)),
            }
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::new(IoErrorKind::Other, e)))?
    }

    /// Load the blob for a record key
    pub async fn get(&self, key: &RecordKey) -> Result<Vec<u8>, Error> {
        match tokio::fs::read(self.path(key)).await {
            Ok(b) => Ok(b),
            Err(e) if e.kind() == IoErrorKind::NotFound => Err(Error::NotFound(format!(
                "no blob for address 0x{}",
                hex::encode(key.address)
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the blob for a record key
    pub async fn remove(&self, key: &RecordKey) -> Result<(), Error> {
        match tokio::fs::remove_file(self.path(key)).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Err(Error::NotFound(format!(
                "no blob for address 0x{}",
                hex::encode(key.address)
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

/// Custodied account
#[derive(Clone, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
pub struct Account {
    /// Account owner
    pub user: String,
    /// EIP-55 checksummed account address
    pub address: String,
}

/// Custodian for MPC share backed accounts
pub struct Custodian<T: Transport, A: Authorizer> {
    vault: ShareVault<T>,
    mpc: MpcRunner,
    blobs: BlobStore,
    auth: A,
}

impl<T: Transport + 'static, A: Authorizer> Custodian<T, A> {
    /// Create a new custodian
    pub fn new(vault: ShareVault<T>, mpc: MpcRunner, blobs: BlobStore, auth: A) -> Self {
        Self {
            vault,
            mpc,
            blobs,
            auth,
        }
    }

    /// Fetch the underlying share vault
    pub fn vault(&self) -> &ShareVault<T> {
        &self.vault
    }

    /// Fetch the blob store
    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Create an account for `user` via MPC keygen, wrapping the resulting share
    pub async fn create_account(
        &self,
        user: &str,
        threshold: u16,
        parties: u16,
        index: u16,
    ) -> Result<Account, Error> {
        if user.is_empty() {
            return Err(Error::InvalidInput("empty user name".to_string()));
        }

        // Generate share and derive address
        let share = self.mpc.keygen(threshold, parties, index).await?;
        let address = share_address(&share.read().await?)?;
        let key = RecordKey::new(hash_user(user), address);

        let account = Account {
            user: user.to_string(),
            address: checksum_address(&address),
        };

        info!("Generated share for account {}", account.address);

        if self.blobs.contains(&key).await {
            return Err(Error::Conflict(format!(
                "account exists: {}",
                account.address
            )));
        }

        // Rollback signature is prepared up-front so the guard can always
        // remove the card record
        let signature = self.auth.sign_auth(&key.auth_message()).await?;
        let guard = RollbackGuard::new(self.vault.card().clone(), key, signature);

        // Card STORE is the final step of wrapping
        let blob = self.vault.wrap_key(&key, share.path()).await?;

        // Persist blob before declaring success
        self.blobs.put(&key, &blob).await?;

        guard.disarm();

        info!("Created account {} for user", account.address);

        Ok(account)
    }

    /// Sign a 32-byte message hash with the share for `(user, address)`
    pub async fn sign_message(
        &self,
        user: &str,
        address: &str,
        parties: &[u16],
        message_hash: &[u8; 32],
    ) -> Result<[u8; ETH_SIG_LEN], Error> {
        let key = record_key(user, address)?;

        let blob = self.blobs.get(&key).await?;
        let signature = self.auth.sign_auth(&key.auth_message()).await?;

        let share = self.vault.unwrap_key(&key, &blob, &signature).await?;

        let r = self.mpc.sign(parties, message_hash, &share).await;

        if let Err(e) = share.close() {
            warn!("Failed to remove unwrapped share: {}", e);
        }

        let sig = r?;

        debug!("Signed message for address 0x{}", hex::encode(key.address));

        Ok(sig)
    }

    /// Delete the account for `(user, address)`, destroying both the card
    /// record and the share blob
    pub async fn delete_account(&self, user: &str, address: &str) -> Result<(), Error> {
        let key = record_key(user, address)?;

        let signature = self.auth.sign_auth(&key.auth_message()).await?;

        self.vault.forget_key(&key, &signature).await?;
        self.blobs.remove(&key).await?;

        info!("Deleted account 0x{}", hex::encode(key.address));

        Ok(())
    }
}

/// Issues a best-effort card DELETE on drop unless disarmed, covering
/// failures (or cancellation) between card STORE and blob persistence
struct RollbackGuard<T: Transport + 'static> {
    card: CardHandle<T>,
    key: RecordKey,
    signature: Vec<u8>,
    armed: bool,
}

impl<T: Transport + 'static> RollbackGuard<T> {
    fn new(card: CardHandle<T>, key: RecordKey, signature: Vec<u8>) -> Self {
        Self {
            card,
            key,
            signature,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<T: Transport + 'static> Drop for RollbackGuard<T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let rt = match tokio::runtime::Handle::try_current() {
            Ok(rt) => rt,
            Err(_) => {
                error!(
                    "No runtime for rollback, card record for 0x{} may remain",
                    hex::encode(self.key.address)
                );
                return;
            }
        };

        let (card, key, signature) = (
            self.card.clone(),
            self.key,
            std::mem::take(&mut self.signature),
        );

        rt.spawn(async move {
            match card.delete_key(&key, &signature).await {
                Ok(r) => warn!(
                    "Rolled back card record for 0x{} (slot: {}, total: {})",
                    hex::encode(key.address),
                    r.slot,
                    r.total
                ),
                Err(Error::Status(cardvault_apdu::status::StatusWord::RecordNotFound)) => {
                    debug!("No card record to roll back")
                }
                Err(e) => error!(
                    "Rollback failed, card record for 0x{} may remain: {}",
                    hex::encode(key.address),
                    e
                ),
            }
        });
    }
}
