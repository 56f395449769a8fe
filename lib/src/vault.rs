// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Share vault, binding encrypted share blobs to card-held wrapping keys
//!
//! Blobs are gzip compressed then AES-256-GCM encrypted under a random
//! 32-byte wrapping key `K` held on the card, with the layout
//! `nonce(12) || ciphertext || tag(16)`. Recovering a share requires both
//! the blob and an authorised card READ of `K`.

use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use log::{debug, info, warn};
use rand_core::{OsRng, RngCore};
use tempfile::TempPath;
use zeroize::Zeroizing;

use cardvault_apdu::record::{RecordKey, MESSAGE_LEN};

use crate::{
    handle::{CardHandle, SlotInfo},
    normalize::record_key,
    transport::Transport,
    Error,
};

/// AES-GCM nonce length
pub const NONCE_LEN: usize = 12;

/// AES-GCM tag length
pub const TAG_LEN: usize = 16;

/// Wrapping key length
pub const WRAP_KEY_LEN: usize = MESSAGE_LEN;

/// Compress and encrypt `plaintext` under `key`
pub fn seal(plaintext: &[u8], key: &[u8; WRAP_KEY_LEN]) -> Result<Vec<u8>, Error> {
    // Compress share
    let mut e = GzEncoder::new(Vec::new(), Compression::best());
    e.write_all(plaintext)?;
    let compressed = Zeroizing::new(e.finish()?);

    debug!(
        "Compressed share {} -> {} bytes",
        plaintext.len(),
        compressed.len()
    );

    // Encrypt with a fresh nonce
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| Error::Corrupted("wrapping key"))?;
    let ct = cipher
        .encrypt(Nonce::from_slice(&nonce), compressed.as_slice())
        .map_err(|_| Error::Corrupted("encryption failed"))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ct.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ct);

    Ok(blob)
}

/// Decrypt and decompress a blob produced by [seal]
pub fn open(blob: &[u8], key: &[u8; WRAP_KEY_LEN]) -> Result<Zeroizing<Vec<u8>>, Error> {
    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(Error::Corrupted("blob too short"));
    }

    let (nonce, ct) = blob.split_at(NONCE_LEN);

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| Error::Corrupted("wrapping key"))?;
    let compressed = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(nonce), ct)
            .map_err(|_| Error::Corrupted("authentication failed"))?,
    );

    let mut plaintext = Zeroizing::new(Vec::new());
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut plaintext)
        .map_err(|_| Error::Corrupted("decompression failed"))?;

    Ok(plaintext)
}

/// Share vault over a [CardHandle]
pub struct ShareVault<T: Transport> {
    card: CardHandle<T>,
    temp_dir: Option<PathBuf>,
}

impl<T: Transport> ShareVault<T> {
    /// Create a new share vault using the provided card
    pub fn new(card: CardHandle<T>) -> Self {
        Self {
            card,
            temp_dir: None,
        }
    }

    /// Write unwrapped shares under `dir` rather than the system temporary directory
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Fetch the underlying card handle
    pub fn card(&self) -> &CardHandle<T> {
        &self.card
    }

    /// Wrap the share at `share_path` for `(user, address)`, returning the encrypted blob.
    ///
    /// The wrapping key is written to the card last, so any earlier failure
    /// leaves the card unchanged. The share file is removed on success.
    pub async fn wrap(&self, user: &str, address: &str, share_path: &Path) -> Result<Vec<u8>, Error> {
        let key = record_key(user, address)?;
        self.wrap_key(&key, share_path).await
    }

    /// Wrap a share for a normalised record key
    pub async fn wrap_key(&self, key: &RecordKey, share_path: &Path) -> Result<Vec<u8>, Error> {
        let share = Zeroizing::new(tokio::fs::read(share_path).await?);

        let mut k = Zeroizing::new([0u8; WRAP_KEY_LEN]);
        OsRng.fill_bytes(&mut k[..]);

        let blob = seal(&share, &k)?;

        let SlotInfo { slot, total } = self.card.store_key(key, &k[..]).await?;

        info!(
            "Wrapped share for address {} (slot: {}, total: {}, blob: {} bytes)",
            hex::encode(key.address),
            slot,
            total,
            blob.len()
        );

        if let Err(e) = tokio::fs::remove_file(share_path).await {
            warn!("Failed to remove share file {}: {}", share_path.display(), e);
        }

        Ok(blob)
    }

    /// Unwrap a blob for `(user, address)` to a temporary share file.
    ///
    /// The returned [TempPath] removes the file on drop, on error no file remains.
    pub async fn unwrap(
        &self,
        user: &str,
        address: &str,
        blob: &[u8],
        signature: &[u8],
    ) -> Result<TempPath, Error> {
        let key = record_key(user, address)?;
        self.unwrap_key(&key, blob, signature).await
    }

    /// Unwrap a blob for a normalised record key
    pub async fn unwrap_key(
        &self,
        key: &RecordKey,
        blob: &[u8],
        signature: &[u8],
    ) -> Result<TempPath, Error> {
        let k = self.card.read_key(key, signature).await?;

        let share = open(blob, &k)?;

        let temp_dir = self.temp_dir.clone();
        let path = tokio::task::spawn_blocking(move || -> Result<TempPath, Error> {
            let mut b = tempfile::Builder::new();
            b.prefix("share-").suffix(".json");

            let mut f = match &temp_dir {
                Some(d) => b.tempfile_in(d)?,
                None => b.tempfile()?,
            };

            f.write_all(&share)?;
            f.as_file().sync_all()?;

            Ok(f.into_temp_path())
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        debug!(
            "Unwrapped share for address {} to {}",
            hex::encode(key.address),
            path.display()
        );

        Ok(path)
    }

    /// Forget the wrapping key for `(user, address)`, the caller should also remove the blob
    pub async fn forget(&self, user: &str, address: &str, signature: &[u8]) -> Result<SlotInfo, Error> {
        let key = record_key(user, address)?;
        self.forget_key(&key, signature).await
    }

    /// Forget the wrapping key for a normalised record key
    pub async fn forget_key(&self, key: &RecordKey, signature: &[u8]) -> Result<SlotInfo, Error> {
        let r = self.card.delete_key(key, signature).await?;

        info!(
            "Forgot wrapping key for address {} (slot: {}, total: {})",
            hex::encode(key.address),
            r.slot,
            r.total
        );

        Ok(r)
    }
}
