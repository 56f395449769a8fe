// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Card read / delete authorisation
//!
//! Reads and deletes carry an ECDSA P-256 / SHA-256 signature over
//! `user_hash || address`, checked by the applet against its compiled-in key.

use std::path::Path;

use async_trait::async_trait;
use log::debug;
use p256::ecdsa::{signature::RandomizedSigner, Signature, SigningKey, VerifyingKey};
use rand_core::OsRng;
use zeroize::Zeroizing;

use cardvault_apdu::record::AUTH_MSG_LEN;

use crate::{
    normalize::{AUTH_SIG_MAX_LEN, AUTH_SIG_MIN_LEN},
    Error,
};

/// Signing attempts before giving up on a DER encoding in the accepted range
const MAX_SIGN_ATTEMPTS: usize = 32;

/// Authorizer supplies signatures authorising card reads and deletes
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Sign the 52-byte `user_hash || address` message, returning a DER signature
    async fn sign_auth(&self, message: &[u8; AUTH_MSG_LEN]) -> Result<Vec<u8>, Error>;
}

/// [Authorizer] using a locally held P-256 key
#[derive(Clone)]
pub struct LocalAuthorizer {
    key: SigningKey,
}

impl std::fmt::Debug for LocalAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAuthorizer").finish_non_exhaustive()
    }
}

impl LocalAuthorizer {
    /// Create an authorizer from a signing key
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Create an authorizer with a freshly generated key
    pub fn random() -> Self {
        Self::new(SigningKey::random(&mut OsRng))
    }

    /// Parse a hex encoded 32-byte private scalar
    pub fn from_hex(s: &str) -> Result<Self, Error> {
        let b = Zeroizing::new(
            hex::decode(s.trim()).map_err(|e| Error::InvalidInput(format!("auth key: {e}")))?,
        );

        let key = SigningKey::from_slice(&b)
            .map_err(|_| Error::InvalidInput("auth key: invalid P-256 scalar".to_string()))?;

        Ok(Self::new(key))
    }

    /// Load a hex encoded private scalar from a file
    pub fn load(path: &Path) -> Result<Self, Error> {
        let s = Zeroizing::new(std::fs::read_to_string(path)?);
        Self::from_hex(&s)
    }

    /// Fetch the public key, as compiled into the applet
    pub fn verifying_key(&self) -> VerifyingKey {
        *self.key.verifying_key()
    }

    /// Sign an authorisation message, retrying until the DER encoding
    /// falls within the range accepted by the driver
    pub fn sign(&self, message: &[u8; AUTH_MSG_LEN]) -> Result<Vec<u8>, Error> {
        for _ in 0..MAX_SIGN_ATTEMPTS {
            let sig: Signature = self
                .key
                .try_sign_with_rng(&mut OsRng, message)
                .map_err(|e| Error::Signer(e.to_string()))?;

            let der = sig.to_der();
            let n = der.as_bytes().len();

            if (AUTH_SIG_MIN_LEN..=AUTH_SIG_MAX_LEN).contains(&n) {
                return Ok(der.as_bytes().to_vec());
            }

            debug!("Discarding short DER signature ({} bytes)", n);
        }

        Err(Error::Signer("no signature in accepted length range".to_string()))
    }
}

#[async_trait]
impl Authorizer for LocalAuthorizer {
    async fn sign_auth(&self, message: &[u8; AUTH_MSG_LEN]) -> Result<Vec<u8>, Error> {
        self.sign(message)
    }
}

#[async_trait]
impl<A: Authorizer> Authorizer for std::sync::Arc<A> {
    async fn sign_auth(&self, message: &[u8; AUTH_MSG_LEN]) -> Result<Vec<u8>, Error> {
        self.as_ref().sign_auth(message).await
    }
}
