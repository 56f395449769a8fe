// Copyright (c) 2022-2023 The MobileCoin Foundation

use cardvault_apdu::record::AUTH_MSG_LEN;
use p256::ecdsa::{signature::Verifier, Signature, VerifyingKey};

/// Compiled-in authorisation public key (uncompressed SEC1, P-256)
pub const DEFAULT_AUTH_KEY: [u8; 65] = [
    0x04, 0x79, 0x7C, 0xEF, 0x50, 0x1E, 0x84, 0xF2, 0xD3, 0x15, 0xBE, 0xDB, 0xDE, 0xF0, 0xD3, 0x0B,
    0xCF, 0x3A, 0x16, 0x30, 0xA3, 0x79, 0x81, 0x51, 0xD2, 0xBC, 0xF7, 0xA3, 0x21, 0x3A, 0xD4, 0x22,
    0x17, 0x64, 0x45, 0x01, 0x90, 0x5F, 0x0C, 0x58, 0xC9, 0x53, 0x4E, 0x3E, 0xAE, 0x69, 0x63, 0x43,
    0x3A, 0xBE, 0xEE, 0x3D, 0x25, 0xB5, 0x87, 0xCD, 0xC1, 0x39, 0x9D, 0xD0, 0x19, 0x86, 0xBB, 0x1D,
    0x12,
];

/// [`Authority`] trait verifies read / delete authorisation for [`Engine`][super::Engine] instances
pub trait Authority {
    /// Verify a DER encoded signature over the 52-byte `user_hash || address` message
    fn verify(&self, message: &[u8; AUTH_MSG_LEN], signature: &[u8]) -> bool;
}

/// ECDSA P-256 / SHA-256 verification
impl Authority for VerifyingKey {
    fn verify(&self, message: &[u8; AUTH_MSG_LEN], signature: &[u8]) -> bool {
        let sig = match Signature::from_der(signature) {
            Ok(v) => v,
            Err(_) => return false,
        };

        Verifier::verify(self, message, &sig).is_ok()
    }
}

impl<T: Authority> Authority for &T {
    fn verify(&self, message: &[u8; AUTH_MSG_LEN], signature: &[u8]) -> bool {
        T::verify(self, message, signature)
    }
}
