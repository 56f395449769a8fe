// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Smart card secrets vault API library (and CLI)
//!
//! This provides a [CardHandle] driver for the vault applet over any card
//! [Transport], a [ShareVault] binding encrypted MPC share blobs to card-held
//! wrapping keys, and [Custodian] account flows combining these with the
//! external MPC binary.

/// Re-export transports for consumer use
pub mod transport;
pub use transport::{GenericTransport, Transport, TransportError};

/// Re-export `cardvault-apdu` for consumers
pub use cardvault_apdu::{self as apdu};

mod handle;
pub use handle::{CardHandle, SlotInfo, DEFAULT_REQUEST_TIMEOUT};

mod error;
pub use error::{Error, ErrorKind};

pub mod auth;
pub mod config;
pub mod custody;
pub mod mpc;
pub mod normalize;
pub mod vault;

pub use auth::{Authorizer, LocalAuthorizer};
pub use custody::{Account, BlobStore, Custodian};
pub use mpc::MpcRunner;
pub use vault::ShareVault;

/// Generic card handle (abstract over transport types)
pub type GenericHandle = CardHandle<GenericTransport>;

impl GenericHandle {
    /// Create a new generic card handle
    pub fn new(t: impl Into<GenericTransport>) -> Self {
        Self::from(t.into())
    }
}
