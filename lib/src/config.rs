// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Vault configuration, loaded from TOML
//!
//! Unknown keys are ignored so vault and orchestrator options may share a file.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::Error;

/// Vault and custody configuration
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Reader name substring used to select a PC/SC reader
    #[serde(default)]
    pub card_reader_match: Option<String>,

    /// Card APDU timeout
    #[serde(default = "default_card_timeout")]
    pub card_timeout_seconds: u64,

    /// Path to the MPC binary
    pub mpc_binary_path: PathBuf,

    /// MPC binary timeout
    #[serde(default = "default_mpc_timeout")]
    pub mpc_timeout_seconds: u64,

    /// MPC manager address passed to the binary
    #[serde(default)]
    pub mpc_manager_address: Option<String>,

    /// Directory for encrypted share blobs
    #[serde(default = "default_blob_dir")]
    pub blob_dir: PathBuf,

    /// Hex encoded P-256 authorisation key
    #[serde(default)]
    pub auth_key_path: Option<PathBuf>,
}

fn default_card_timeout() -> u64 {
    5
}

fn default_mpc_timeout() -> u64 {
    300
}

fn default_blob_dir() -> PathBuf {
    PathBuf::from("blobs")
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            card_reader_match: None,
            card_timeout_seconds: default_card_timeout(),
            mpc_binary_path: PathBuf::from("mpc"),
            mpc_timeout_seconds: default_mpc_timeout(),
            mpc_manager_address: None,
            blob_dir: default_blob_dir(),
            auth_key_path: None,
        }
    }
}

impl VaultConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml(s: &str) -> Result<Self, Error> {
        toml::from_str(s).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Error> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&s)
    }

    /// Card APDU timeout
    pub fn card_timeout(&self) -> Duration {
        Duration::from_secs(self.card_timeout_seconds)
    }

    /// MPC binary timeout
    pub fn mpc_timeout(&self) -> Duration {
        Duration::from_secs(self.mpc_timeout_seconds)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let c = VaultConfig::from_toml(
            r#"
chain_id = 1
mpc_binary_path = "/usr/local/bin/gg20"
"#,
        )
        .unwrap();

        assert_eq!(c.card_timeout(), Duration::from_secs(5));
        assert_eq!(c.mpc_timeout(), Duration::from_secs(300));
        assert_eq!(c.card_reader_match, None);
        assert_eq!(c.blob_dir, PathBuf::from("blobs"));
    }

    #[test]
    fn overrides() {
        let c = VaultConfig::from_toml(
            r#"
card_reader_match = "ACR"
card_timeout_seconds = 2
mpc_binary_path = "gg20"
mpc_timeout_seconds = 30
blob_dir = "/var/lib/cardvault"
auth_key_path = "/etc/cardvault/auth.key"
"#,
        )
        .unwrap();

        assert_eq!(c.card_reader_match.as_deref(), Some("ACR"));
        assert_eq!(c.card_timeout(), Duration::from_secs(2));
        assert_eq!(c.mpc_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn missing_binary() {
        let e = VaultConfig::from_toml("card_timeout_seconds = 2").unwrap_err();
        assert_eq!(e.kind(), crate::ErrorKind::InvalidInput);
    }
}
