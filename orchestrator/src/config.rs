// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Orchestrator configuration, loaded from TOML
//!
//! Unknown keys are ignored so vault and orchestrator options may share a file.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::Error;

/// Transaction orchestrator configuration
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// EIP-155 chain ID
    pub chain_id: u64,

    /// Node JSON-RPC endpoint
    pub node_rpc_url: String,

    /// Receipt polling interval for transaction monitors
    #[serde(default = "default_confirm_tick")]
    pub confirm_tick_seconds: u64,

    /// Receipt polls before a monitor hands over to the sweeper
    #[serde(default = "default_confirm_attempts")]
    pub confirm_max_attempts: u32,

    /// Node RPC request timeout
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_seconds: u64,

    /// Gas limit for value transfers
    #[serde(default = "default_gas_limit")]
    pub default_gas_limit: u64,

    /// Interval between sweeps of submitted transactions
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,

    /// Transaction table snapshot, in-memory only when unset
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

fn default_confirm_tick() -> u64 {
    60
}

fn default_confirm_attempts() -> u32 {
    12
}

fn default_rpc_timeout() -> u64 {
    10
}

fn default_gas_limit() -> u64 {
    21_000
}

fn default_sweep_interval() -> u64 {
    300
}

impl OrchestratorConfig {
    /// Create a configuration with default timings
    pub fn new(chain_id: u64, node_rpc_url: &str) -> Self {
        Self {
            chain_id,
            node_rpc_url: node_rpc_url.to_string(),
            confirm_tick_seconds: default_confirm_tick(),
            confirm_max_attempts: default_confirm_attempts(),
            rpc_timeout_seconds: default_rpc_timeout(),
            default_gas_limit: default_gas_limit(),
            sweep_interval_seconds: default_sweep_interval(),
            store_path: None,
        }
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(s: &str) -> Result<Self, Error> {
        let c: Self = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        c.validate()?;
        Ok(c)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Error> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&s)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.node_rpc_url.is_empty() {
            return Err(Error::Config("node_rpc_url must be set".to_string()));
        }
        if self.confirm_tick_seconds == 0 || self.sweep_interval_seconds == 0 {
            return Err(Error::Config("intervals must be non-zero".to_string()));
        }
        if self.default_gas_limit < 21_000 {
            return Err(Error::Config(format!(
                "gas limit {} below transfer cost",
                self.default_gas_limit
            )));
        }
        Ok(())
    }

    pub fn confirm_tick(&self) -> Duration {
        Duration::from_secs(self.confirm_tick_seconds)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let c = OrchestratorConfig::from_toml(
            r#"
chain_id = 11155111
node_rpc_url = "http://localhost:8545"
mpc_binary_path = "gg20"
"#,
        )
        .unwrap();

        assert_eq!(
            c,
            OrchestratorConfig::new(11155111, "http://localhost:8545")
        );
        assert_eq!(c.confirm_tick(), Duration::from_secs(60));
        assert_eq!(c.confirm_max_attempts, 12);
        assert_eq!(c.rpc_timeout(), Duration::from_secs(10));
        assert_eq!(c.default_gas_limit, 21_000);
        assert_eq!(c.sweep_interval(), Duration::from_secs(300));
    }

    #[test]
    fn invalid() {
        let tests = [
            // Missing chain id
            r#"node_rpc_url = "http://localhost:8545""#,
            // Missing node
            "chain_id = 1",
            "chain_id = 1\nnode_rpc_url = \"\"",
            "chain_id = 1\nnode_rpc_url = \"http://n\"\nconfirm_tick_seconds = 0",
            "chain_id = 1\nnode_rpc_url = \"http://n\"\ndefault_gas_limit = 100",
        ];

        for t in tests {
            let e = OrchestratorConfig::from_toml(t).unwrap_err();
            assert_eq!(e.kind(), cardvault::ErrorKind::InvalidInput, "{t}");
        }
    }
}
