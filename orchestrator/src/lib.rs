// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transaction orchestrator for MPC custodied Ethereum accounts
//!
//! The [Orchestrator] drives value transfers through
//! `Pending -> Signed -> Submitted -> Confirmed | Failed`, building EIP-155
//! signing payloads, checking that supplied signatures recover the sender,
//! broadcasting via a [Node] and settling receipts in background tasks.
//! Transactions are held in a [TxStore], which allows at most one
//! in-flight transaction per sender in place of local nonce management.

mod error;
pub use error::Error;

pub mod config;
pub mod eip155;
pub mod manager;
pub mod node;
pub mod ops;
pub mod store;
pub mod types;

pub use config::OrchestratorConfig;
pub use manager::Orchestrator;
pub use node::{HttpNode, Node, RpcError};
pub use store::{JsonFileStore, MemoryStore, TxStore};
pub use types::{Receipt, Transaction, TxId, TxStatus};
