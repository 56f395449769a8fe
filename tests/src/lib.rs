// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Tests for vault card implementations.
//!
//! Generic over [cardvault::Transport] for reuse against the in-process
//! engine, the TCP simulator and physical cards. Tests remove the records
//! they create, [card::capacity] additionally requires an empty card.

pub mod card;

pub mod vault;

/// User name used for test records
pub const TEST_USER: &str = "cardvault-test";

/// Build a distinct test address for index `i`
pub fn test_address(i: u8) -> String {
    format!("0x{}", hex::encode([i; 20]))
}
