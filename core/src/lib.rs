// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Secrets vault applet core
//!
//! This provides a common [Engine][engine] implementing the vault applet, a fixed
//! capacity table of `(user_hash, address) -> message` records, for execution
//! on smart cards or in simulation.
//!
//! Interactions with the [Engine][engine] are performed via [Event][engine::Event]s and
//! [Output][engine::Output]s, see [cardvault_apdu] for APDU objects and wire encodings,
//! or via [Engine::process_apdu][engine::Engine::process_apdu] for complete command /
//! response APDU handling.
//!
//! ## Operations
//!
//! ### Storing a record
//!
//! A [`StoreReq`][cardvault_apdu::record::StoreReq] writes the message for a key,
//! overwriting the message in place where the key already exists, otherwise
//! claiming the first free slot. The response is a
//! [`SlotResp`][cardvault_apdu::record::SlotResp] containing the slot index and
//! the number of records in use. Stores are not authorised, the store path
//! only ever adds secrets.
//!
//! ### Reading / deleting a record
//!
//! [`ReadReq`][cardvault_apdu::signed::ReadReq] and
//! [`DeleteReq`][cardvault_apdu::signed::DeleteReq] carry a DER ECDSA P-256 / SHA-256
//! signature over `user_hash || address`, verified against the applet
//! [Authority][engine::Authority] before the table is consulted.
//!
//! Reads return a [`MessageResp`][cardvault_apdu::signed::MessageResp], deletes clear
//! the in-use flag (leaving record bytes in place until the slot is reused) and
//! return a [`SlotResp`][cardvault_apdu::record::SlotResp].
//!

#![cfg_attr(not(feature = "std"), no_std)]

pub use cardvault_apdu::{self as apdu};

pub mod engine;
