// Copyright (c) 2022-2023 The MobileCoin Foundation

use core::fmt::Debug;

use encdec::Encode;

use cardvault_apdu::{
    record::{SlotResp, MESSAGE_LEN},
    signed::MessageResp,
    ApduError,
};

/// [`Engine`][super::Engine] outputs (in response to events), typically encoded to response [APDUs][crate::apdu]
#[derive(Clone, PartialEq)]
pub enum Output {
    /// Slot index and number of records in use, from store and delete
    Slot { slot: u8, total: u8 },

    /// Stored message, from read
    Message { message: [u8; MESSAGE_LEN] },
}

impl Output {
    /// Encode an [`Output`] object to a response [APDU][crate::apdu]
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        match self {
            Output::Slot { slot, total } => SlotResp::new(*slot, *total).encode(buff),
            Output::Message { message } => MessageResp { message: *message }.encode(buff),
        }
    }
}

/// Messages are secret, debug output omits them
impl Debug for Output {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Output::Slot { slot, total } => f
                .debug_struct("Slot")
                .field("slot", slot)
                .field("total", total)
                .finish(),
            Output::Message { .. } => f.debug_struct("Message").finish_non_exhaustive(),
        }
    }
}
