// Copyright (c) 2022-2023 The MobileCoin Foundation

use core::fmt::Debug;

use encdec::Decode;

use cardvault_apdu::{
    prelude::*,
    record::{RecordKey, MESSAGE_LEN},
};

/// [`Engine`][super::Engine] input events, typically decoded from request [APDUs][crate::apdu]
#[derive(Clone, PartialEq)]
pub enum Event<'a> {
    /// Store (or overwrite) a record
    Store {
        key: RecordKey,
        message: [u8; MESSAGE_LEN],
    },

    /// Read a record
    Read {
        key: RecordKey,
        signature: &'a [u8],
    },

    /// Delete a record
    Delete {
        key: RecordKey,
        signature: &'a [u8],
    },
}

impl<'a> Event<'a> {
    /// Parse an incoming APDU body to an [Event] using the instruction code
    pub fn parse(ins: u8, buff: &'a [u8]) -> Result<Self, ApduError> {
        match ins {
            StoreReq::INS => decode_event::<StoreReq>(buff),
            ReadReq::INS => decode_event::<ReadReq>(buff),
            DeleteReq::INS => decode_event::<DeleteReq>(buff),
            _ => Err(ApduError::UnknownInstruction(ins)),
        }
    }
}

/// Messages are secret, debug output includes keys only
impl<'a> Debug for Event<'a> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Event::Store { key, .. } => f.debug_struct("Store").field("key", key).finish(),
            Event::Read { key, signature } => f
                .debug_struct("Read")
                .field("key", key)
                .field("signature_len", &signature.len())
                .finish(),
            Event::Delete { key, signature } => f
                .debug_struct("Delete")
                .field("key", key)
                .field("signature_len", &signature.len())
                .finish(),
        }
    }
}

/// Helper to decode APDUs to events
fn decode_event<'a, T>(buff: &'a [u8]) -> Result<Event<'a>, ApduError>
where
    T: Decode<'a, Output = T, Error = ApduError>,
    Event<'a>: From<T>,
{
    let (a, _) = T::decode(buff)?;
    Ok(Event::from(a))
}

impl<'a> From<StoreReq> for Event<'a> {
    fn from(a: StoreReq) -> Self {
        Event::Store {
            key: a.key,
            message: a.message,
        }
    }
}

impl<'a> From<ReadReq<'a>> for Event<'a> {
    fn from(a: ReadReq<'a>) -> Self {
        Event::Read {
            key: a.key,
            signature: a.signature,
        }
    }
}

impl<'a> From<DeleteReq<'a>> for Event<'a> {
    fn from(a: DeleteReq<'a>) -> Self {
        Event::Delete {
            key: a.key,
            signature: a.signature,
        }
    }
}
