// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Signature authorised READ and DELETE APDUs

use encdec::{Decode, DecodeOwned, Encode};
use zeroize::Zeroize;

use crate::{
    helpers::{arr, slice},
    record::{RecordKey, AUTH_MSG_LEN, MESSAGE_LEN},
    ApduError, ApduStatic, Instruction, VAULT_APDU_CLA,
};

/// Minimum DER encoded ECDSA signature length accepted by the applet
pub const SIG_DER_MIN_LEN: usize = 8;

/// Maximum DER encoded ECDSA P-256 signature length
pub const SIG_DER_MAX_LEN: usize = 72;

/// Helper macro for request APDUs carrying a [RecordKey] followed by
/// a DER authorisation signature.
///
/// ## Encoding
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                      USER_HASH (32 bytes)                     /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                       ADDRESS (20 bytes)                      /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                  SIGNATURE_DER (8..72 bytes)                  /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The signature length is implied by the APDU data length.
macro_rules! signed_req {
    ($(#[$meta:meta])* $name:ident, $ins:expr) => {
        $(#[$meta])*
        #[derive(Copy, Clone, PartialEq, Debug)]
        pub struct $name<'a> {
            /// Record key
            pub key: RecordKey,
            /// DER encoded ECDSA P-256 signature over [RecordKey::auth_message]
            pub signature: &'a [u8],
        }

        impl<'a> $name<'a> {
            pub fn new(key: RecordKey, signature: &'a [u8]) -> Self {
                Self { key, signature }
            }
        }

        impl<'a> ApduStatic for $name<'a> {
            const CLA: u8 = VAULT_APDU_CLA;
            const INS: u8 = $ins as u8;
        }

        impl<'a> Encode for $name<'a> {
            type Error = ApduError;

            fn encode_len(&self) -> Result<usize, Self::Error> {
                Ok(AUTH_MSG_LEN + self.signature.len())
            }

            fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
                let mut index = 0;

                index += self.key.encode(&mut buff[index..])?;
                index += slice::enc(self.signature, &mut buff[index..])?;

                Ok(index)
            }
        }

        impl<'a> Decode<'a> for $name<'a> {
            type Output = Self;
            type Error = ApduError;

            fn decode(buff: &'a [u8]) -> Result<(Self::Output, usize), Self::Error> {
                // Check the signature length implied by the payload
                if buff.len() < AUTH_MSG_LEN + SIG_DER_MIN_LEN
                    || buff.len() > AUTH_MSG_LEN + SIG_DER_MAX_LEN
                {
                    return Err(ApduError::InvalidLength);
                }

                let (key, index) = RecordKey::decode_owned(buff)?;
                let signature = &buff[index..];

                Ok((Self { key, signature }, buff.len()))
            }
        }
    };
}

signed_req!(
    /// Read record request APDU, returns a [MessageResp] on success
    ReadReq,
    Instruction::Read
);

signed_req!(
    /// Delete record request APDU, returns a [SlotResp][crate::record::SlotResp] on success
    DeleteReq,
    Instruction::Delete
);

/// Read response APDU containing the stored message
///
/// ## Encoding
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                       MESSAGE (32 bytes)                      /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct MessageResp {
    pub message: [u8; MESSAGE_LEN],
}

impl Encode for MessageResp {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(MESSAGE_LEN)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        arr::enc(&self.message, buff)
    }
}

impl DecodeOwned for MessageResp {
    type Output = Self;

    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        if buff.len() != MESSAGE_LEN {
            return Err(ApduError::InvalidLength);
        }

        let (message, n) = arr::dec::<MESSAGE_LEN>(buff)?;

        Ok((Self { message }, n))
    }
}

impl Zeroize for MessageResp {
    fn zeroize(&mut self) {
        self.message.zeroize();
    }
}
