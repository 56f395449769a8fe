// Copyright (c) 2022-2023 The MobileCoin Foundation

//! ISO 7816-4 SELECT (by AID) APDU

use encdec::{Decode, Encode};

use crate::{helpers::slice, ApduError, ApduStatic, Instruction};

/// Vault applet application identifier
pub const VAULT_AID: [u8; 8] = [0xA0, 0x00, 0x00, 0x00, 0x62, 0xCF, 0x01, 0x01];

/// ISO 7816 inter-industry class
pub const ISO_CLA: u8 = 0x00;

/// SELECT by DF name (AID)
pub const SELECT_P1_BY_NAME: u8 = 0x04;

/// Application SELECT request, `00 A4 04 00 Lc AID`
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct SelectReq<'a> {
    pub aid: &'a [u8],
}

impl SelectReq<'static> {
    /// Select the vault applet
    pub fn vault() -> Self {
        Self { aid: &VAULT_AID }
    }
}

impl<'a> ApduStatic for SelectReq<'a> {
    const CLA: u8 = ISO_CLA;
    const INS: u8 = Instruction::Select as u8;
    const P1: u8 = SELECT_P1_BY_NAME;
}

impl<'a> Encode for SelectReq<'a> {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(self.aid.len())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        slice::enc(self.aid, buff)
    }
}

impl<'a> Decode<'a> for SelectReq<'a> {
    type Output = Self;
    type Error = ApduError;

    fn decode(buff: &'a [u8]) -> Result<(Self::Output, usize), Self::Error> {
        // ISO 7816-5 AIDs are 5 to 16 bytes
        if buff.len() < 5 || buff.len() > 16 {
            return Err(ApduError::InvalidLength);
        }

        Ok((Self { aid: buff }, buff.len()))
    }
}
