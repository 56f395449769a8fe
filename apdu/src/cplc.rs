// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Card Production Life Cycle (CPLC) data APDUs
//!
//! CPLC is fetched via `GET DATA` (`80 CA 9F 7F 00`) and returned as
//! a `9F 7F` tagged object.

use encdec::{Decode, DecodeOwned, Encode};

use crate::{helpers::slice, ApduError, ApduStatic, Instruction, VAULT_APDU_CLA};

/// CPLC data object tag
pub const CPLC_TAG: [u8; 2] = [0x9F, 0x7F];

/// Fetch CPLC data request APDU
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct CplcReq;

impl ApduStatic for CplcReq {
    const CLA: u8 = VAULT_APDU_CLA;
    const INS: u8 = Instruction::GetData as u8;
    const P1: u8 = CPLC_TAG[0];
    const P2: u8 = CPLC_TAG[1];
    const RESP_LE: bool = true;
}

impl Encode for CplcReq {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(0)
    }

    fn encode(&self, _buff: &mut [u8]) -> Result<usize, Self::Error> {
        Ok(0)
    }
}

impl DecodeOwned for CplcReq {
    type Output = Self;

    type Error = ApduError;

    fn decode_owned(_buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        Ok((Self, 0))
    }
}

/// CPLC response APDU
///
/// ## Encoding
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     0x9F      |     0x7F      |      LEN      |    DATA...    /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct CplcResp<'a> {
    /// CPLC contents (excluding tag and length)
    pub data: &'a [u8],
}

impl<'a> Encode for CplcResp<'a> {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(3 + self.data.len())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        if self.data.len() > u8::MAX as usize || buff.len() < 3 {
            return Err(ApduError::InvalidLength);
        }

        buff[..2].copy_from_slice(&CPLC_TAG);
        buff[2] = self.data.len() as u8;

        let n = slice::enc(self.data, &mut buff[3..])?;

        Ok(3 + n)
    }
}

impl<'a> Decode<'a> for CplcResp<'a> {
    type Output = Self;
    type Error = ApduError;

    fn decode(buff: &'a [u8]) -> Result<(Self::Output, usize), Self::Error> {
        if buff.len() < 3 {
            return Err(ApduError::InvalidLength);
        }

        // Check tag
        if buff[..2] != CPLC_TAG {
            return Err(ApduError::InvalidEncoding);
        }

        // Check declared length matches payload
        let len = buff[2] as usize;
        if buff.len() != 3 + len {
            return Err(ApduError::InvalidLength);
        }

        Ok((Self { data: &buff[3..] }, buff.len()))
    }
}
