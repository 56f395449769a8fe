// Copyright (c) 2022-2023 The MobileCoin Foundation

//! ISO 7816-4 short APDU framing
//!
//! Commands are encoded as `CLA INS P1 P2 [Lc DATA] [Le]`, responses as
//! `DATA SW1 SW2`. This is the only place header / length bytes are
//! written or parsed, request objects encode their bodies only.

use encdec::Encode;

use crate::{status::StatusWord, ApduError, ApduStatic};

/// APDU header length
pub const HEADER_LEN: usize = 4;

/// Maximum short APDU body length
pub const MAX_DATA_LEN: usize = 255;

/// APDU command header
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ApduHeader {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
}

impl ApduHeader {
    /// Fetch the header for a static APDU type
    pub fn of<A: ApduStatic>() -> Self {
        Self {
            cla: A::CLA,
            ins: A::INS,
            p1: A::P1,
            p2: A::P2,
        }
    }
}

/// Encode a request object to a complete command APDU
pub fn encode_command<A>(apdu: &A, buff: &mut [u8]) -> Result<usize, ApduError>
where
    A: ApduStatic + Encode<Error = ApduError>,
{
    let data_len = apdu.encode_len()?;
    if data_len > MAX_DATA_LEN {
        return Err(ApduError::InvalidLength);
    }

    // Compute total length and check buffer
    let lc_len = usize::from(data_len > 0);
    let le_len = usize::from(data_len == 0 && A::RESP_LE);
    if buff.len() < HEADER_LEN + lc_len + data_len + le_len {
        return Err(ApduError::InvalidLength);
    }

    // Write header
    buff[..HEADER_LEN].copy_from_slice(&[A::CLA, A::INS, A::P1, A::P2]);
    let mut index = HEADER_LEN;

    // Write Lc and body
    if data_len > 0 {
        buff[index] = data_len as u8;
        index += 1;

        index += apdu.encode(&mut buff[index..])?;
    }

    // Write Le (any length)
    if le_len > 0 {
        buff[index] = 0x00;
        index += 1;
    }

    Ok(index)
}

/// Parse a command APDU into header and body, checking `Lc`
/// against the supplied data length
pub fn parse_command(buff: &[u8]) -> Result<(ApduHeader, &[u8]), ApduError> {
    if buff.len() < HEADER_LEN {
        return Err(ApduError::InvalidLength);
    }

    let header = ApduHeader {
        cla: buff[0],
        ins: buff[1],
        p1: buff[2],
        p2: buff[3],
    };

    let body = &buff[HEADER_LEN..];

    let data = match body.len() {
        // Case 1: no body, no response data
        0 => &body[..0],
        // Case 2: Le only
        1 => &body[..0],
        // Case 3 / 4: Lc, data, optional Le
        n => {
            let lc = body[0] as usize;
            if n != 1 + lc && n != 2 + lc {
                return Err(ApduError::InvalidLength);
            }
            &body[1..][..lc]
        }
    };

    Ok((header, data))
}

/// Split a response APDU into data and status word
///
/// Unknown status words are returned as raw values
pub fn split_response(buff: &[u8]) -> Result<(&[u8], Result<StatusWord, u16>), ApduError> {
    if buff.len() < 2 {
        return Err(ApduError::InvalidLength);
    }

    let (data, sw) = buff.split_at(buff.len() - 2);

    Ok((data, StatusWord::from_bytes(sw[0], sw[1])))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::record::{RecordKey, StoreReq};

    #[test]
    fn store_command_framing() {
        let req = StoreReq::new(RecordKey::new([0x01; 32], [0x02; 20]), [0x03; 32]);

        let mut buff = [0u8; 128];
        let n = encode_command(&req, &mut buff).unwrap();

        assert_eq!(n, 4 + 1 + 84);
        assert_eq!(&buff[..5], &[0x80, 0x10, 0x00, 0x00, 84]);

        let (h, data) = parse_command(&buff[..n]).unwrap();
        assert_eq!(h, ApduHeader::of::<StoreReq>());
        assert_eq!(data.len(), 84);
    }

    #[test]
    fn parse_command_with_le() {
        let cmd = [0x80, 0x20, 0x00, 0x00, 0x02, 0xaa, 0xbb, 0x00];
        let (h, data) = parse_command(&cmd).unwrap();

        assert_eq!(h.ins, 0x20);
        assert_eq!(data, &[0xaa, 0xbb]);
    }

    #[test]
    fn parse_command_rejects_lc_mismatch() {
        let cmd = [0x80, 0x10, 0x00, 0x00, 0x05, 0xaa, 0xbb];
        assert_eq!(parse_command(&cmd), Err(ApduError::InvalidLength));

        assert_eq!(parse_command(&cmd[..3]), Err(ApduError::InvalidLength));
    }

    #[test]
    fn split_response_status() {
        let resp = [0x04, 0x01, 0x90, 0x00];
        let (data, sw) = split_response(&resp).unwrap();

        assert_eq!(data, &[0x04, 0x01]);
        assert_eq!(sw, Ok(StatusWord::Ok));

        let (data, sw) = split_response(&[0x6A, 0x84]).unwrap();
        assert!(data.is_empty());
        assert_eq!(sw, Ok(StatusWord::NotEnoughSpace));

        assert_eq!(split_response(&[0x90]), Err(ApduError::InvalidLength));
    }
}
