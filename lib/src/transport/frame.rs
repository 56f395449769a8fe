// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Length-prefixed APDU framing for stream transports
//!
//! Each frame is a 4-byte big-endian length followed by the raw APDU.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::TransportError;

/// Maximum accepted frame length (extended APDU plus status)
pub const MAX_FRAME_LEN: usize = 65_546;

/// Write a single frame
pub async fn write_frame<W: AsyncWrite + Unpin>(
    w: &mut W,
    data: &[u8],
) -> Result<(), TransportError> {
    if data.len() > MAX_FRAME_LEN {
        return Err(TransportError::InvalidLength(data.len()));
    }

    w.write_u32(data.len() as u32).await?;
    w.write_all(data).await?;
    w.flush().await?;

    Ok(())
}

/// Read a single frame
pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> Result<Vec<u8>, TransportError> {
    let n = match r.read_u32().await {
        Ok(n) => n as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(TransportError::Closed)
        }
        Err(e) => return Err(e.into()),
    };

    if n > MAX_FRAME_LEN {
        return Err(TransportError::InvalidLength(n));
    }

    let mut buff = vec![0u8; n];
    r.read_exact(&mut buff).await?;

    Ok(buff)
}
