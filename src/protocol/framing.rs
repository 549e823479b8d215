//! Wire protocol: length-prefixed JSON framing
//!
//! Each frame is a 4-byte big-endian length followed by that many bytes
//! of JSON.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};

/// Largest accepted frame body
pub const MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Read one frame and decode it
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncReadExt + Unpin,
    T: DeserializeOwned,
{
    let len = reader.read_u32().await?;
    if len > MAX_FRAME_SIZE {
        return Err(Error::Protocol(format!(
            "Frame too large: {} bytes (max {})",
            len, MAX_FRAME_SIZE
        )));
    }

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;

    serde_json::from_slice(&buf).map_err(|e| Error::Protocol(format!("Malformed frame: {}", e)))
}

/// Encode a message and write it as one frame
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let json = serde_json::to_vec(msg)?;
    if json.len() > MAX_FRAME_SIZE as usize {
        return Err(Error::Protocol(format!(
            "Frame too large: {} bytes (max {})",
            json.len(),
            MAX_FRAME_SIZE
        )));
    }

    writer.write_u32(json.len() as u32).await?;
    writer.write_all(&json).await?;
    writer.flush().await?;
    Ok(())
}
