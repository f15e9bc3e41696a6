//! Length-prefixed framing over the serialized [`crate::protocol::Envelope`]
//! (§6): a 4-byte big-endian body size followed by the bincode-serialized
//! body. Bounded by `MAX_MESSAGE_SIZE` the same way the teacher's
//! `network::protocol::MAX_BINCODE_SIZE` bounds its own deserialization.

use crate::error::{Error, Result};
use crate::protocol::Envelope;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Prevents memory exhaustion from a peer claiming an enormous body size.
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Envelope> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_SIZE {
        return Err(Error::ProtocolViolation(format!("frame too large: {len} bytes")));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    let (envelope, _) = bincode::serde::decode_from_slice(&body, bincode::config::standard())
        .map_err(|e| Error::ProtocolViolation(format!("malformed message: {e}")))?;
    Ok(envelope)
}

pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, envelope: &Envelope) -> Result<()> {
    let body = bincode::serde::encode_to_vec(envelope, bincode::config::standard())
        .map_err(|e| Error::Serialization(e.to_string()))?;
    if body.len() as u64 > MAX_MESSAGE_SIZE as u64 {
        return Err(Error::Internal("outbound message exceeds MAX_MESSAGE_SIZE".into()));
    }
    writer.write_all(&(body.len() as u32).to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}
