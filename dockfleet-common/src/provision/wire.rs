//! Framing for the provisioning RPC.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),
}

pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(message)?;
    if payload.len() > MAX_FRAME_BYTES {
        return Err(WireError::FrameTooLarge(payload.len()));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, WireError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(WireError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(serde_json::from_slice(&payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::ScriptRequest;

    #[tokio::test]
    async fn frame_carries_length_prefix() {
        let req = ScriptRequest { working_dir: "/srv/app".into(), commands: vec!["echo hi".into()] };
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &req).await.unwrap();

        let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
        assert_eq!(len, buffer.len() - 4);

        let mut cursor = std::io::Cursor::new(buffer);
        let back: ScriptRequest = read_frame(&mut cursor).await.unwrap();
        assert_eq!(back, req);
    }

    #[tokio::test]
    async fn oversized_length_is_rejected_before_reading() {
        let mut buffer = ((MAX_FRAME_BYTES + 1) as u32).to_be_bytes().to_vec();
        buffer.extend_from_slice(b"{}");
        let mut cursor = std::io::Cursor::new(buffer);
        let err = read_frame::<_, ScriptRequest>(&mut cursor).await.unwrap_err();
        assert!(matches!(err, WireError::FrameTooLarge(_)));
    }

    #[tokio::test]
    async fn truncated_frame_is_an_io_error() {
        let mut buffer = 10u32.to_be_bytes().to_vec();
        buffer.extend_from_slice(b"{}");
        let mut cursor = std::io::Cursor::new(buffer);
        let err = read_frame::<_, ScriptRequest>(&mut cursor).await.unwrap_err();
        assert!(matches!(err, WireError::Io(_)));
    }
}
