//! Framing con prefijo de longitud: `u32` big-endian + JSON.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use bridge_core::BridgeError;

pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), BridgeError>
    where W: AsyncWriteExt + Unpin,
          T: Serialize
{
    let bytes = serde_json::to_vec(message)?;
    let len = u32::try_from(bytes.len()).ok()
                                        .filter(|l| *l <= MAX_FRAME_LEN)
                                        .ok_or_else(|| BridgeError::Transport(format!("frame too large: {} bytes",
                                                                                      bytes.len())))?;
    writer.write_u32(len).await.map_err(|e| BridgeError::transport("write frame", e))?;
    writer.write_all(&bytes).await.map_err(|e| BridgeError::transport("write frame", e))?;
    writer.flush().await.map_err(|e| BridgeError::transport("flush frame", e))?;
    Ok(())
}

/// `Ok(None)` si el par cerró limpiamente entre frames.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, BridgeError>
    where R: AsyncReadExt + Unpin,
          T: DeserializeOwned
{
    let len = match reader.read_u32().await {
        Ok(len) => len,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(BridgeError::transport("read frame length", e)),
    };
    if len > MAX_FRAME_LEN {
        return Err(BridgeError::Transport(format!("frame of {len} bytes exceeds limit")));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await.map_err(|e| BridgeError::transport("read frame body", e))?;
    Ok(Some(serde_json::from_slice(&buf)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::CallResponse;
    use serde_json::json;

    #[tokio::test]
    async fn frame_carries_length_prefix() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &json!({"a": 1})).await.unwrap();
        assert_eq!(&buf[..4], &7u32.to_be_bytes());
        assert_eq!(&buf[4..], br#"{"a":1}"#);
    }

    #[tokio::test]
    async fn clean_eof_is_none_and_truncation_is_error() {
        let mut empty: &[u8] = &[];
        assert!(read_frame::<_, CallResponse>(&mut empty).await.unwrap().is_none());

        let mut truncated: &[u8] = &[0, 0, 0, 10, b'{'];
        assert!(read_frame::<_, CallResponse>(&mut truncated).await.is_err());

        let mut huge: &[u8] = &[0xff, 0xff, 0xff, 0xff];
        assert!(matches!(read_frame::<_, CallResponse>(&mut huge).await, Err(BridgeError::Transport(_))));
    }
}
