//! Native messaging framing: every message is a 32-bit length in native byte order followed by
//! that many bytes of UTF-8 JSON.

use anyhow::{bail, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest message the browser may send to the host.
pub const MAX_INBOUND_FRAME: usize = 64 * 1024 * 1024;
/// Largest message the browser accepts from the host.
pub const MAX_OUTBOUND_FRAME: usize = 1024 * 1024;

/// Reads one frame. `None` means the browser closed the stream between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        let read = reader.read(&mut header[filled..]).await?;
        if read == 0 {
            if filled == 0 {
                return Ok(None);
            }
            bail!("Stream closed inside a frame header");
        }
        filled += read;
    }

    let len = u32::from_ne_bytes(header) as usize;
    if len > MAX_INBOUND_FRAME {
        bail!("Incoming frame of {len} bytes exceeds {MAX_INBOUND_FRAME}");
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_OUTBOUND_FRAME {
        bail!(
            "Outgoing frame of {} bytes exceeds {MAX_OUTBOUND_FRAME}",
            payload.len()
        );
    }
    writer
        .write_all(&(payload.len() as u32).to_ne_bytes())
        .await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tokio::io::AsyncWriteExt;

    use super::{read_frame, write_frame, MAX_INBOUND_FRAME, MAX_OUTBOUND_FRAME};

    #[tokio::test]
    async fn frames_survive_the_pipe() -> Result<()> {
        let (mut host, mut browser) = tokio::io::duplex(1024);
        write_frame(&mut host, br#"{"type":"playSound"}"#).await?;
        write_frame(&mut host, b"").await?;
        drop(host);

        assert_eq!(
            read_frame(&mut browser).await?.as_deref(),
            Some(&br#"{"type":"playSound"}"#[..])
        );
        assert_eq!(read_frame(&mut browser).await?, Some(vec![]));
        assert_eq!(read_frame(&mut browser).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn length_is_native_endian() -> Result<()> {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, b"{}").await?;
        assert_eq!(&buffer[..4], &2u32.to_ne_bytes());
        assert_eq!(&buffer[4..], b"{}");
        Ok(())
    }

    #[tokio::test]
    async fn oversize_frames_are_rejected() -> Result<()> {
        let mut sink = Vec::new();
        let too_big = vec![b' '; MAX_OUTBOUND_FRAME + 1];
        assert!(write_frame(&mut sink, &too_big).await.is_err());
        assert!(sink.is_empty());

        let (mut browser, mut host) = tokio::io::duplex(64);
        browser
            .write_all(&((MAX_INBOUND_FRAME + 1) as u32).to_ne_bytes())
            .await?;
        assert!(read_frame(&mut host).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn truncated_frames_are_errors() -> Result<()> {
        let (mut browser, mut host) = tokio::io::duplex(64);
        browser.write_all(&10u32.to_ne_bytes()).await?;
        browser.write_all(b"{}").await?;
        drop(browser);
        assert!(read_frame(&mut host).await.is_err());

        let (mut browser, mut host) = tokio::io::duplex(64);
        browser.write_all(&[1, 0]).await?;
        drop(browser);
        assert!(read_frame(&mut host).await.is_err());
        Ok(())
    }
}
