use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::Result;

/// Writes `payload` prefixed with its length as a 4-byte big-endian integer.
/// The reference implementation reads the AlertFlow stream in single 1024 B
/// chunks, implicitly assuming one alert fits one read; this framing removes
/// that partial-read hazard (see the AlertFlow framing open question).
pub async fn write_framed<W: AsyncWrite + Unpin>(stream: &mut W, payload: &[u8]) -> Result<()> {
    let len = payload.len() as u32;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(payload).await?;
    Ok(())
}

/// Reads one length-prefixed frame. Returns `Ok(None)` on a clean EOF before
/// any bytes of the next frame arrive.
pub async fn read_framed<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn round_trip_single_frame() {
        let mut buf = Vec::new();
        write_framed(&mut buf, b"hello").await.unwrap();

        let mut cursor = Cursor::new(buf);
        let frame = read_framed(&mut cursor).await.unwrap().unwrap();
        assert_eq!(frame, b"hello");
    }

    #[tokio::test]
    async fn round_trip_back_to_back_frames() {
        let mut buf = Vec::new();
        write_framed(&mut buf, b"first").await.unwrap();
        write_framed(&mut buf, b"second-frame").await.unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_framed(&mut cursor).await.unwrap().unwrap(), b"first");
        assert_eq!(read_framed(&mut cursor).await.unwrap().unwrap(), b"second-frame");
        assert!(read_framed(&mut cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_payload_frame() {
        let mut buf = Vec::new();
        write_framed(&mut buf, b"").await.unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_framed(&mut cursor).await.unwrap().unwrap(), Vec::<u8>::new());
    }
}
