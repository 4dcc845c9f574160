pub mod bounded;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{Error, ProtocolError};

/// Size of the length prefix in bytes.
pub const LEN_PREFIX_SIZE: usize = 4;

/// Size of a bare length field on the wire (no prefix).
pub const U64_FIELD_SIZE: usize = 8;

/// Default maximum frame payload size: 64 KiB.
///
/// Handshake frames are small (a 2048-bit SPKI public key is ~294 bytes, a
/// sealed key 256 bytes, the nonce 12); the cap bounds memory against a
/// hostile peer declaring an enormous length.
pub const MAX_FRAME_LEN: u32 = 64 * 1024;

/// Codec for the wire's length-prefixed unit: a 4-byte big-endian length
/// followed by exactly that many payload bytes.
#[derive(Debug)]
pub struct FrameCodec {
    /// Cached length from a partial decode.
    pending_len: Option<usize>,
    /// Maximum accepted payload length (enforced on both encode and decode).
    max_frame_len: u32,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_LEN)
    }
}

impl FrameCodec {
    pub fn new(max_frame_len: u32) -> Self {
        Self {
            pending_len: None,
            max_frame_len,
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let len = match self.pending_len.take() {
            Some(len) => len,
            None => {
                if src.len() < LEN_PREFIX_SIZE {
                    return Ok(None);
                }
                let declared = u32::from_be_bytes([src[0], src[1], src[2], src[3]]);
                if declared > self.max_frame_len {
                    return Err(ProtocolError::FrameTooLarge {
                        size: declared,
                        max: self.max_frame_len,
                    });
                }
                src.advance(LEN_PREFIX_SIZE);
                declared as usize
            }
        };

        // Wait for the full payload.
        if src.len() < len {
            src.reserve(len - src.len());
            self.pending_len = Some(len);
            return Ok(None);
        }

        Ok(Some(src.split_to(len).freeze()))
    }
}

impl Encoder<&[u8]> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        if payload.len() > self.max_frame_len as usize {
            return Err(ProtocolError::FrameTooLarge {
                size: payload.len().min(u32::MAX as usize) as u32,
                max: self.max_frame_len,
            });
        }
        dst.reserve(LEN_PREFIX_SIZE + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.extend_from_slice(payload);
        Ok(())
    }
}

/// Write one length-prefixed frame and flush.
pub async fn send_frame<T: AsyncWrite + Unpin>(
    transport: &mut T,
    codec: &mut FrameCodec,
    payload: &[u8],
) -> Result<(), Error> {
    let mut buf = BytesMut::with_capacity(LEN_PREFIX_SIZE + payload.len());
    codec.encode(payload, &mut buf)?;
    transport.write_all(&buf).await.map_err(Error::Io)?;
    transport.flush().await.map_err(Error::Io)?;
    Ok(())
}

/// Read one length-prefixed frame, buffering through `read_buf`.
///
/// Bytes read past the frame stay in `read_buf` for the caller's next phase.
/// Fails with [`ProtocolError::UnexpectedEof`] if the stream closes before
/// the declared length is satisfied.
pub async fn recv_frame<T: AsyncRead + Unpin>(
    transport: &mut T,
    codec: &mut FrameCodec,
    read_buf: &mut BytesMut,
) -> Result<Bytes, Error> {
    loop {
        if let Some(frame) = codec.decode(read_buf)? {
            return Ok(frame);
        }
        let n = transport.read_buf(read_buf).await.map_err(Error::Io)?;
        if n == 0 {
            return Err(ProtocolError::UnexpectedEof.into());
        }
    }
}

/// Write a bare 8-byte big-endian integer field.
pub async fn send_u64<T: AsyncWrite + Unpin>(transport: &mut T, value: u64) -> Result<(), Error> {
    transport
        .write_all(&value.to_be_bytes())
        .await
        .map_err(Error::Io)?;
    transport.flush().await.map_err(Error::Io)?;
    Ok(())
}

/// Read a bare 8-byte big-endian integer field through `read_buf`.
pub async fn recv_u64<T: AsyncRead + Unpin>(
    transport: &mut T,
    read_buf: &mut BytesMut,
) -> Result<u64, Error> {
    while read_buf.len() < U64_FIELD_SIZE {
        let n = transport.read_buf(read_buf).await.map_err(Error::Io)?;
        if n == 0 {
            return Err(ProtocolError::UnexpectedEof.into());
        }
    }
    Ok(read_buf.get_u64())
}
