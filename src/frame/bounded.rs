use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

/// Reader adapter that yields at most `limit` bytes from the underlying
/// stream, then reports end-of-data regardless of what else is queued.
///
/// This decouples "how many ciphertext bytes belong to this transfer" from
/// the connection's own end-of-stream: the peer may keep the connection open
/// after the declared byte count, or close it immediately, without affecting
/// ingestion. If the stream instead ends *before* the limit, callers see a
/// short total rather than an error here.
#[derive(Debug)]
pub struct BoundedReader<R> {
    inner: R,
    remaining: u64,
}

impl<R> BoundedReader<R> {
    pub fn new(inner: R, limit: u64) -> Self {
        Self {
            inner,
            remaining: limit,
        }
    }

    /// Bytes still allowed to be read.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for BoundedReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = self.get_mut();
        if me.remaining == 0 || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let limit = me.remaining.min(buf.remaining() as u64) as usize;
        let mut limited = buf.take(limit);
        ready!(Pin::new(&mut me.inner).poll_read(cx, &mut limited))?;

        let n = limited.filled().len();
        // Safety: the inner reader initialized these bytes via `limited`,
        // which borrows the same backing storage.
        unsafe {
            buf.assume_init(n);
        }
        buf.advance(n);
        me.remaining -= n as u64;
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn stops_at_limit_with_more_queued() {
        let src: &[u8] = b"0123456789";
        let mut bounded = BoundedReader::new(src, 4);

        let mut out = Vec::new();
        let n = bounded.read_to_end(&mut out).await.unwrap();
        assert_eq!(n, 4);
        assert_eq!(&out[..], b"0123");
        assert_eq!(bounded.remaining(), 0);

        // Further reads keep signalling end-of-data.
        let mut buf = [0u8; 4];
        assert_eq!(bounded.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn short_source_yields_short_total() {
        let src: &[u8] = b"abc";
        let mut bounded = BoundedReader::new(src, 10);

        let mut out = Vec::new();
        bounded.read_to_end(&mut out).await.unwrap();
        assert_eq!(&out[..], b"abc");
        assert_eq!(bounded.remaining(), 7);
    }

    #[tokio::test]
    async fn zero_limit_is_immediate_eof() {
        let src: &[u8] = b"data";
        let mut bounded = BoundedReader::new(src, 0);

        let mut buf = [0u8; 4];
        assert_eq!(bounded.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn chained_residual_then_stream() {
        // Ingestion reads residual handshake bytes before the live stream.
        let residual: &[u8] = b"resid";
        let live: &[u8] = b"ual-stream-plus-extra";
        let mut bounded = BoundedReader::new(residual.chain(live), 10);

        let mut out = Vec::new();
        bounded.read_to_end(&mut out).await.unwrap();
        assert_eq!(&out[..], b"residual-s");
    }
}
