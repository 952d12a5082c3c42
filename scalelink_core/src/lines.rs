//! Delimiter-framed line reader over an async byte stream.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Lines longer than this without a delimiter are discarded as noise.
pub const MAX_LINE_BYTES: usize = 4096;

/// Splits a byte stream on an arbitrary (possibly multi-byte) delimiter.
///
/// `next_line` is cancel safe: bytes already read stay buffered if the
/// future is dropped inside a `select!`.
#[derive(Debug)]
pub struct LineReader<R> {
    inner: R,
    buf: BytesMut,
    delimiter: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// An empty delimiter falls back to `\r`.
    pub fn new(inner: R, delimiter: &str) -> Self {
        let delimiter = if delimiter.is_empty() {
            b"\r".to_vec()
        } else {
            delimiter.as_bytes().to_vec()
        };
        Self {
            inner,
            buf: BytesMut::with_capacity(256),
            delimiter,
        }
    }

    /// Next complete line without its delimiter. `Ok(None)` on end of stream;
    /// a trailing partial line is dropped.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }
            if self.buf.len() > MAX_LINE_BYTES {
                tracing::debug!(len = self.buf.len(), "discarding oversized line");
                self.buf.clear();
            }
            if self.inner.read_buf(&mut self.buf).await? == 0 {
                return Ok(None);
            }
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let d = self.delimiter.as_slice();
        let pos = self.buf.windows(d.len()).position(|w| w == d)?;
        let line = self.buf.split_to(pos);
        self.buf.advance(d.len());
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
