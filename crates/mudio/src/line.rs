use bytes::Bytes;
use bytes::BytesMut;
use memchr::memchr;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;

use crate::telnet::ControlFilter;

const READ_CHUNK: usize = 4 * 1024;

/// Line reader that runs every byte through a [`ControlFilter`] before framing.
///
/// Filtering happens on the raw stream, ahead of line splitting, so a control
/// sequence may straddle reads or sit in the middle of a line.
#[derive(Debug)]
pub struct LineReader<R> {
    inner: R,
    filter: ControlFilter,
    buf: BytesMut,
    scratch: Vec<u8>,
    max_line_len: usize,
}

impl<R> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            filter: ControlFilter::new(),
            buf: BytesMut::with_capacity(8 * 1024),
            scratch: Vec::with_capacity(READ_CHUNK),
            max_line_len: 8 * 1024,
        }
    }

    pub fn max_line_len(mut self, max: usize) -> Self {
        self.max_line_len = max.max(1);
        self
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Read one line, stripping trailing `\n` and optional `\r`.
    ///
    /// Returns:
    /// - `Ok(Some(bytes))` for a line (may be empty),
    /// - `Ok(None)` on clean EOF with no buffered data.
    pub async fn read_line(&mut self) -> std::io::Result<Option<Bytes>> {
        let mut raw = [0u8; READ_CHUNK];
        loop {
            if let Some(i) = memchr(b'\n', &self.buf) {
                let line = self.buf.split_to(i + 1).freeze();
                return Ok(Some(trim_eol(line)));
            }

            if self.buf.len() > self.max_line_len {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "line too long",
                ));
            }

            let n = self.inner.read(&mut raw).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "eof while reading line",
                ));
            }

            self.scratch.clear();
            self.filter.filter_into(&raw[..n], &mut self.scratch);
            self.buf.extend_from_slice(&self.scratch);
        }
    }
}

fn trim_eol(mut b: Bytes) -> Bytes {
    let mut end = b.len();
    if end > 0 && b[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && b[end - 1] == b'\r' {
        end -= 1;
    }
    b.truncate(end);
    // Telnet clients may send CR NUL; the NUL then leads the next line.
    let start = b.iter().take_while(|&&c| c == 0).count();
    b.slice(start..)
}
