//! Length-Bounded Body Stream Adapter
//!
//! One `BodyReader` instance lives for the whole connection and is used in
//! two phases:
//!
//! 1. **Header phase**: `read_line` pulls raw header lines off the socket
//!    byte by byte, stopping exactly at each line terminator so no body
//!    bytes are consumed early.
//! 2. **Body phase**: once the headers reveal a `Content-Length`,
//!    `set_limit` arms the bound and `read`/`read_to_end` expose at most
//!    that many further bytes, regardless of how much the client actually
//!    wrote.
//!
//! The same instance must serve both phases: the bound is only known after
//! the headers have been parsed, and splitting into two readers would lose
//! the stream position.

use bytes::{Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Maximum accepted length of a single header line (8 KiB).
///
/// A longer line is consumed up to the bound and reported as an empty
/// line, which callers treat as end-of-headers. Oversized headers are
/// therefore silently dropped rather than rejected with a 4xx; a known
/// hardening gap.
pub const MAX_LINE_BYTES: usize = 8 * 1024;

/// Read chunk size used by `read_to_end`.
const DRAIN_CHUNK: usize = 4096;

/// A `BodyReader` over a type-erased stream, as carried by a `Request`.
///
/// `Sync` is part of the bound so a `Request` stays `Sync` and futures
/// holding `&Request` across an await remain spawnable.
pub type BodyStream = BodyReader<Box<dyn AsyncRead + Send + Sync + Unpin>>;

/// Adapter exposing a socket read half as header lines, then as a
/// length-bounded body stream.
///
/// Does not support seeking or writing.
#[derive(Debug)]
pub struct BodyReader<R> {
    inner: R,
    /// Declared body length; zero until `set_limit` is called.
    length: u64,
    /// Bytes of body consumed so far.
    position: u64,
}

impl<R: AsyncRead + Unpin> BodyReader<R> {
    /// Wraps a readable stream. The body bound starts at zero; body reads
    /// return no data until `set_limit` arms it.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            length: 0,
            position: 0,
        }
    }

    /// Arms the body bound with the declared `Content-Length`.
    pub fn set_limit(&mut self, length: u64) {
        self.length = length;
        self.position = 0;
    }

    /// Returns the declared body length.
    pub fn limit(&self) -> u64 {
        self.length
    }

    /// Returns how many body bytes remain readable.
    pub fn remaining(&self) -> u64 {
        self.length - self.position
    }

    /// Consumes the adapter, returning the underlying stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Type-erases the underlying stream, preserving the adapter's bound
    /// and position so it remains the same logical instance.
    pub fn boxed(self) -> BodyStream
    where
        R: Send + Sync + 'static,
    {
        BodyReader {
            inner: Box::new(self.inner),
            length: self.length,
            position: self.position,
        }
    }

    /// Reads one header line, excluding the terminator.
    ///
    /// Reads byte by byte up to [`MAX_LINE_BYTES`]. A trailing `\r` is
    /// stripped, so both CRLF and bare LF terminators work. Returns an
    /// empty string when the line cannot be completed: end of stream
    /// before a terminator, or a line exceeding the bound.
    pub async fn read_line(&mut self) -> io::Result<String> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            if line.len() == MAX_LINE_BYTES {
                return Ok(String::new());
            }
            let n = self.inner.read(&mut byte).await?;
            if n == 0 {
                return Ok(String::new());
            }
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
        }

        if line.last() == Some(&b'\r') {
            line.pop();
        }

        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    /// Reads body bytes into `buf`, clamped to the declared length.
    ///
    /// When `position + buf.len()` would exceed the bound, the request is
    /// shrunk to the remaining bytes. A clamped length of zero reads
    /// nothing and returns `Ok(0)`; that is the end-of-stream signal, not
    /// an error.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut wanted = buf.len() as u64;
        if self.position + wanted > self.length {
            wanted = self.length - self.position;
        }
        if wanted == 0 {
            return Ok(0);
        }

        let n = self.inner.read(&mut buf[..wanted as usize]).await?;
        self.position += n as u64;
        Ok(n)
    }

    /// Drains all remaining body bytes into a single buffer.
    pub async fn read_to_end(&mut self) -> io::Result<Bytes> {
        let mut collected = BytesMut::with_capacity(self.remaining().min(64 * 1024) as usize);
        let mut chunk = [0u8; DRAIN_CHUNK];

        loop {
            let n = self.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&chunk[..n]);
        }

        Ok(collected.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_line_strips_crlf() {
        let data = b"GET / HTTP/1.1\r\nHost: example\r\n\r\n";
        let mut reader = BodyReader::new(&data[..]);

        assert_eq!(reader.read_line().await.unwrap(), "GET / HTTP/1.1");
        assert_eq!(reader.read_line().await.unwrap(), "Host: example");
        assert_eq!(reader.read_line().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_read_line_accepts_bare_lf() {
        let data = b"first\nsecond\n";
        let mut reader = BodyReader::new(&data[..]);

        assert_eq!(reader.read_line().await.unwrap(), "first");
        assert_eq!(reader.read_line().await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_read_line_eof_returns_empty() {
        let data = b"no terminator here";
        let mut reader = BodyReader::new(&data[..]);

        assert_eq!(reader.read_line().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_read_line_oversized_returns_empty() {
        let mut data = vec![b'a'; MAX_LINE_BYTES + 10];
        data.extend_from_slice(b"\r\n");
        let mut reader = BodyReader::new(&data[..]);

        assert_eq!(reader.read_line().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_read_clamps_to_declared_length() {
        // 150 bytes on the wire, but only 100 declared
        let data = vec![7u8; 150];
        let mut reader = BodyReader::new(&data[..]);
        reader.set_limit(100);

        let mut buf = [0u8; 60];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 60);
        assert_eq!(reader.read(&mut buf).await.unwrap(), 40);
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
        assert_eq!(reader.remaining(), 0);
    }

    #[tokio::test]
    async fn test_read_zero_limit_is_immediate_eof() {
        let data = b"leftover bytes";
        let mut reader = BodyReader::new(&data[..]);
        reader.set_limit(0);

        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_header_phase_then_body_phase_same_instance() {
        let data = b"POST /echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello...trailing";
        let mut reader = BodyReader::new(&data[..]);

        assert_eq!(reader.read_line().await.unwrap(), "POST /echo HTTP/1.1");
        assert_eq!(reader.read_line().await.unwrap(), "Content-Length: 5");
        assert_eq!(reader.read_line().await.unwrap(), "");

        reader.set_limit(5);
        let body = reader.read_to_end().await.unwrap();
        assert_eq!(&body[..], b"hello");
    }

    #[test]
    fn test_body_stream_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        // A Request carrying a body stream must stay shareable across
        // task boundaries.
        assert_send_sync::<BodyStream>();
    }

    #[tokio::test]
    async fn test_read_to_end_respects_bound() {
        let data = vec![1u8; 10_000];
        let mut reader = BodyReader::new(&data[..]);
        reader.set_limit(8_192);

        let body = reader.read_to_end().await.unwrap();
        assert_eq!(body.len(), 8_192);
    }
}
