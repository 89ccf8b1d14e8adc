//! HTTP Response Composition and Send
//!
//! A `Response` accumulates status, headers, and a body, then serializes
//! the whole message and writes it in one shot. Each response owns the
//! write half of its connection's socket, so sending never contends with
//! another task.
//!
//! ## Send-Once Discipline
//!
//! The first successful `send` (or any helper that sends) marks the
//! response as sent; every later attempt fails with
//! [`ResponseError::AlreadySent`]. The routing layer checks the sent flag
//! after every middleware callback and stops the chain once it flips.
//!
//! For tests and render-only use the write target can be an in-memory
//! buffer instead of a socket.

use crate::http::types::{reason_phrase, Headers, CRLF};
use bytes::Bytes;
use serde::Serialize;
use std::io;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;

/// Errors raised while composing or sending a response.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// A send was attempted after the response had already gone out.
    #[error("response has already been sent")]
    AlreadySent,

    /// The socket write failed.
    #[error("failed to write response: {0}")]
    Io(#[from] io::Error),

    /// `json` could not serialize the value.
    #[error("failed to serialize JSON body: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Where serialized bytes go.
#[derive(Debug)]
enum WriteTarget {
    /// The write half of the connection's socket.
    Stream(OwnedWriteHalf),
    /// An in-memory sink, used by tests.
    Buffer(Vec<u8>),
}

/// An HTTP response under construction, bound to one connection.
#[derive(Debug)]
pub struct Response {
    status: u16,
    headers: Headers,
    body: Bytes,
    sent: bool,
    target: WriteTarget,
}

impl Response {
    /// Creates a response writing to the socket's write half.
    ///
    /// Status starts at 200 with no headers and an empty body.
    pub fn new(writer: OwnedWriteHalf) -> Self {
        Self {
            status: 200,
            headers: Headers::new(),
            body: Bytes::new(),
            sent: false,
            target: WriteTarget::Stream(writer),
        }
    }

    /// Creates a response writing to an in-memory buffer.
    pub fn buffered() -> Self {
        Self {
            status: 200,
            headers: Headers::new(),
            body: Bytes::new(),
            sent: false,
            target: WriteTarget::Buffer(Vec::new()),
        }
    }

    /// Sets the status code. Returns `&mut self` for chaining.
    pub fn status(&mut self, status: u16) -> &mut Self {
        self.status = status;
        self
    }

    /// Returns the current status code.
    pub fn status_code(&self) -> u16 {
        self.status
    }

    /// Sets a header, replacing any existing value with the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.set(name, value);
        self
    }

    /// Returns the header collection.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Replaces the body without sending.
    pub fn body(&mut self, body: impl Into<Bytes>) -> &mut Self {
        self.body = body.into();
        self
    }

    /// Whether this response has gone out on the wire.
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// Sets the body and sends the response.
    pub async fn send(&mut self, body: impl Into<Bytes>) -> Result<(), ResponseError> {
        self.body = body.into();
        self.flush().await
    }

    /// Sends a status-only response; the reason phrase doubles as body.
    pub async fn send_status(&mut self, status: u16) -> Result<(), ResponseError> {
        self.status = status;
        let phrase = reason_phrase(status);
        self.send(phrase).await
    }

    /// Serializes `value` to JSON, sets the content type, and sends.
    pub async fn json<T: Serialize>(&mut self, value: &T) -> Result<(), ResponseError> {
        let encoded = serde_json::to_vec(value)?;
        self.headers.set("Content-Type", "application/json");
        self.send(encoded).await
    }

    /// Sends whatever has been accumulated so far.
    pub async fn end(&mut self) -> Result<(), ResponseError> {
        self.flush().await
    }

    /// Serializes and writes the message, then marks the response sent.
    async fn flush(&mut self) -> Result<(), ResponseError> {
        if self.sent {
            return Err(ResponseError::AlreadySent);
        }

        let wire = self.serialize();
        match &mut self.target {
            WriteTarget::Stream(writer) => {
                writer.write_all(&wire).await?;
                writer.flush().await?;
            }
            WriteTarget::Buffer(buf) => buf.extend_from_slice(&wire),
        }

        self.sent = true;
        Ok(())
    }

    /// Builds the full wire message: status line, headers, blank line,
    /// body. `Content-Length` is computed from the body unless a header
    /// already set it explicitly.
    fn serialize(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(128 + self.body.len());

        let phrase = reason_phrase(self.status);
        if phrase.is_empty() {
            wire.extend_from_slice(format!("HTTP/1.1 {}", self.status).as_bytes());
        } else {
            wire.extend_from_slice(format!("HTTP/1.1 {} {}", self.status, phrase).as_bytes());
        }
        wire.extend_from_slice(CRLF);

        for (name, value) in self.headers.iter() {
            wire.extend_from_slice(format!("{}: {}", name, value).as_bytes());
            wire.extend_from_slice(CRLF);
        }
        if !self.headers.contains("content-length") {
            wire.extend_from_slice(format!("Content-Length: {}", self.body.len()).as_bytes());
            wire.extend_from_slice(CRLF);
        }

        wire.extend_from_slice(CRLF);
        wire.extend_from_slice(&self.body);
        wire
    }

    /// Bytes written so far when targeting an in-memory buffer.
    #[cfg(test)]
    pub(crate) fn written(&self) -> &[u8] {
        match &self.target {
            WriteTarget::Buffer(buf) => buf,
            WriteTarget::Stream(_) => &[],
        }
    }

    /// Takes back the socket write half, for reuniting the stream after a
    /// WebSocket handshake. `None` when targeting a buffer.
    pub(crate) fn into_write_half(self) -> Option<OwnedWriteHalf> {
        match self.target {
            WriteTarget::Stream(writer) => Some(writer),
            WriteTarget::Buffer(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_serializes_status_line_and_body() {
        let mut res = Response::buffered();
        res.status(200);
        res.send("hello").await.unwrap();

        let wire = String::from_utf8(res.written().to_vec()).unwrap();
        assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(wire.contains("Content-Length: 5\r\n"));
        assert!(wire.ends_with("\r\n\r\nhello"));
    }

    #[tokio::test]
    async fn test_second_send_fails() {
        let mut res = Response::buffered();
        res.send("first").await.unwrap();

        let err = res.send("second").await.unwrap_err();
        assert!(matches!(err, ResponseError::AlreadySent));

        // the wire still holds only the first message
        let wire = String::from_utf8(res.written().to_vec()).unwrap();
        assert!(wire.ends_with("first"));
    }

    #[tokio::test]
    async fn test_send_status_uses_reason_phrase_as_body() {
        let mut res = Response::buffered();
        res.send_status(404).await.unwrap();

        let wire = String::from_utf8(res.written().to_vec()).unwrap();
        assert!(wire.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(wire.ends_with("\r\n\r\nNot Found"));
        assert!(res.is_sent());
    }

    #[tokio::test]
    async fn test_json_sets_content_type() {
        let mut res = Response::buffered();
        res.json(&serde_json::json!({"ok": true})).await.unwrap();

        let wire = String::from_utf8(res.written().to_vec()).unwrap();
        assert!(wire.contains("Content-Type: application/json\r\n"));
        assert!(wire.ends_with(r#"{"ok":true}"#));
    }

    #[tokio::test]
    async fn test_explicit_content_length_not_overwritten() {
        let mut res = Response::buffered();
        res.set("Content-Length", "0");
        res.end().await.unwrap();

        let wire = String::from_utf8(res.written().to_vec()).unwrap();
        assert_eq!(wire.matches("Content-Length").count(), 1);
    }

    #[tokio::test]
    async fn test_custom_headers_serialized_in_order() {
        let mut res = Response::buffered();
        res.set("X-First", "1").set("X-Second", "2");
        res.end().await.unwrap();

        let wire = String::from_utf8(res.written().to_vec()).unwrap();
        let first = wire.find("X-First").unwrap();
        let second = wire.find("X-Second").unwrap();
        assert!(first < second);
    }

    #[tokio::test]
    async fn test_unknown_status_has_no_phrase() {
        let mut res = Response::buffered();
        res.status(599);
        res.end().await.unwrap();

        let wire = String::from_utf8(res.written().to_vec()).unwrap();
        assert!(wire.starts_with("HTTP/1.1 599\r\n"));
    }
}
