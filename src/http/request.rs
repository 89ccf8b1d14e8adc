//! HTTP Request Construction
//!
//! A `Request` is built once per connection from the raw header lines the
//! connection handler pulled off the socket. After construction it is
//! read-only, with two exceptions: the routing layer populates the
//! path-parameter map, and body-parsing middleware may fill the `payload`
//! slot after draining the body stream.
//!
//! The body stream handle is only attached when the request carried a
//! `Content-Length` header that parsed as a non-negative integer; its
//! absence means "no body" and body-parsing middleware must fall through.

use crate::connection::BodyStream;
use crate::http::types::{parse_query, Headers, Method, UnknownMethod};
use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use thiserror::Error;

/// Failure to turn raw header lines into a `Request`.
///
/// Raised before any router dispatch happens. All variants carry the same
/// wire-visible status and message; the variant records what actually went
/// wrong for logging.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// No header lines were read at all.
    #[error("unable to construct request")]
    MissingRequestLine,

    /// The request line did not have the `METHOD SP path SP version` shape.
    #[error("unable to construct request")]
    MalformedRequestLine,

    /// The method token is not one this server routes.
    #[error("unable to construct request")]
    UnknownMethod(#[from] UnknownMethod),
}

impl ProtocolError {
    /// The status code reported for any construction failure.
    pub fn status(&self) -> u16 {
        500
    }
}

/// A request body after a body-parsing middleware has consumed the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Parsed by the JSON body parser.
    Json(serde_json::Value),
    /// Parsed by the urlencoded body parser; ordered key/value pairs.
    Form(Vec<(String, String)>),
    /// Collected verbatim by the raw body parser.
    Raw(Bytes),
}

/// A parsed HTTP request, paired with the response for its connection.
pub struct Request {
    method: Method,
    path: String,
    version: String,
    headers: Headers,
    query: Vec<(String, String)>,
    params: HashMap<String, String>,
    peer: SocketAddr,
    content_length: Option<u64>,
    body: Option<BodyStream>,
    /// Filled by body-parsing middleware; `None` until one runs.
    pub payload: Option<Payload>,
}

impl Request {
    /// Builds a request from the header lines read off the socket.
    ///
    /// The first line must be `METHOD SP path SP version`; the rest are
    /// `Name: value` pairs (lines without a colon are ignored). The query
    /// string is split off the path at the first `?`.
    pub fn from_header_lines(lines: &[String], peer: SocketAddr) -> Result<Self, ProtocolError> {
        let request_line = lines.first().ok_or(ProtocolError::MissingRequestLine)?;

        let mut parts = request_line.split_whitespace();
        let (method, target, version) = match (parts.next(), parts.next(), parts.next()) {
            (Some(m), Some(t), Some(v)) => (m, t, v),
            _ => return Err(ProtocolError::MalformedRequestLine),
        };

        let method: Method = method.parse()?;

        let (path, query) = match target.split_once('?') {
            Some((path, raw)) => (path.to_string(), parse_query(raw)),
            None => (target.to_string(), Vec::new()),
        };

        let mut headers = Headers::new();
        for line in &lines[1..] {
            if let Some((name, value)) = line.split_once(':') {
                headers.append(name.trim(), value.trim());
            }
        }

        let content_length = headers
            .get("content-length")
            .and_then(|v| v.trim().parse::<u64>().ok());

        Ok(Self {
            method,
            path,
            version: version.to_string(),
            headers,
            query,
            params: HashMap::new(),
            peer,
            content_length,
            body: None,
            payload: None,
        })
    }

    /// The request method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// The request path, without the query string.
    ///
    /// While a mounted sub-router is dispatching, the mount prefix is
    /// stripped from this value; it is restored afterwards.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The HTTP version token from the request line (e.g. `HTTP/1.1`).
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The client's socket address.
    pub fn ip(&self) -> SocketAddr {
        self.peer
    }

    /// First header value with a case-insensitive name match.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// The full header collection.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// First query-string value for `name`.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// A path parameter bound during routing (`:id` segments).
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// All path parameters bound so far.
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// The declared `Content-Length`, when present and valid.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// The body stream, present only when `Content-Length` was supplied.
    pub fn body_mut(&mut self) -> Option<&mut BodyStream> {
        self.body.as_mut()
    }

    /// Detaches and returns the body stream.
    pub fn take_body(&mut self) -> Option<BodyStream> {
        self.body.take()
    }

    pub(crate) fn attach_body(&mut self, body: BodyStream) {
        self.body = Some(body);
    }

    pub(crate) fn set_path(&mut self, path: String) {
        self.path = path;
    }

    pub(crate) fn insert_param(&mut self, name: String, value: String) {
        self.params.insert(name, value);
    }
}

// Manual impl: the body stream is a type-erased reader with no Debug.
impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("version", &self.version)
            .field("peer", &self.peer)
            .field("content_length", &self.content_length)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}
