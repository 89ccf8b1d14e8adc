//! HTTP/1.1 Message Layer
//!
//! This module covers everything about individual HTTP messages: the wire
//! vocabulary (methods, headers, status phrases), request construction
//! from raw header lines, and response composition and sending.
//!
//! ## Overview
//!
//! The server speaks plain HTTP/1.1 with one request per connection: no
//! keep-alive reuse, no pipelining, no chunked transfer encoding. That
//! keeps the message layer small enough to hand-roll: a request is built
//! from the header lines the connection handler read, and a response is
//! a status, a header list, and a body serialized in one shot.
//!
//! ## Modules
//!
//! - `types`: `Method`, the ordered case-insensitive `Headers` map, query
//!   parsing, and status reason phrases
//! - `request`: `Request` construction and accessors
//! - `response`: `Response` composition, send-once discipline
//!
//! ## Example
//!
//! ```ignore
//! use expresso::http::{Request, Response};
//!
//! let req = Request::from_header_lines(&lines, peer)?;
//! let mut res = Response::new(write_half);
//! res.status(200).set("X-Served-By", "expresso");
//! res.send("hello").await?;
//! ```

pub mod request;
pub mod response;
pub mod types;

// Re-export commonly used types for convenience
pub use request::{Payload, ProtocolError, Request};
pub use response::{Response, ResponseError};
pub use types::{parse_query, reason_phrase, Headers, Method, UnknownMethod, CRLF};
