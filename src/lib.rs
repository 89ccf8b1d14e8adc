//! # Expresso - An Express-Style Web Framework for Rust
//!
//! Expresso is a minimal concurrent HTTP/1.1 server with an Express-style
//! routing and middleware engine, plus the WebSocket opening handshake.
//! It demonstrates systems programming concepts like async network I/O,
//! ordered middleware dispatch, and hand-rolled protocol handling.
//!
//! ## Features
//!
//! - **Express-Style Routing**: verb helpers, `:param` path parameters,
//!   mounted sub-routers, first-match dispatch
//! - **Middleware Chains**: ordered chains with explicit continuation
//!   signals and dedicated error middleware
//! - **Bounded Bodies**: `Content-Length`-capped body streaming, so a
//!   handler can never read past the declared body
//! - **WebSocket Upgrades**: RFC 6455 opening handshake with upgraded
//!   sockets parked in a shared registry
//! - **Async I/O**: built on Tokio, one task per connection, semaphore
//!   admission control
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                             Expresso                                │
//! │                                                                     │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐              │
//! │  │ TCP Server  │───>│ Connection  │───>│   Router    │              │
//! │  │ (app::run)  │    │  Handler    │    │  dispatch   │              │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘              │
//! │                            │                  │                     │
//! │                            │ upgrade?         ▼                     │
//! │                            ▼           ┌─────────────┐              │
//! │                     ┌─────────────┐    │ Middleware  │              │
//! │                     │ WS handshake│    │   chains    │              │
//! │                     │ + registry  │    └──────┬──────┘              │
//! │                     └─────────────┘           │                     │
//! │                                               ▼                     │
//! │                                        ┌─────────────┐              │
//! │                                        │  Response   │              │
//! │                                        │ (send once) │              │
//! │                                        └─────────────┘              │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use expresso::{App, Flow};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let mut app = App::new();
//!
//!     app.get("/users/:id", |req, mut res| async move {
//!         let id = req.param("id").unwrap_or("?").to_string();
//!         let result = res.send(format!("user {id}")).await;
//!         (req, res, result.map(|_| Flow::Halt).map_err(Into::into))
//!     });
//!
//!     app.listen(3000).await
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`http`]: request/response types and the HTTP/1.1 wire vocabulary
//! - [`routing`]: router, routes, middleware chains, error dispatch
//! - [`connection`]: body streaming and the per-connection lifecycle
//! - [`ws`]: WebSocket opening handshake and upgrade registry
//! - [`builtin`]: body parsers and static-file middleware
//! - [`app`]: the application facade, configuration, and server loop
//!
//! ## Design Highlights
//!
//! ### One Request Per Connection
//!
//! There is no keep-alive reuse, pipelining, or chunked transfer
//! encoding. A connection reads one request, sends one response (or
//! completes a WebSocket upgrade), and closes. This keeps every layer
//! honest about ownership: the request owns the read half, the response
//! owns the write half.
//!
//! ### Explicit Continuation Signals
//!
//! Middleware yields the request/response pair back with
//! `Ok(Flow::Next)`, `Ok(Flow::Halt)`, or `Err(_)`. Errors jump over
//! normal middleware to the nearest error middleware; a sent response
//! always stops the chain. Nothing is implicit except the sent check.
//!
//! ### Admission Before Accept
//!
//! The server acquires a semaphore permit before calling `accept`, so a
//! saturated server backs pressure into the kernel listen queue instead
//! of spawning unbounded tasks.

pub mod app;
pub mod builtin;
pub mod connection;
pub mod http;
pub mod routing;
pub mod ws;

// Re-export commonly used types for convenience
pub use app::{App, AppConfig, Server};
pub use connection::{handle_connection, ConnectionStats};
pub use http::{Headers, Method, Payload, Request, Response};
pub use routing::{DispatchError, Flow, Middleware, Router, Step};
pub use ws::UpgradeRegistry;

/// The default port the demo server listens on (same as Express)
pub const DEFAULT_PORT: u16 = 3000;

/// The default host the demo server binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of Expresso
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
