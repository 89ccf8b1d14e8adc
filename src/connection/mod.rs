//! Connection Handling Module
//!
//! This module owns the life of a TCP connection: the length-bounded
//! body/header stream adapter, and the per-connection task that reads one
//! request, dispatches it, and guarantees exactly one response.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                   (app::Server)                             │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Read headers│───>│ Build req   │───>│ Dispatch or │      │
//! │  │ (BodyReader)│    │             │    │ WS upgrade  │      │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Send resp   │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Async I/O**: Tokio split-socket reads and writes, never blocking
//! - **Bounded bodies**: Content-Length caps what a handler can read
//! - **Isolation**: one task per connection; a panic ends only that task
//! - **Statistics**: connection and request counters as shared atomics
//!
//! ## Example
//!
//! ```ignore
//! use expresso::connection::{handle_connection, ConnectionStats};
//! use std::sync::Arc;
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, router, registry, stats));
//! ```

pub mod body;
pub mod handler;

// Re-export commonly used types
pub use body::{BodyReader, BodyStream, MAX_LINE_BYTES};
pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
