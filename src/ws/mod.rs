//! WebSocket Upgrade Path
//!
//! This module handles the opening handshake that moves a connection
//! from HTTP to WebSocket, and the registry that parks upgraded sockets.
//!
//! ## Scope
//!
//! Only the handshake is implemented. Frame encoding/decoding, ping/pong,
//! and close negotiation are deliberately absent; an upgraded socket is
//! reunited into a whole `TcpStream` and handed to the registry for a
//! framing layer to claim.
//!
//! ## Modules
//!
//! - `handshake`: upgrade detection, accept-key computation, the 101
//!   response, and the `Pending -> Upgraded` state machine
//! - `registry`: shared list of upgraded sockets
//!
//! ## Example
//!
//! ```ignore
//! use expresso::ws::{is_upgrade_request, Handshake};
//!
//! if is_upgrade_request(&req) {
//!     let state = Handshake::Pending.perform(&req, &mut res).await?;
//! }
//! ```

pub mod handshake;
pub mod registry;

// Re-export commonly used types
pub use handshake::{accept_key, is_upgrade_request, Handshake, HandshakeError};
pub use registry::UpgradeRegistry;
