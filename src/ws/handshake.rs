//! WebSocket Opening Handshake (RFC 6455 §4)
//!
//! Only the opening handshake lives here: detecting an upgrade request,
//! computing the accept key, and sending the `101 Switching Protocols`
//! response. Framing after the upgrade is out of scope; the upgraded
//! socket is parked in the [`registry`](crate::ws::registry) for whatever
//! owns it next.

use crate::http::{Request, Response, ResponseError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};
use thiserror::Error;

/// The GUID every server concatenates to the client key (RFC 6455 §1.3).
const WS_MAGIC_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Errors raised during the opening handshake.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The upgrade request carried no `Sec-WebSocket-Key` header.
    #[error("upgrade request missing Sec-WebSocket-Key")]
    MissingKey,

    /// The handshake response could not be written.
    #[error("failed to send handshake response: {0}")]
    Send(#[from] ResponseError),
}

/// Computes the `Sec-WebSocket-Accept` value for a client key:
/// base64(sha1(key ++ magic GUID)).
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_MAGIC_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Whether a request asks for a WebSocket upgrade.
///
/// Requires `Connection: Upgrade` and `Upgrade: websocket`, both
/// compared case-insensitively. The `Connection` header may carry a
/// comma-separated list.
pub fn is_upgrade_request(req: &Request) -> bool {
    let connection_upgrade = req
        .header("connection")
        .map(|v| {
            v.split(',')
                .any(|part| part.trim().eq_ignore_ascii_case("upgrade"))
        })
        .unwrap_or(false);
    let upgrade_websocket = req
        .header("upgrade")
        .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    connection_upgrade && upgrade_websocket
}

/// The handshake state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    /// Upgrade requested, 101 not yet sent.
    Pending,
    /// The 101 response has gone out; the socket now speaks WebSocket.
    Upgraded,
}

impl Handshake {
    /// Performs the server side of the opening handshake.
    ///
    /// Validates the client key, sends the `101 Switching Protocols`
    /// response, and transitions to [`Handshake::Upgraded`]. A missing
    /// key is a handshake error; the caller answers with a 400 and
    /// closes.
    pub async fn perform(
        self,
        req: &Request,
        res: &mut Response,
    ) -> Result<Handshake, HandshakeError> {
        let key = req
            .header("sec-websocket-key")
            .ok_or(HandshakeError::MissingKey)?;
        let accept = accept_key(key.trim());

        res.status(101)
            .set("Upgrade", "WebSocket")
            .set("Connection", "Upgrade")
            .set("Sec-WebSocket-Accept", accept);
        res.end().await?;

        Ok(Handshake::Upgraded)
    }
}
