//! Upgraded-Socket Registry
//!
//! After a successful opening handshake the connection stops speaking
//! HTTP. The reunited `TcpStream` is parked here so whatever implements
//! framing can claim it; this module never removes entries on its own.
//!
//! The registry is injected into the application and shared via `Arc`
//! rather than living in a process-global, so tests can run isolated
//! instances side by side.

use std::sync::Mutex;
use tokio::net::TcpStream;

/// Holds sockets that completed the WebSocket opening handshake.
#[derive(Debug, Default)]
pub struct UpgradeRegistry {
    sockets: Mutex<Vec<TcpStream>>,
}

impl UpgradeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // The list stays consistent even if a holder panicked mid-push, so
    // a poisoned lock is recovered rather than cascading the panic into
    // every later upgrade.
    fn sockets(&self) -> std::sync::MutexGuard<'_, Vec<TcpStream>> {
        self.sockets.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Parks an upgraded socket.
    pub fn register(&self, stream: TcpStream) {
        self.sockets().push(stream);
    }

    /// Number of sockets currently parked.
    pub fn len(&self) -> usize {
        self.sockets().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains all parked sockets, handing ownership to the caller.
    pub fn drain(&self) -> Vec<TcpStream> {
        std::mem::take(&mut *self.sockets())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_register_and_len() {
        let registry = UpgradeRegistry::new();
        assert!(registry.is_empty());

        let (_client, server) = connected_pair().await;
        registry.register(server);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_drain_empties_the_registry() {
        let registry = UpgradeRegistry::new();
        let (_c1, s1) = connected_pair().await;
        let (_c2, s2) = connected_pair().await;
        registry.register(s1);
        registry.register(s2);

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
    }
}
