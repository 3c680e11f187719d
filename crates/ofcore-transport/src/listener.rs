use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::{ConnectionId, SwitchStream};

/// Listens for switch connections on a TCP address.
///
/// Every accepted session gets a fresh [`ConnectionId`].
pub struct SwitchListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    next_id: AtomicU64,
}

impl SwitchListener {
    /// Default OpenFlow listening port (IANA).
    pub const DEFAULT_PORT: u16 = 6653;

    /// Bind and listen on `addr`. Port 0 picks an ephemeral port.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;

        info!(%local_addr, "listening for switches");

        Ok(Self {
            listener,
            local_addr,
            next_id: AtomicU64::new(1),
        })
    }

    /// Accept the next switch session.
    pub async fn accept(&self) -> Result<SwitchStream> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(connection = %id, %peer, "accepted switch connection");
        Ok(SwitchStream::new(id, peer, stream))
    }

    /// Connect to a listening controller, as a switch would.
    ///
    /// The returned stream carries id 0; only accepted sessions get real ids.
    pub async fn connect(addr: SocketAddr) -> Result<SwitchStream> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| TransportError::Connect { addr, source })?;
        debug!(%addr, "connected to controller");
        Ok(SwitchStream::new(ConnectionId::new(0), addr, stream))
    }

    /// The bound local address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    #[tokio::test]
    async fn accept_assigns_sequential_ids() {
        let listener = SwitchListener::bind(loopback()).await.unwrap();
        let addr = listener.local_addr();

        let _c1 = SwitchListener::connect(addr).await.unwrap();
        let first = listener.accept().await.unwrap();
        let _c2 = SwitchListener::connect(addr).await.unwrap();
        let second = listener.accept().await.unwrap();

        assert_eq!(first.id(), ConnectionId::new(1));
        assert_eq!(second.id(), ConnectionId::new(2));
    }

    #[tokio::test]
    async fn chunks_flow_between_halves() {
        let listener = SwitchListener::bind(loopback()).await.unwrap();
        let client = SwitchListener::connect(listener.local_addr()).await.unwrap();
        let server = listener.accept().await.unwrap();

        let (_client_reader, mut client_writer) = client.into_split();
        let (mut server_reader, _server_writer) = server.into_split();

        client_writer.write_all(b"\x04\x00\x00\x08").await.unwrap();
        let chunk = server_reader.read_chunk().await.unwrap().unwrap();
        assert_eq!(chunk.as_ref(), b"\x04\x00\x00\x08");
    }

    #[tokio::test]
    async fn read_chunk_reports_eof() {
        let listener = SwitchListener::bind(loopback()).await.unwrap();
        let client = SwitchListener::connect(listener.local_addr()).await.unwrap();
        let server = listener.accept().await.unwrap();

        let (_client_reader, mut client_writer) = client.into_split();
        client_writer.shutdown().await.unwrap();

        let (mut server_reader, _server_writer) = server.into_split();
        assert!(server_reader.read_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let first = SwitchListener::bind(loopback()).await.unwrap();
        let err = SwitchListener::bind(first.local_addr())
            .await
            .err()
            .expect("second bind should fail");
        assert!(matches!(err, TransportError::Bind { .. }));
    }
}
