use std::fmt;
use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::error::Result;

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Opaque identity of one TCP session.
///
/// Ids are handed out by [`crate::SwitchListener`] in accept order and are never
/// reused for the lifetime of the listener. A switch that reconnects gets a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// An accepted switch session.
pub struct SwitchStream {
    id: ConnectionId,
    peer: SocketAddr,
    inner: TcpStream,
}

impl SwitchStream {
    pub(crate) fn new(id: ConnectionId, peer: SocketAddr, inner: TcpStream) -> Self {
        Self { id, peer, inner }
    }

    /// Connection id assigned at accept time.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address of the switch.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Split into independently owned read and write halves so the reactor and the
    /// outbound writer can run as separate tasks.
    pub fn into_split(self) -> (SwitchReader, SwitchWriter) {
        let _ = self.inner.set_nodelay(true);
        let (read, write) = self.inner.into_split();
        (
            SwitchReader {
                inner: read,
                buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            },
            SwitchWriter { inner: write },
        )
    }
}

impl fmt::Debug for SwitchStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwitchStream")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish()
    }
}

/// Read half of a switch session. Yields raw, unframed byte chunks.
pub struct SwitchReader {
    inner: OwnedReadHalf,
    buf: BytesMut,
}

impl SwitchReader {
    /// Read the next chunk of bytes as they arrived on the socket.
    ///
    /// Returns `Ok(None)` once the peer closed its side.
    pub async fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        self.buf.reserve(READ_CHUNK_SIZE);
        let read = self.inner.read_buf(&mut self.buf).await?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(self.buf.split().freeze()))
    }
}

/// Write half of a switch session.
pub struct SwitchWriter {
    inner: OwnedWriteHalf,
}

impl SwitchWriter {
    /// Write all of `data` and flush.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Shut down the write direction; the peer observes EOF.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }

    /// Borrow the underlying tokio write half.
    pub fn get_mut(&mut self) -> &mut OwnedWriteHalf {
        &mut self.inner
    }

    /// Unwrap into the tokio write half, e.g. to hand it to a frame writer.
    pub fn into_inner(self) -> OwnedWriteHalf {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_display() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn-7");
        assert_eq!(ConnectionId::new(7).get(), 7);
    }

    #[test]
    fn connection_ids_order_by_value() {
        assert!(ConnectionId::new(1) < ConnectionId::new(2));
    }
}
