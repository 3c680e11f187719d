//! Per-connection state and the outbound priority queue.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

use bytes::{Bytes, BytesMut};
use ofcore_codec::Message;
use ofcore_transport::ConnectionId;
use tokio::sync::Notify;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Lifecycle of a switch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    SettingUp,
    Established,
    Failed,
}

/// Position in the hello / features exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    AwaitingHello,
    SendingFeatures,
    WaitingFeaturesReply,
    HandshakeComplete,
    HelloFailed,
}

impl ProtocolState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingHello => "awaiting_hello",
            Self::SendingFeatures => "sending_features",
            Self::WaitingFeaturesReply => "waiting_features_reply",
            Self::HandshakeComplete => "handshake_complete",
            Self::HelloFailed => "hello_failed",
        }
    }
}

/// State mutated only under the connection lock.
#[derive(Debug)]
pub(crate) struct ConnectionInner {
    pub(crate) state: ConnectionState,
    pub(crate) protocol_state: ProtocolState,
    /// Bytes of a trailing frame that has not fully arrived, preceded by any frames
    /// deferred during setup.
    pub(crate) remaining_data: BytesMut,
}

/// One encoded message waiting for the writer.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub priority: i32,
    seq: u64,
    pub version: u8,
    pub xid: u32,
    pub message: Message,
    /// Complete encoded frame.
    pub data: Bytes,
}

impl PartialEq for Outbound {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Outbound {}

impl PartialOrd for Outbound {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Outbound {
    // BinaryHeap pops the greatest element: lowest priority value, then oldest.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Outbound>,
    next_seq: u64,
}

/// Lower priority values leave first; equal priorities leave in push order.
#[derive(Default)]
pub(crate) struct OutboundQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl OutboundQueue {
    pub(crate) fn push(&self, priority: i32, version: u8, xid: u32, message: Message, data: Bytes) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let seq = state.next_seq;
            state.next_seq += 1;
            state.heap.push(Outbound {
                priority,
                seq,
                version,
                xid,
                message,
                data,
            });
        }
        self.notify.notify_one();
    }

    pub(crate) fn try_pop(&self) -> Option<Outbound> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .heap
            .pop()
    }

    pub(crate) fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .heap
            .len()
    }

    pub(crate) async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// A switch session.
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    pub(crate) inner: tokio::sync::Mutex<ConnectionInner>,
    pub(crate) outbound: OutboundQueue,
    closed: CancellationToken,
    version: OnceLock<u8>,
    dpid: OnceLock<u64>,
    established: AtomicBool,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, peer: SocketAddr) -> Self {
        Self {
            id,
            peer,
            inner: tokio::sync::Mutex::new(ConnectionInner {
                state: ConnectionState::New,
                protocol_state: ProtocolState::AwaitingHello,
                remaining_data: BytesMut::new(),
            }),
            outbound: OutboundQueue::default(),
            closed: CancellationToken::new(),
            version: OnceLock::new(),
            dpid: OnceLock::new(),
            established: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Negotiated version; fixed once set.
    pub fn version(&self) -> Option<u8> {
        self.version.get().copied()
    }

    /// Datapath id learned from the features reply.
    pub fn dpid(&self) -> Option<u64> {
        self.dpid.get().copied()
    }

    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::Acquire)
    }

    /// Ask the writer to drain what is queued and shut the socket.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once [`close`](Self::close) was called.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    /// Current `(state, protocol_state)`.
    pub async fn states(&self) -> (ConnectionState, ProtocolState) {
        let inner = self.inner.lock().await;
        (inner.state, inner.protocol_state)
    }

    /// Number of messages waiting for the writer.
    pub fn queued(&self) -> usize {
        self.outbound.len()
    }

    /// Pop the next message the writer would send.
    pub fn pop_outbound(&self) -> Option<Outbound> {
        self.outbound.try_pop()
    }

    /// Pop everything queued, in send order.
    pub fn drain_outbound(&self) -> Vec<Outbound> {
        std::iter::from_fn(|| self.outbound.try_pop()).collect()
    }

    pub(crate) fn set_version(&self, version: u8) -> bool {
        self.version.set(version).is_ok()
    }

    pub(crate) fn set_dpid(&self, dpid: u64) -> bool {
        self.dpid.set(dpid).is_ok() || self.dpid() == Some(dpid)
    }

    pub(crate) fn mark_established(&self) {
        self.established.store(true, Ordering::Release);
    }

    pub(crate) fn mark_failed(&self) {
        self.established.store(false, Ordering::Release);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("version", &self.version())
            .field("dpid", &self.dpid())
            .field("established", &self.is_established())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> Connection {
        Connection::new(ConnectionId::new(1), SocketAddr::from(([127, 0, 0, 1], 40000)))
    }

    fn push(queue: &OutboundQueue, priority: i32, xid: u32) {
        queue.push(priority, 4, xid, Message::BarrierRequest, Bytes::new());
    }

    #[test]
    fn queue_orders_by_priority_then_fifo() {
        let queue = OutboundQueue::default();
        push(&queue, 1000, 1);
        push(&queue, -1100, 2);
        push(&queue, 0, 3);
        push(&queue, -1100, 4);
        push(&queue, 0, 5);

        let order: Vec<u32> = std::iter::from_fn(|| queue.try_pop()).map(|o| o.xid).collect();
        assert_eq!(order, vec![2, 4, 3, 5, 1]);
    }

    #[test]
    fn version_is_set_once() {
        let conn = connection();
        assert_eq!(conn.version(), None);
        assert!(conn.set_version(4));
        assert!(!conn.set_version(1));
        assert_eq!(conn.version(), Some(4));
    }

    #[test]
    fn dpid_can_be_confirmed_but_not_changed() {
        let conn = connection();
        assert!(conn.set_dpid(1));
        assert!(conn.set_dpid(1));
        assert!(!conn.set_dpid(2));
        assert_eq!(conn.dpid(), Some(1));
    }

    #[tokio::test]
    async fn new_connection_awaits_hello() {
        let conn = connection();
        assert_eq!(
            conn.states().await,
            (ConnectionState::New, ProtocolState::AwaitingHello)
        );
        assert!(!conn.is_established());
    }

    #[tokio::test]
    async fn close_resolves_waiters() {
        let conn = connection();
        assert!(!conn.is_closed());
        conn.close();
        conn.closed().await;
        assert!(conn.is_closed());
    }
}
