//! The controller core: shared state and the operations every connection goes through.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use ofcore_codec::{
    FlowStatsRequest, Message, MessageCodec, MessageType, MultipartRequestBody, OfpMessage,
};
use ofcore_frame::Header;
use ofcore_transport::ConnectionId;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::ControllerConfig;
use crate::connection::{Connection, ConnectionState, Outbound, ProtocolState};
use crate::error::{ControllerError, Result};
use crate::events::{Event, EventBus};
use crate::priority::priority_of;
use crate::sequencing::SequenceGuard;
use crate::stats::{PollDecision, StatKind, StatsCorrelator};
use crate::switch::SwitchRegistry;

pub(crate) struct ControllerInner {
    pub(crate) config: ControllerConfig,
    pub(crate) codec: MessageCodec,
    pub(crate) bus: EventBus,
    pub(crate) switches: SwitchRegistry,
    pub(crate) guard: SequenceGuard,
    pub(crate) stats: StatsCorrelator,
    connections: Mutex<HashMap<ConnectionId, Arc<Connection>>>,
    next_xid: AtomicU32,
}

/// Handle to the controller core. Cheap to clone.
#[derive(Clone)]
pub struct Controller {
    pub(crate) inner: Arc<ControllerInner>,
}

impl Controller {
    /// Validate `config` and build a controller with the default codec.
    pub fn new(config: ControllerConfig) -> Result<Self> {
        Self::with_codec(config, MessageCodec::new())
    }

    /// Build a controller around `codec`, e.g. one carrying experimenter decoders.
    pub fn with_codec(config: ControllerConfig, codec: MessageCodec) -> Result<Self> {
        config.validate()?;
        let inner = ControllerInner {
            bus: EventBus::new(config.event_channel_capacity),
            guard: SequenceGuard::new(config.skip_late_interface_updates),
            stats: StatsCorrelator::new(config.stats_request_skip),
            switches: SwitchRegistry::new(),
            codec,
            connections: Mutex::new(HashMap::new()),
            next_xid: AtomicU32::new(1),
            config,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn codec(&self) -> &MessageCodec {
        &self.inner.codec
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Shorthand for `events().subscribe(pattern)`.
    pub fn subscribe(&self, pattern: &str) -> mpsc::Receiver<Arc<Event>> {
        self.inner.bus.subscribe(pattern)
    }

    pub fn switches(&self) -> &SwitchRegistry {
        &self.inner.switches
    }

    pub fn sequence_guard(&self) -> &SequenceGuard {
        &self.inner.guard
    }

    pub fn stats(&self) -> &StatsCorrelator {
        &self.inner.stats
    }

    /// Fresh transaction id. Never 0.
    pub fn next_xid(&self) -> u32 {
        loop {
            let xid = self.inner.next_xid.fetch_add(1, Ordering::Relaxed);
            if xid != 0 {
                return xid;
            }
        }
    }

    /// Track a freshly accepted session.
    pub fn register_connection(&self, id: ConnectionId, peer: SocketAddr) -> Arc<Connection> {
        let conn = Arc::new(Connection::new(id, peer));
        self.lock_connections().insert(id, Arc::clone(&conn));
        debug!(connection = %id, %peer, "connection registered");
        conn
    }

    pub fn connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.lock_connections().get(&id).cloned()
    }

    /// Live connections, ordered by id.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        let mut conns: Vec<Arc<Connection>> = self.lock_connections().values().cloned().collect();
        conns.sort_by_key(|c| c.id());
        conns
    }

    /// Connection currently bound to `dpid`.
    pub fn connection_for(&self, dpid: u64) -> Option<Arc<Connection>> {
        let id = self.inner.switches.connection_of(dpid)?;
        self.connection(id)
    }

    fn lock_connections(&self) -> std::sync::MutexGuard<'_, HashMap<ConnectionId, Arc<Connection>>> {
        self.inner
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `message` on `conn` under a fresh xid, encoded with the negotiated version.
    pub fn send(&self, conn: &Connection, message: Message) -> Result<u32> {
        let xid = self.next_xid();
        self.send_with_xid(conn, xid, message)?;
        Ok(xid)
    }

    /// Queue `message` on `conn` under `xid`.
    pub fn send_with_xid(&self, conn: &Connection, xid: u32, message: Message) -> Result<()> {
        let version = conn
            .version()
            .ok_or(ControllerError::NotNegotiated(conn.id()))?;
        self.enqueue(conn, version, xid, message)
    }

    /// Queue `message` on the connection bound to `dpid`.
    pub fn send_to(&self, dpid: u64, message: Message) -> Result<u32> {
        let conn = self
            .connection_for(dpid)
            .ok_or(ControllerError::UnknownSwitch(dpid))?;
        self.send(&conn, message)
    }

    pub(crate) fn enqueue(
        &self,
        conn: &Connection,
        version: u8,
        xid: u32,
        message: Message,
    ) -> Result<()> {
        if conn.is_closed() {
            return Err(ControllerError::ConnectionClosed(conn.id()));
        }
        let data = self.inner.codec.encode(version, xid, &message)?;
        let priority = priority_of(message.msg_type());
        debug!(
            connection = %conn.id(),
            version,
            xid,
            msg_type = message.msg_type().wire_name(version),
            priority,
            "message queued"
        );
        conn.outbound.push(priority, version, xid, message, data);
        Ok(())
    }

    /// Called by the writer after `item` reached the socket.
    pub async fn on_message_sent(&self, conn: &Arc<Connection>, item: Outbound) {
        let msg_type = item.message.msg_type();
        match Header::parse(&item.data) {
            Ok(header) => {
                let message = Arc::new(OfpMessage {
                    header,
                    message: item.message,
                });
                self.inner
                    .bus
                    .publish(Event::MessageOut {
                        connection: conn.id(),
                        dpid: conn.dpid(),
                        message,
                    })
                    .await;
            }
            Err(err) => warn!(connection = %conn.id(), error = %err, "sent frame has no header"),
        }

        match msg_type {
            MessageType::FeaturesRequest => {
                let mut inner = conn.inner.lock().await;
                if inner.protocol_state == ProtocolState::SendingFeatures {
                    inner.protocol_state = ProtocolState::WaitingFeaturesReply;
                    debug!(connection = %conn.id(), "features request sent");
                    if !inner.remaining_data.is_empty() {
                        self.process_buffer(conn, &mut inner).await;
                    }
                }
            }
            MessageType::EchoReply if self.inner.config.send_features_request_on_echo => {
                if let Err(err) = self.send(conn, Message::FeaturesRequest) {
                    debug!(connection = %conn.id(), error = %err, "features request after echo not sent");
                }
            }
            _ => {}
        }
    }

    /// Publish a connection error and close `conn`.
    pub async fn fail_connection(&self, conn: &Connection, reason: String) {
        conn.mark_failed();
        self.inner
            .bus
            .publish(Event::ConnectionError {
                connection: conn.id(),
                dpid: conn.dpid(),
                reason,
            })
            .await;
        conn.close();
    }

    /// Forget `conn` once both of its tasks finished.
    ///
    /// Per-switch stats and sequence state are dropped only if `conn` was still the
    /// connection bound to its switch.
    pub async fn connection_closed(&self, conn: &Connection) {
        conn.close();
        conn.mark_failed();
        {
            let mut inner = conn.inner.lock().await;
            inner.state = ConnectionState::Failed;
            inner.remaining_data.clear();
        }
        self.lock_connections().remove(&conn.id());

        let dpid = conn.dpid();
        if let Some(dpid) = dpid {
            if self.inner.switches.unbind(dpid, conn.id()) {
                self.inner.stats.reset(dpid);
                self.inner.guard.reset(dpid);
            }
        }
        info!(connection = %conn.id(), dpid = ?dpid.map(|d| format!("{d:016x}")), "connection closed");
        self.inner
            .bus
            .publish(Event::ConnectionClosed {
                connection: conn.id(),
                dpid,
            })
            .await;
    }

    /// Issue a round of flow, port and (if supported) table stats requests to `dpid`.
    ///
    /// Returns the issued `(kind, xid)` pairs; empty when the poll was skipped because
    /// earlier requests are still outstanding.
    pub async fn request_stats(&self, dpid: u64) -> Result<Vec<(StatKind, u32)>> {
        let conn = self
            .connection_for(dpid)
            .filter(|c| c.is_established())
            .ok_or(ControllerError::UnknownSwitch(dpid))?;
        let table_capable = self
            .inner
            .switches
            .get(dpid)
            .is_some_and(|s| s.has_table_stats());

        let decision = self
            .inner
            .stats
            .begin_poll(dpid, table_capable, || self.next_xid());
        let issued = match decision {
            PollDecision::Skipped { skip_count } => {
                info!(
                    dpid = %format!("{dpid:016x}"),
                    skip_count,
                    "previous stats request still pending, skipping poll"
                );
                return Ok(Vec::new());
            }
            PollDecision::Issue(issued) => issued,
        };

        for (kind, xid) in &issued {
            let body = match kind {
                StatKind::Flows => MultipartRequestBody::Flow(FlowStatsRequest::default()),
                StatKind::Ports => MultipartRequestBody::all_port_stats(),
                StatKind::Tables => MultipartRequestBody::Table,
            };
            if let Err(err) = self.send_with_xid(&conn, *xid, Message::multipart_request(body)) {
                error!(
                    dpid = %format!("{dpid:016x}"),
                    kind = kind.as_str(),
                    xid,
                    error = %err,
                    "stats request not sent"
                );
                return Err(err);
            }
        }
        debug!(dpid = %format!("{dpid:016x}"), requests = issued.len(), "stats requested");
        Ok(issued)
    }

    /// Send an echo request carrying no data to every established switch.
    pub fn send_keepalives(&self) -> usize {
        let mut sent = 0;
        for conn in self.connections() {
            if !conn.is_established() {
                continue;
            }
            match self.send(&conn, Message::EchoRequest(Bytes::new())) {
                Ok(_) => sent += 1,
                Err(err) => {
                    debug!(connection = %conn.id(), error = %err, "keepalive not sent")
                }
            }
        }
        sent
    }

    /// Established switches as `(dpid, version)`.
    pub fn established_switches(&self) -> Vec<(u64, u8)> {
        self.connections()
            .into_iter()
            .filter(|c| c.is_established())
            .filter_map(|c| Some((c.dpid()?, c.version()?)))
            .collect()
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("config", &self.inner.config)
            .field("connections", &self.lock_connections().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40000))
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ControllerConfig::default().with_supported_versions(&[]);
        assert!(matches!(
            Controller::new(config),
            Err(ControllerError::Config(_))
        ));
    }

    #[test]
    fn xids_are_unique_and_nonzero() {
        let controller = Controller::new(ControllerConfig::default()).unwrap();
        let a = controller.next_xid();
        let b = controller.next_xid();
        assert_ne!(a, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn send_requires_negotiated_version() {
        let controller = Controller::new(ControllerConfig::default()).unwrap();
        let conn = controller.register_connection(ConnectionId::new(1), peer());
        let err = controller.send(&conn, Message::BarrierRequest).unwrap_err();
        assert!(matches!(err, ControllerError::NotNegotiated(_)));
    }

    #[test]
    fn send_on_closed_connection_fails() {
        let controller = Controller::new(ControllerConfig::default()).unwrap();
        let conn = controller.register_connection(ConnectionId::new(1), peer());
        conn.set_version(4);
        conn.close();
        let err = controller.send(&conn, Message::BarrierRequest).unwrap_err();
        assert!(matches!(err, ControllerError::ConnectionClosed(_)));
    }

    #[test]
    fn send_to_unknown_switch_fails() {
        let controller = Controller::new(ControllerConfig::default()).unwrap();
        assert!(matches!(
            controller.send_to(9, Message::BarrierRequest),
            Err(ControllerError::UnknownSwitch(9))
        ));
    }

    #[tokio::test]
    async fn closing_stale_connection_keeps_switch_state() {
        let controller = Controller::new(ControllerConfig::default()).unwrap();
        let old = controller.register_connection(ConnectionId::new(1), peer());
        let new = controller.register_connection(ConnectionId::new(2), peer());
        old.set_dpid(1);
        new.set_dpid(1);
        controller.switches().get_or_create(1, 4, old.id());
        controller.switches().get_or_create(1, 4, new.id());
        controller.sequence_guard().record(1, 10);

        controller.connection_closed(&old).await;
        assert_eq!(controller.sequence_guard().seq_of(1, 10), 1);
        assert_eq!(controller.switches().connection_of(1), Some(new.id()));
        assert!(controller.connection(old.id()).is_none());

        controller.connection_closed(&new).await;
        assert_eq!(controller.sequence_guard().seq_of(1, 10), 0);
        assert_eq!(controller.switches().connection_of(1), None);
    }
}
