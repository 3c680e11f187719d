//! Per-connection byte processing.
//!
//! Everything here runs under the connection's lock, so frames of one connection are
//! handled strictly in arrival order while different connections proceed in parallel.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use ofcore_codec::{Message, MultipartReplyBody, OfpMessage};
use ofcore_frame::{slice, Frame, Sliced};
use tracing::{debug, error, warn};

use crate::connection::{Connection, ConnectionInner, ConnectionState, ProtocolState};
use crate::controller::Controller;
use crate::events::Event;
use crate::stats::{FragmentOutcome, StatsBatch};

/// Multipart replies of one batch, grouped by xid in first-seen order.
#[derive(Default)]
struct MultipartGroups {
    groups: Vec<(u32, Vec<OfpMessage>)>,
}

impl MultipartGroups {
    fn push(&mut self, message: OfpMessage) {
        let xid = message.xid();
        match self.groups.iter_mut().find(|(x, _)| *x == xid) {
            Some((_, group)) => group.push(message),
            None => self.groups.push((xid, vec![message])),
        }
    }
}

impl Controller {
    /// Feed bytes read from `conn`'s socket.
    pub async fn handle_data(&self, conn: &Arc<Connection>, data: Bytes) {
        if let Some(dpid) = conn.dpid() {
            self.inner.switches.touch(dpid);
        }
        let mut inner = conn.inner.lock().await;
        inner.remaining_data.extend_from_slice(&data);
        self.process_buffer(conn, &mut inner).await;
    }

    /// Run batches until no deferred frame is waiting on a completed handshake.
    pub(crate) async fn process_buffer(&self, conn: &Arc<Connection>, inner: &mut ConnectionInner) {
        while self.run_batch(conn, inner).await {
            debug!(connection = %conn.id(), "replaying frames deferred during setup");
        }
    }

    /// Returns `true` when the batch should be replayed at once.
    async fn run_batch(&self, conn: &Arc<Connection>, inner: &mut ConnectionInner) -> bool {
        let buffer = std::mem::take(&mut inner.remaining_data).freeze();
        let Sliced { frames, leftover } = slice(buffer);
        inner.remaining_data = BytesMut::from(leftover.as_ref());
        if frames.is_empty() {
            return false;
        }

        let mut deferred: Vec<Frame> = Vec::new();
        let mut multipart = MultipartGroups::default();
        let mut handshake_completed = false;

        for frame in frames {
            if conn.is_closed() {
                return false;
            }
            // Frames behind the handshake-completing reply wait for the replay, after
            // the ones deferred ahead of it.
            if handshake_completed {
                deferred.push(frame);
                continue;
            }

            if inner.state == ConnectionState::New {
                if !self.negotiate(conn, inner, &frame).await {
                    return false;
                }
                continue;
            }

            let message = match self.inner.codec.decode(&frame) {
                Ok(message) => message,
                Err(err) => {
                    error!(
                        connection = %conn.id(),
                        version = frame.version(),
                        error = %err,
                        "failed to decode message"
                    );
                    inner.state = ConnectionState::Failed;
                    self.fail_connection(conn, format!("decode failure: {err}"))
                        .await;
                    return false;
                }
            };

            if let Some(dpid) = conn.dpid() {
                if matches!(
                    message.message,
                    Message::MultipartReply(_) | Message::PortStatus(_)
                ) {
                    self.inner.guard.record(dpid, message.xid());
                }
            }
            if let Message::Error(err) = &message.message {
                error!(
                    connection = %conn.id(),
                    dpid = ?conn.dpid().map(|d| format!("{d:016x}")),
                    err_type = err.err_type,
                    code = err.code,
                    xid = message.xid(),
                    "switch reported error"
                );
            }
            debug!(
                connection = %conn.id(),
                version = message.version(),
                msg_type = message.type_name(),
                xid = message.xid(),
                "message in"
            );

            let awaited = matches!(message.message, Message::FeaturesReply(_))
                && inner.protocol_state == ProtocolState::WaitingFeaturesReply;
            if inner.state == ConnectionState::SettingUp && !awaited {
                deferred.push(frame);
                continue;
            }

            if matches!(message.message, Message::MultipartReply(_)) {
                multipart.push(message);
                continue;
            }

            let message = Arc::new(message);
            self.publish_in(conn, Arc::clone(&message)).await;
            if self.dispatch(conn, inner, &message).await {
                handshake_completed = true;
            }
        }

        let replay = handshake_completed && !deferred.is_empty();
        if !deferred.is_empty() {
            let mut buffer = BytesMut::new();
            for frame in &deferred {
                buffer.extend_from_slice(frame.as_bytes());
            }
            buffer.extend_from_slice(&inner.remaining_data);
            inner.remaining_data = buffer;
        }

        self.process_multipart(conn, multipart).await;
        replay && !conn.is_closed()
    }

    async fn publish_in(&self, conn: &Connection, message: Arc<OfpMessage>) {
        self.inner
            .bus
            .publish(Event::MessageIn {
                connection: conn.id(),
                dpid: conn.dpid(),
                message,
            })
            .await;
    }

    /// Returns `true` when the message completed the handshake.
    async fn dispatch(
        &self,
        conn: &Connection,
        inner: &mut ConnectionInner,
        message: &OfpMessage,
    ) -> bool {
        match &message.message {
            Message::FeaturesReply(features) => {
                return self
                    .on_features_reply(conn, inner, message.xid(), features)
                    .await;
            }
            Message::PortStatus(status) => match conn.dpid() {
                Some(dpid) => {
                    self.handle_port_status(dpid, message.xid(), status).await;
                    self.inner.guard.forget(dpid, message.xid());
                }
                None => debug!(connection = %conn.id(), "port status before handshake"),
            },
            Message::PacketIn(packet) => match conn.dpid() {
                Some(dpid) => self.handle_packet_in(dpid, packet).await,
                None => debug!(connection = %conn.id(), "packet-in before handshake"),
            },
            Message::EchoRequest(data) => {
                if let Err(err) =
                    self.send_with_xid(conn, message.xid(), Message::EchoReply(data.clone()))
                {
                    warn!(connection = %conn.id(), error = %err, "echo reply not sent");
                }
            }
            _ => {}
        }
        false
    }

    async fn process_multipart(&self, conn: &Connection, multipart: MultipartGroups) {
        for (_, group) in multipart.groups {
            for message in group {
                if let Some(dpid) = conn.dpid() {
                    self.handle_multipart_reply(dpid, &message).await;
                    if matches!(&message.message, Message::MultipartReply(r) if !r.more()) {
                        self.inner.guard.forget(dpid, message.xid());
                    }
                }
                self.publish_in(conn, Arc::new(message)).await;
            }
        }
    }

    async fn handle_multipart_reply(&self, dpid: u64, message: &OfpMessage) {
        let Message::MultipartReply(reply) = &message.message else {
            return;
        };
        let xid = message.xid();

        match &reply.body {
            MultipartReplyBody::PortDesc(ports) => {
                self.apply_port_descs(dpid, xid, ports).await;
                return;
            }
            MultipartReplyBody::Desc(desc) => {
                if let Err(err) = self.inner.switches.set_description(dpid, desc.clone()) {
                    warn!(error = %err, "description for unknown switch");
                }
                return;
            }
            _ => {}
        }

        let batch = match self.inner.stats.on_fragment(dpid, xid, reply) {
            FragmentOutcome::Complete(batch) => batch,
            FragmentOutcome::Pending => return,
            FragmentOutcome::NotOurs => {
                debug!(
                    dpid = %format!("{dpid:016x}"),
                    xid,
                    kind = ?reply.kind(),
                    "uncorrelated multipart reply"
                );
                return;
            }
        };

        let event = match batch {
            StatsBatch::Flows(flows) => {
                let flows = Arc::new(flows);
                if let Err(err) = self.inner.switches.update_flows(dpid, flows.as_ref().clone()) {
                    error!(
                        dpid = %format!("{dpid:016x}"),
                        xid,
                        error = %err,
                        "failed to store flow stats"
                    );
                    return;
                }
                Event::FlowStatsReceived { dpid, flows }
            }
            StatsBatch::Tables(tables) => {
                if let Err(err) = self.inner.switches.update_tables(dpid, tables.clone()) {
                    error!(
                        dpid = %format!("{dpid:016x}"),
                        xid,
                        error = %err,
                        "failed to store table stats"
                    );
                    return;
                }
                Event::TableStatsReceived { dpid, tables }
            }
            StatsBatch::Ports(ports) => Event::PortStatsReceived { dpid, ports },
        };
        self.inner.bus.publish(event).await;
    }
}

#[cfg(test)]
mod tests {
    use ofcore_codec::types::{capabilities, ether_type, port_state, MULTIPART_MORE};
    use ofcore_codec::{
        FlowStats, MessageType, MultipartReply, PacketIn, PortDesc, PortReason, PortStats,
        PortStatus, TableStats,
    };

    use super::*;
    use crate::config::ControllerConfig;
    use crate::stats::StatKind;
    use crate::testing::{connect, encode, features, flush, handshake};

    const DPID: u64 = 1;

    fn sent_types(conn: &Connection) -> Vec<MessageType> {
        conn.drain_outbound()
            .into_iter()
            .map(|o| o.message.msg_type())
            .collect()
    }

    fn setup() -> (Controller, Arc<Connection>) {
        setup_with(ControllerConfig::default())
    }

    fn setup_with(config: ControllerConfig) -> (Controller, Arc<Connection>) {
        let controller = Controller::new(config).unwrap();
        let conn = connect(&controller, 1);
        (controller, conn)
    }

    async fn establish(controller: &Controller, conn: &Arc<Connection>, capabilities: u32) {
        handshake(controller, conn, 4, DPID, capabilities).await;
    }

    fn port_status(reason: PortReason, port_no: u32, state: u32) -> Message {
        Message::PortStatus(PortStatus {
            reason,
            desc: PortDesc {
                port_no,
                name: format!("eth{port_no}"),
                state,
                ..PortDesc::default()
            },
        })
    }

    fn packet_in(in_port: u32, src: [u8; 6], kind: u16) -> Message {
        let mut data = vec![0xff; 6];
        data.extend_from_slice(&src);
        data.extend_from_slice(&kind.to_be_bytes());
        data.extend_from_slice(&[0; 46]);
        Message::PacketIn(PacketIn {
            buffer_id: u32::MAX,
            total_len: data.len() as u16,
            in_port,
            data: Bytes::from(data),
            ..PacketIn::default()
        })
    }

    /// Multipart reply for `xid` on the established test switch.
    fn reply(xid: u32, body: MultipartReplyBody) -> Bytes {
        encode(4, xid, Message::MultipartReply(MultipartReply { flags: 0, body }))
    }

    fn issued_xid(issued: &[(StatKind, u32)], kind: StatKind) -> u32 {
        issued
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, xid)| *xid)
            .unwrap()
    }

    #[tokio::test]
    async fn hello_sends_hello_then_features_request() {
        let (controller, conn) = setup();
        controller
            .handle_data(&conn, encode(4, 7, Message::hello(&[1, 4])))
            .await;

        assert_eq!(conn.version(), Some(4));
        assert_eq!(
            conn.states().await,
            (ConnectionState::SettingUp, ProtocolState::SendingFeatures)
        );
        assert_eq!(
            sent_types(&conn),
            vec![MessageType::Hello, MessageType::FeaturesRequest]
        );
    }

    #[tokio::test]
    async fn incompatible_hello_fails_and_closes() {
        let (controller, conn) =
            setup_with(ControllerConfig::default().with_supported_versions(&[4]));
        let mut failed = controller.subscribe("ofcore.hello_failed");

        controller
            .handle_data(&conn, encode(1, 33, Message::hello(&[])))
            .await;

        let event = failed.recv().await.unwrap();
        assert!(matches!(
            *event,
            Event::HelloFailed {
                peer_version: 1,
                xid: 33,
                ..
            }
        ));
        assert!(conn.is_closed());
        assert_eq!(
            conn.states().await,
            (ConnectionState::Failed, ProtocolState::HelloFailed)
        );

        let sent = conn.drain_outbound();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].version, 4);
        assert_eq!(sent[0].xid, 33);
        assert!(matches!(
            &sent[0].message,
            Message::Error(err) if err.err_type == 0 && err.code == 0
        ));
    }

    #[tokio::test]
    async fn features_reply_before_request_sent_is_deferred() {
        let (controller, conn) = setup();
        let mut done = controller.subscribe("ofcore.handshake.completed");

        let mut data = BytesMut::new();
        data.extend_from_slice(&encode(4, 1, Message::hello(&[4])));
        data.extend_from_slice(&encode(4, 2, features(DPID, 0)));
        controller.handle_data(&conn, data.freeze()).await;

        assert_eq!(
            conn.states().await,
            (ConnectionState::SettingUp, ProtocolState::SendingFeatures)
        );
        assert!(done.try_recv().is_err());
        assert!(controller.switches().get(DPID).is_none());

        // Writing the features request replays the deferred reply.
        flush(&controller, &conn).await;
        assert_eq!(
            conn.states().await,
            (ConnectionState::Established, ProtocolState::HandshakeComplete)
        );
        assert!(done.try_recv().is_ok());
        assert_eq!(conn.dpid(), Some(DPID));
    }

    #[tokio::test]
    async fn handshake_requests_port_desc_desc_and_set_config() {
        let (controller, conn) = setup();
        controller
            .handle_data(&conn, encode(4, 1, Message::hello(&[1, 4])))
            .await;
        flush(&controller, &conn).await;
        controller
            .handle_data(&conn, encode(4, 2, features(DPID, 0)))
            .await;

        let sent = conn.drain_outbound();
        let kinds: Vec<_> = sent
            .iter()
            .map(|o| match &o.message {
                Message::MultipartRequest(req) => format!("{:?}", req.kind()),
                other => format!("{:?}", other.msg_type()),
            })
            .collect();
        assert_eq!(kinds, vec!["SetConfig", "PortDesc", "Desc"]);
        assert!(matches!(
            sent[0].message,
            Message::SetConfig(cfg) if cfg.flags == 0 && cfg.miss_send_len == 0xffff
        ));
        assert!(conn.is_established());
        assert_eq!(controller.switches().connection_of(DPID), Some(conn.id()));
    }

    #[tokio::test]
    async fn features_reply_when_established_only_refreshes() {
        let (controller, conn) = setup();
        establish(&controller, &conn, 0).await;
        let mut done = controller.subscribe("ofcore.handshake.completed");

        controller
            .handle_data(&conn, encode(4, 9, features(DPID, capabilities::TABLE_STATS)))
            .await;

        assert!(done.try_recv().is_err());
        assert!(conn.drain_outbound().is_empty());
        assert!(controller.switches().get(DPID).unwrap().has_table_stats());
    }

    #[tokio::test]
    async fn frames_before_hello_completion_are_replayed_in_order() {
        let (controller, conn) = setup();
        controller
            .handle_data(&conn, encode(4, 1, Message::hello(&[4])))
            .await;
        flush(&controller, &conn).await;
        let mut echoes = controller.subscribe("ofcore.v0x04.messages.in.ofpt_echo_request");

        let mut data = BytesMut::new();
        data.extend_from_slice(&encode(4, 40, Message::EchoRequest(Bytes::from_static(b"hi"))));
        data.extend_from_slice(&encode(4, 41, features(DPID, 0)));
        controller.handle_data(&conn, data.freeze()).await;

        let echo = echoes.recv().await.unwrap();
        assert_eq!(echo.dpid(), Some(DPID));
        let reply = conn
            .drain_outbound()
            .into_iter()
            .find(|o| o.message.msg_type() == MessageType::EchoReply)
            .unwrap();
        assert_eq!(reply.xid, 40);
        assert_eq!(reply.message, Message::EchoReply(Bytes::from_static(b"hi")));
    }

    #[tokio::test]
    async fn decode_failure_closes_connection() {
        let (controller, conn) = setup();
        establish(&controller, &conn, 0).await;
        let mut errors = controller.subscribe("ofcore.connection.error");

        // Features reply truncated to its header.
        controller
            .handle_data(&conn, Bytes::from_static(&[4, 6, 0, 8, 0, 0, 0, 5]))
            .await;

        assert!(errors.recv().await.is_some());
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn peer_error_is_forwarded_without_closing() {
        let (controller, conn) = setup();
        establish(&controller, &conn, 0).await;
        let mut errors = controller.subscribe("ofcore.v0x04.messages.in.ofpt_error");

        controller
            .handle_data(&conn, encode(4, 3, Message::error(1, 2, Bytes::new())))
            .await;

        assert!(errors.recv().await.is_some());
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn flow_stats_fragments_complete_once() {
        let (controller, conn) = setup();
        establish(&controller, &conn, 0).await;
        let mut flows = controller.subscribe("ofcore.flow_stats.received");

        let issued = controller.request_stats(DPID).await.unwrap();
        let (_, xid) = issued
            .iter()
            .copied()
            .find(|(kind, _)| *kind == StatKind::Flows)
            .unwrap();

        let fragment = |more: bool, cookie: u64| {
            encode(
                4,
                xid,
                Message::MultipartReply(MultipartReply {
                    flags: if more { MULTIPART_MORE } else { 0 },
                    body: MultipartReplyBody::Flow(vec![FlowStats {
                        cookie,
                        ..FlowStats::default()
                    }]),
                }),
            )
        };
        let mut data = BytesMut::new();
        data.extend_from_slice(&fragment(true, 1));
        data.extend_from_slice(&fragment(true, 2));
        data.extend_from_slice(&fragment(false, 3));
        controller.handle_data(&conn, data.freeze()).await;

        let event = flows.recv().await.unwrap();
        let Event::FlowStatsReceived { flows: batch, .. } = &*event else {
            panic!("unexpected event {event:?}");
        };
        let cookies: Vec<u64> = batch.iter().map(|f| f.cookie).collect();
        assert_eq!(cookies, vec![1, 2, 3]);
        assert!(flows.try_recv().is_err());
        assert_eq!(controller.switches().get(DPID).unwrap().flows.len(), 3);
        // Sequence number released with the terminal fragment.
        assert_eq!(controller.sequence_guard().seq_of(DPID, xid), 0);
    }

    #[tokio::test]
    async fn port_status_modify_reports_link_change() {
        let (controller, conn) = setup();
        establish(&controller, &conn, 0).await;
        let mut changes = controller.subscribe("ofcore.switch.interface.*");

        let mut data = BytesMut::new();
        data.extend_from_slice(&encode(4, 10, port_status(PortReason::Add, 2, port_state::LIVE)));
        data.extend_from_slice(&encode(
            4,
            11,
            port_status(PortReason::Modify, 2, port_state::LINK_DOWN),
        ));
        controller.handle_data(&conn, data.freeze()).await;

        let mut names = Vec::new();
        while let Ok(event) = changes.try_recv() {
            names.push(event.name());
        }
        assert_eq!(
            names,
            vec![
                "ofcore.switch.interface.created",
                "ofcore.switch.interface.link_down",
                "ofcore.switch.interface.modified",
            ]
        );
        let iface = controller.switches().interface(DPID, 2).unwrap();
        assert!(!iface.active);
        assert_eq!(controller.sequence_guard().last_applied(DPID, 2), 2);
    }

    #[tokio::test]
    async fn stale_port_description_is_skipped() {
        let (controller, conn) = setup();
        establish(&controller, &conn, 0).await;

        let port = PortDesc {
            port_no: 5,
            state: port_state::LIVE,
            curr_speed: 1_000_000,
            ..PortDesc::default()
        };
        let desc_reply = Message::MultipartReply(MultipartReply {
            flags: 0,
            body: MultipartReplyBody::PortDesc(vec![port.clone()]),
        });
        let delete = Message::PortStatus(PortStatus {
            reason: PortReason::Delete,
            desc: port.clone(),
        });
        let add = Message::PortStatus(PortStatus {
            reason: PortReason::Add,
            desc: port,
        });

        // Port-desc reply is read first but handled after the batch, behind a newer
        // delete for the same port.
        let mut data = BytesMut::new();
        data.extend_from_slice(&encode(4, 20, add));
        data.extend_from_slice(&encode(4, 21, desc_reply));
        data.extend_from_slice(&encode(4, 22, delete));
        controller.handle_data(&conn, data.freeze()).await;

        let iface = controller.switches().interface(DPID, 5).unwrap();
        assert!(!iface.active);
        assert_eq!(controller.sequence_guard().last_applied(DPID, 5), 3);
    }

    #[tokio::test]
    async fn batch_with_features_reply_keeps_arrival_order() {
        let (controller, conn) = setup();
        controller
            .handle_data(&conn, encode(4, 1, Message::hello(&[4])))
            .await;
        flush(&controller, &conn).await;

        let mut data = BytesMut::new();
        data.extend_from_slice(&encode(
            4,
            10,
            port_status(PortReason::Modify, 2, port_state::LIVE),
        ));
        data.extend_from_slice(&encode(4, 11, features(DPID, 0)));
        data.extend_from_slice(&encode(
            4,
            12,
            port_status(PortReason::Modify, 2, port_state::LINK_DOWN),
        ));
        controller.handle_data(&conn, data.freeze()).await;

        assert!(conn.is_established());
        let iface = controller.switches().interface(DPID, 2).unwrap();
        assert_eq!(iface.state, port_state::LINK_DOWN);
        assert!(!iface.active);
        assert_eq!(controller.sequence_guard().last_applied(DPID, 2), 2);
    }

    #[tokio::test]
    async fn non_hello_first_frame_fails_negotiation() {
        let (controller, conn) = setup();
        let mut failed = controller.subscribe("ofcore.hello_failed");

        controller
            .handle_data(&conn, encode(4, 21, Message::EchoRequest(Bytes::new())))
            .await;

        let event = failed.recv().await.unwrap();
        assert!(matches!(
            *event,
            Event::HelloFailed {
                peer_version: 4,
                xid: 21,
                ..
            }
        ));
        assert!(conn.is_closed());
        let sent = conn.drain_outbound();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].xid, 21);
        assert!(matches!(
            &sent[0].message,
            Message::Error(err) if err.err_type == 0 && err.code == 0 && err.data.is_empty()
        ));
    }

    #[tokio::test]
    async fn short_first_frame_fails_negotiation() {
        let (controller, conn) = setup();
        let mut failed = controller.subscribe("ofcore.hello_failed");

        // Declared length 4: emitted by the slicer, no room for a header.
        controller
            .handle_data(&conn, Bytes::from_static(&[4, 0, 0, 4]))
            .await;

        let event = failed.recv().await.unwrap();
        assert!(matches!(
            *event,
            Event::HelloFailed {
                peer_version: 4,
                xid: 0,
                ..
            }
        ));
        assert!(conn.is_closed());
        assert_eq!(
            conn.states().await,
            (ConnectionState::Failed, ProtocolState::HelloFailed)
        );
        assert_eq!(sent_types(&conn), vec![MessageType::Error]);
    }

    #[tokio::test]
    async fn echo_reply_followed_by_features_request_when_configured() {
        let (controller, conn) = setup_with(ControllerConfig {
            send_features_request_on_echo: true,
            ..ControllerConfig::default()
        });
        establish(&controller, &conn, 0).await;

        controller
            .handle_data(&conn, encode(4, 30, Message::EchoRequest(Bytes::new())))
            .await;

        assert_eq!(
            flush(&controller, &conn).await,
            vec![MessageType::EchoReply, MessageType::FeaturesRequest]
        );
    }

    #[tokio::test]
    async fn echo_reply_alone_by_default() {
        let (controller, conn) = setup();
        establish(&controller, &conn, 0).await;

        controller
            .handle_data(&conn, encode(4, 30, Message::EchoRequest(Bytes::new())))
            .await;

        assert_eq!(flush(&controller, &conn).await, vec![MessageType::EchoReply]);
    }

    #[tokio::test]
    async fn table_and_port_stats_complete() {
        let (controller, conn) = setup();
        establish(&controller, &conn, capabilities::TABLE_STATS).await;
        let mut tables_rx = controller.subscribe("ofcore.table_stats.received");
        let mut ports_rx = controller.subscribe("ofcore.port_stats.received");

        let issued = controller.request_stats(DPID).await.unwrap();
        assert_eq!(issued.len(), 3);
        let table = TableStats {
            table_id: 0,
            active_count: 4,
            lookup_count: 10,
            matched_count: 8,
        };
        let port = PortStats {
            port_no: 2,
            rx_packets: 99,
            ..PortStats::default()
        };

        let mut data = BytesMut::new();
        data.extend_from_slice(&reply(
            issued_xid(&issued, StatKind::Tables),
            MultipartReplyBody::Table(vec![table.clone()]),
        ));
        data.extend_from_slice(&reply(
            issued_xid(&issued, StatKind::Ports),
            MultipartReplyBody::PortStats(vec![port.clone()]),
        ));
        controller.handle_data(&conn, data.freeze()).await;

        let event = tables_rx.recv().await.unwrap();
        assert!(matches!(&*event, Event::TableStatsReceived { dpid: DPID, tables } if tables == &vec![table.clone()]));
        let event = ports_rx.recv().await.unwrap();
        assert!(matches!(&*event, Event::PortStatsReceived { dpid: DPID, ports } if ports == &vec![port.clone()]));
        assert_eq!(controller.switches().get(DPID).unwrap().tables, vec![table]);
        assert_eq!(controller.stats().pending_xid(DPID, StatKind::Tables), None);
        assert_eq!(controller.stats().pending_xid(DPID, StatKind::Ports), None);
        assert!(controller
            .stats()
            .pending_xid(DPID, StatKind::Flows)
            .is_some());
    }

    #[tokio::test]
    async fn packet_in_reports_reachable_mac() {
        let (controller, conn) = setup();
        establish(&controller, &conn, 0).await;
        controller
            .handle_data(
                &conn,
                encode(4, 50, port_status(PortReason::Add, 3, port_state::LIVE)),
            )
            .await;
        let mut reachable = controller.subscribe("ofcore.reachable.mac");

        let src = [0x02, 0, 0, 0, 0, 0x0a];
        let mut data = BytesMut::new();
        data.extend_from_slice(&encode(4, 0, packet_in(3, src, ether_type::LLDP)));
        data.extend_from_slice(&encode(4, 0, packet_in(3, src, ether_type::IPV6)));
        data.extend_from_slice(&encode(4, 0, packet_in(3, src, 0x0800)));
        controller.handle_data(&conn, data.freeze()).await;

        let event = reachable.recv().await.unwrap();
        let Event::ReachableMac {
            dpid,
            port_no,
            interface,
            mac,
        } = &*event
        else {
            panic!("unexpected event {event:?}");
        };
        assert_eq!((*dpid, *port_no), (DPID, 3));
        assert_eq!(mac, "02:00:00:00:00:0a");
        assert_eq!(interface.as_ref().map(|i| i.name.as_str()), Some("eth3"));
        // LLDP and IPv6 frames produced nothing.
        assert!(reachable.try_recv().is_err());
    }

    #[tokio::test]
    async fn handled_updates_release_their_xids() {
        let (controller, conn) = setup();
        establish(&controller, &conn, 0).await;

        let mut data = BytesMut::new();
        for xid in 60..70 {
            data.extend_from_slice(&encode(
                4,
                xid,
                port_status(PortReason::Modify, 4, port_state::LIVE),
            ));
        }
        controller.handle_data(&conn, data.freeze()).await;
        controller
            .handle_data(
                &conn,
                reply(
                    70,
                    MultipartReplyBody::PortDesc(vec![PortDesc {
                        port_no: 5,
                        ..PortDesc::default()
                    }]),
                ),
            )
            .await;

        assert_eq!(controller.sequence_guard().tracked_xids(DPID), 0);
        assert!(controller.switches().interface(DPID, 5).is_some());
    }
}
