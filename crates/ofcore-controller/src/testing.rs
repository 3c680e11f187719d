//! Drive a controller without sockets.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use ofcore_codec::{Message, MessageCodec, MessageType, SwitchFeatures};
use ofcore_frame::OFP_1_3;
use ofcore_transport::ConnectionId;

use crate::connection::Connection;
use crate::controller::Controller;

pub(crate) fn encode(version: u8, xid: u32, message: Message) -> Bytes {
    MessageCodec::new().encode(version, xid, &message).unwrap()
}

pub(crate) fn features(dpid: u64, capabilities: u32) -> Message {
    Message::FeaturesReply(SwitchFeatures {
        datapath_id: dpid,
        n_tables: 1,
        capabilities,
        ..SwitchFeatures::default()
    })
}

pub(crate) fn connect(controller: &Controller, id: u64) -> Arc<Connection> {
    controller.register_connection(
        ConnectionId::new(id),
        SocketAddr::from(([127, 0, 0, 1], 40000 + id as u16)),
    )
}

/// Acknowledge every queued message as a writer would.
pub(crate) async fn flush(controller: &Controller, conn: &Arc<Connection>) -> Vec<MessageType> {
    let mut types = Vec::new();
    while let Some(item) = conn.pop_outbound() {
        types.push(item.message.msg_type());
        controller.on_message_sent(conn, item).await;
    }
    types
}

/// Hello and features exchange at `version`, leaving the outbound queue empty.
pub(crate) async fn handshake(
    controller: &Controller,
    conn: &Arc<Connection>,
    version: u8,
    dpid: u64,
    capabilities: u32,
) {
    let hello = if version == OFP_1_3 {
        Message::hello(&[1, 4])
    } else {
        Message::hello(&[])
    };
    controller.handle_data(conn, encode(version, 1, hello)).await;
    flush(controller, conn).await;
    controller
        .handle_data(conn, encode(version, 2, features(dpid, capabilities)))
        .await;
    conn.drain_outbound();
    assert!(conn.is_established());
}
