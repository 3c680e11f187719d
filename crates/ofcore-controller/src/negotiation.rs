//! Version negotiation and the features exchange.
//!
//! `AwaitingHello → SendingFeatures → WaitingFeaturesReply → HandshakeComplete`, with
//! `HelloFailed` as the terminal failure state. The move to `WaitingFeaturesReply`
//! happens in [`Controller::on_message_sent`] once the features request was written.

use bytes::Bytes;
use ofcore_codec::types::{ERROR_TYPE_HELLO_FAILED, HELLO_FAILED_INCOMPATIBLE, NO_BUFFER};
use ofcore_codec::{GenericHello, Message, MultipartRequestBody, SwitchConfig, SwitchFeatures};
use ofcore_frame::{Frame, OFP_1_0, OFP_1_3};
use tracing::{debug, error, info, warn};

use crate::connection::{Connection, ConnectionInner, ConnectionState, ProtocolState};
use crate::controller::Controller;
use crate::events::Event;

/// Pick the version to speak with a peer that sent `hello`.
///
/// With a version bitmap: the highest version in both the bitmap and `configured`.
/// Without one: `min(peer header version, highest configured)`, if configured.
pub fn select_version(hello: &GenericHello, configured: &[u8]) -> Option<u8> {
    match &hello.bitmap {
        Some(advertised) if !advertised.is_empty() => configured
            .iter()
            .copied()
            .filter(|v| advertised.contains(v))
            .max(),
        _ => {
            let highest = configured.iter().copied().max()?;
            let version = hello.version.min(highest);
            configured.contains(&version).then_some(version)
        }
    }
}

impl Controller {
    /// Handle the first frame of a connection. Returns `false` if negotiation failed
    /// and the connection is closing.
    pub(crate) async fn negotiate(
        &self,
        conn: &Connection,
        inner: &mut ConnectionInner,
        frame: &Frame,
    ) -> bool {
        let configured = self.inner.config.versions();
        let hello = match GenericHello::decode(frame) {
            Ok(hello) => hello,
            Err(err) => {
                warn!(connection = %conn.id(), error = %err, "invalid hello");
                let (peer_version, xid) = frame
                    .header()
                    .map(|h| (h.version, h.xid))
                    .unwrap_or((frame.version(), 0));
                self.fail_negotiation(conn, inner, peer_version, xid).await;
                return false;
            }
        };

        let Some(version) = select_version(&hello, &configured) else {
            self.fail_negotiation(conn, inner, hello.version, hello.xid)
                .await;
            return false;
        };
        debug!(connection = %conn.id(), version, "negotiated version");

        conn.set_version(version);
        let hello_xid = self.next_xid();
        if let Err(err) = self.enqueue(conn, version, hello_xid, Message::hello(&configured)) {
            error!(connection = %conn.id(), error = %err, "hello not sent");
        }
        inner.protocol_state = ProtocolState::SendingFeatures;
        if let Err(err) = self.send(conn, Message::FeaturesRequest) {
            error!(connection = %conn.id(), error = %err, "features request not sent");
        }
        inner.state = ConnectionState::SettingUp;
        debug!(connection = %conn.id(), "hello complete");
        true
    }

    async fn fail_negotiation(
        &self,
        conn: &Connection,
        inner: &mut ConnectionInner,
        peer_version: u8,
        xid: u32,
    ) {
        warn!(
            connection = %conn.id(),
            peer_version,
            "version negotiation failed"
        );
        inner.protocol_state = ProtocolState::HelloFailed;
        inner.state = ConnectionState::Failed;
        conn.mark_failed();

        self.inner
            .bus
            .publish(Event::HelloFailed {
                connection: conn.id(),
                peer_version,
                xid,
            })
            .await;

        let error = Message::error(ERROR_TYPE_HELLO_FAILED, HELLO_FAILED_INCOMPATIBLE, Bytes::new());
        let version = self.inner.config.max_version();
        if let Err(err) = self.enqueue(conn, version, xid, error) {
            error!(connection = %conn.id(), error = %err, "hello-failed error not sent");
        }
        conn.close();
    }

    /// Returns `true` when this reply completed the handshake.
    pub(crate) async fn on_features_reply(
        &self,
        conn: &Connection,
        inner: &mut ConnectionInner,
        xid: u32,
        features: &SwitchFeatures,
    ) -> bool {
        if inner.protocol_state == ProtocolState::WaitingFeaturesReply {
            self.complete_handshake(conn, inner, xid, features).await;
            return true;
        }

        let dpid = features.datapath_id;
        if inner.state == ConnectionState::Established && conn.dpid() == Some(dpid) {
            if let Err(err) = self.inner.switches.update_features(dpid, features.clone()) {
                warn!(connection = %conn.id(), error = %err, "features not refreshed");
            } else {
                debug!(connection = %conn.id(), dpid = %format!("{dpid:016x}"), "features refreshed");
            }
        } else {
            debug!(
                connection = %conn.id(),
                state = inner.protocol_state.as_str(),
                "ignoring features reply"
            );
        }
        false
    }

    async fn complete_handshake(
        &self,
        conn: &Connection,
        inner: &mut ConnectionInner,
        xid: u32,
        features: &SwitchFeatures,
    ) {
        let dpid = features.datapath_id;
        let Some(version) = conn.version() else {
            return;
        };

        self.inner.switches.get_or_create(dpid, version, conn.id());
        if let Err(err) = self.inner.switches.update_features(dpid, features.clone()) {
            warn!(connection = %conn.id(), error = %err, "features not stored");
        }
        self.inner.stats.reset(dpid);
        self.inner.guard.reset(dpid);
        if !conn.set_dpid(dpid) {
            warn!(
                connection = %conn.id(),
                dpid = %format!("{dpid:016x}"),
                previous = ?conn.dpid(),
                "connection already bound to another datapath"
            );
        }

        inner.state = ConnectionState::Established;
        inner.protocol_state = ProtocolState::HandshakeComplete;
        conn.mark_established();

        match version {
            OFP_1_3 => {
                let request = Message::multipart_request(MultipartRequestBody::PortDesc);
                if let Err(err) = self.send(conn, request) {
                    error!(connection = %conn.id(), error = %err, "port description request not sent");
                }
            }
            OFP_1_0 => self.apply_port_descs(dpid, xid, &features.ports).await,
            _ => {}
        }

        if let Err(err) = self.send(conn, Message::multipart_request(MultipartRequestBody::Desc)) {
            error!(connection = %conn.id(), error = %err, "description request not sent");
        }
        if self.inner.config.send_set_config {
            let config = SwitchConfig {
                flags: 0,
                miss_send_len: NO_BUFFER,
            };
            if let Err(err) = self.send(conn, Message::SetConfig(config)) {
                error!(connection = %conn.id(), error = %err, "set-config not sent");
            }
        }

        self.inner
            .bus
            .publish(Event::HandshakeCompleted {
                connection: conn.id(),
                dpid,
                version,
            })
            .await;
        info!(
            connection = %conn.id(),
            dpid = %format!("{dpid:016x}"),
            version,
            "handshake complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello(version: u8, bitmap: Option<&[u8]>) -> GenericHello {
        GenericHello {
            version,
            xid: 1,
            bitmap: bitmap.map(<[u8]>::to_vec),
        }
    }

    #[test]
    fn bitmap_picks_highest_common() {
        assert_eq!(select_version(&hello(4, Some(&[1, 4])), &[1, 4]), Some(4));
        assert_eq!(select_version(&hello(6, Some(&[1, 4, 6])), &[1, 4]), Some(4));
        assert_eq!(select_version(&hello(4, Some(&[1])), &[1, 4]), Some(1));
    }

    #[test]
    fn bitmap_without_overlap_fails() {
        assert_eq!(select_version(&hello(3, Some(&[2, 3])), &[1, 4]), None);
    }

    #[test]
    fn header_version_is_capped_at_highest_configured() {
        assert_eq!(select_version(&hello(6, None), &[1, 4]), Some(4));
        assert_eq!(select_version(&hello(1, None), &[1, 4]), Some(1));
    }

    #[test]
    fn header_version_must_be_configured() {
        assert_eq!(select_version(&hello(3, None), &[1, 4]), None);
        assert_eq!(select_version(&hello(4, None), &[]), None);
    }

    #[test]
    fn empty_bitmap_falls_back_to_header() {
        assert_eq!(select_version(&hello(4, Some(&[])), &[1, 4]), Some(4));
    }
}
