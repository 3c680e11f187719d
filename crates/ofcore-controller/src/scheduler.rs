//! Periodic, staggered statistics polling.
//!
//! Every switch gets a fixed offset inside the first half of the poll interval the
//! first time it is seen, so polls for many switches do not all land on the same tick.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use ofcore_frame::OFP_1_3;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::controller::Controller;
use crate::events::Event;

#[derive(Debug, Default)]
struct Offsets {
    by_dpid: HashMap<u64, Duration>,
    last: Duration,
}

/// Assigns poll offsets and drives the poll loop.
#[derive(Debug)]
pub struct PollScheduler {
    interval: Duration,
    offsets: Mutex<Offsets>,
}

impl PollScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            offsets: Mutex::new(Offsets::default()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Offset of `dpid`, assigned on first call and fixed afterward.
    ///
    /// Offsets advance by a tenth of half the interval, wrapping at half the interval.
    pub fn offset(&self, dpid: u64) -> Duration {
        let mut offsets = self.offsets.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(offset) = offsets.by_dpid.get(&dpid) {
            return *offset;
        }
        let half = self.interval.as_nanos() / 2;
        let step = half / 10;
        let next = if half == 0 {
            0
        } else {
            (offsets.last.as_nanos() + step) % half
        };
        let offset = Duration::from_nanos(u64::try_from(next).unwrap_or(u64::MAX));
        offsets.last = offset;
        offsets.by_dpid.insert(dpid, offset);
        offset
    }

    /// One poll cycle: keepalives if configured, then a staggered stats poll for every
    /// established OpenFlow 1.3 switch.
    pub fn poll_cycle(&self, controller: &Controller) {
        if controller.config().send_echo_requests {
            let sent = controller.send_keepalives();
            debug!(sent, "keepalive echo requests queued");
        }
        for (dpid, version) in controller.established_switches() {
            if version != OFP_1_3 {
                continue;
            }
            self.poll_after_offset(controller, dpid);
        }
    }

    /// Spawn a stats poll for `dpid` that waits out the switch's offset first.
    fn poll_after_offset(&self, controller: &Controller, dpid: u64) {
        let offset = self.offset(dpid);
        let controller = controller.clone();
        tokio::spawn(async move {
            tokio::time::sleep(offset).await;
            poll(&controller, dpid).await;
        });
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Also polls every OpenFlow 1.3 switch once its handshake completes, staggered by
    /// the switch's offset.
    pub async fn run(&self, controller: Controller, shutdown: CancellationToken) {
        let mut handshakes = controller.subscribe("ofcore.handshake.completed");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; switches are polled on handshake instead.
        ticker.tick().await;

        info!(interval = ?self.interval, "poll scheduler started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.poll_cycle(&controller),
                event = handshakes.recv() => {
                    let Some(event) = event else { break };
                    if let Event::HandshakeCompleted { dpid, version, .. } = *event {
                        if version == OFP_1_3 {
                            self.poll_after_offset(&controller, dpid);
                        }
                    }
                }
            }
        }
        info!("poll scheduler stopped");
    }
}

async fn poll(controller: &Controller, dpid: u64) {
    match controller.request_stats(dpid).await {
        Ok(issued) if !issued.is_empty() => {
            debug!(dpid = %format!("{dpid:016x}"), requests = issued.len(), "stats poll issued")
        }
        Ok(_) => {}
        Err(err) => warn!(dpid = %format!("{dpid:016x}"), error = %err, "stats poll failed"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ofcore_codec::{Message, MessageType};
    use ofcore_frame::OFP_1_0;

    use super::*;
    use crate::config::ControllerConfig;
    use crate::stats::StatKind;
    use crate::testing::{connect, handshake};

    fn controller() -> Controller {
        Controller::new(ControllerConfig::default()).unwrap()
    }

    fn sent(conn: &crate::Connection) -> Vec<MessageType> {
        conn.drain_outbound()
            .into_iter()
            .map(|o| o.message.msg_type())
            .collect()
    }

    #[test]
    fn offsets_step_through_half_interval() {
        let scheduler = PollScheduler::new(Duration::from_secs(60));
        assert_eq!(scheduler.offset(1), Duration::from_secs(3));
        assert_eq!(scheduler.offset(2), Duration::from_secs(6));
        assert_eq!(scheduler.offset(1), Duration::from_secs(3));
    }

    #[test]
    fn offsets_wrap() {
        let scheduler = PollScheduler::new(Duration::from_secs(60));
        let offsets: Vec<Duration> = (1..=10).map(|dpid| scheduler.offset(dpid)).collect();
        assert_eq!(offsets[8], Duration::from_secs(27));
        assert_eq!(offsets[9], Duration::ZERO);
        assert_eq!(scheduler.offset(11), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn poll_cycle_keepalives_all_and_polls_openflow13_only() {
        let controller = controller();
        let of13 = connect(&controller, 1);
        let of10 = connect(&controller, 2);
        let pending = connect(&controller, 3);
        handshake(&controller, &of13, OFP_1_3, 1, 0).await;
        handshake(&controller, &of10, OFP_1_0, 2, 0).await;

        // 20 ms interval: offsets of 1 ms and 2 ms.
        let scheduler = PollScheduler::new(Duration::from_millis(20));
        scheduler.poll_cycle(&controller);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let of13_sent = sent(&of13);
        assert_eq!(of13_sent[0], MessageType::EchoRequest);
        assert_eq!(
            of13_sent
                .iter()
                .filter(|t| **t == MessageType::MultipartRequest)
                .count(),
            2
        );
        assert_eq!(sent(&of10), vec![MessageType::EchoRequest]);
        assert!(sent(&pending).is_empty());
        assert!(controller.stats().pending_xid(2, StatKind::Flows).is_none());
    }

    #[tokio::test]
    async fn poll_cycle_without_keepalives() {
        let controller = Controller::new(ControllerConfig {
            send_echo_requests: false,
            ..ControllerConfig::default()
        })
        .unwrap();
        let conn = connect(&controller, 1);
        handshake(&controller, &conn, OFP_1_0, 1, 0).await;

        PollScheduler::new(Duration::from_millis(20)).poll_cycle(&controller);
        assert!(sent(&conn).is_empty());
        assert_eq!(controller.send_keepalives(), 1);
        assert!(matches!(
            &conn.drain_outbound()[0].message,
            Message::EchoRequest(data) if data.is_empty()
        ));
    }

    #[tokio::test]
    async fn handshake_poll_waits_for_switch_offset() {
        let controller = controller();
        // 2 s interval: the first switch gets a 100 ms offset; the first tick is 2 s away.
        let scheduler = Arc::new(PollScheduler::new(Duration::from_secs(2)));
        let shutdown = CancellationToken::new();
        let task = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            let controller = controller.clone();
            let shutdown = shutdown.clone();
            async move { scheduler.run(controller, shutdown).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let conn = connect(&controller, 1);
        handshake(&controller, &conn, OFP_1_3, 1, 0).await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(controller.stats().pending_xid(1, StatKind::Flows).is_none());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(controller.stats().pending_xid(1, StatKind::Flows).is_some());
        assert_eq!(scheduler.offset(1), Duration::from_millis(100));

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let controller = controller();
        let scheduler = PollScheduler::new(Duration::from_secs(60));
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        scheduler.run(controller, shutdown).await;
    }
}
